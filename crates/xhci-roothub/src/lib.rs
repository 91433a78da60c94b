//! Virtual USB root hubs for an xHCI host controller.
//!
//! xHCI exposes its root ports as a flat `PORTSC` register array rather than as a hub device.
//! This crate groups those ports by speed class (USB 2.0 and SuperSpeed) and presents each group
//! as a standard USB hub, so a generic hub class driver can drive port power, reset, suspend and
//! hot-plug through ordinary control and interrupt transfers.
//!
//! - [`RootHub`] answers control transfers and parks status-change interrupt requests.
//! - [`RootHubManager`] builds the hubs from the controller's Supported Protocol capabilities,
//!   publishes them in a [`DeviceTree`] and routes port change events.
//! - [`HostController`] is the only thing the crate needs from the controller itself.

pub mod config;
pub mod control;
pub mod controller;
pub mod descriptor;
pub mod devmgr;
pub mod error;
pub mod hub;
pub mod manager;
pub mod notify;
pub mod port;
pub mod regs;
pub mod setup;
pub mod speed;

pub use config::RootHubConfig;
pub use controller::HostController;
pub use devmgr::{DeviceId, DeviceOps, DeviceSignals, DeviceTree, TopologyError};
pub use error::{ErrorKind, Result, RootHubError};
pub use hub::{RootHub, RootHubDevice, UsbTransfer};
pub use manager::RootHubManager;
pub use notify::{InterruptRequest, SubmitOutcome};
pub use port::{PortChange, PortMap, UsbPortStatus};
pub use setup::SetupPacket;
pub use speed::{SpeedClass, SupportedProtocol};
