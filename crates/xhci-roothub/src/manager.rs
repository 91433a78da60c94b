//! Creates the root hubs for a controller and routes hardware port events to them.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::RootHubConfig;
use crate::controller::HostController;
use crate::devmgr::{DeviceId, DeviceSignals, DeviceTree, TopologyError};
use crate::hub::{RootHub, RootHubDevice};
use crate::port::{PortChange, PortMap};
use crate::regs;
use crate::speed::{parse_supported_protocols, SpeedClass};

#[derive(Debug)]
struct ManagedHub {
    hub: Arc<RootHub>,
    node: DeviceId,
}

/// Owns every root hub of one controller.
///
/// The manager holds the only strong reference to each hub; device nodes hold weak ones, so
/// dropping the manager (or calling [`RootHubManager::shutdown`]) is what tears a hub down.
pub struct RootHubManager {
    controller: Arc<dyn HostController>,
    hubs: Vec<ManagedHub>,
}

impl std::fmt::Debug for RootHubManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RootHubManager")
            .field("hubs", &self.hubs)
            .finish_non_exhaustive()
    }
}

impl RootHubManager {
    /// Builds one root hub per speed class that has ports, publishes each under `parent`, then
    /// scans for changes latched before start (devices already plugged in).
    pub fn start(
        controller: Arc<dyn HostController>,
        tree: &mut DeviceTree,
        parent: DeviceId,
        config: &RootHubConfig,
    ) -> Result<Self, TopologyError> {
        let protocols = parse_supported_protocols(&controller.ext_caps());
        let controller_ports = controller.port_count();

        let mut manager = Self {
            controller: Arc::clone(&controller),
            hubs: Vec::new(),
        };

        for class in SpeedClass::ALL {
            let map = PortMap::build(&protocols, class, controller_ports);
            if map.is_empty() {
                debug!(%class, "no ports for speed class; skipping root hub");
                continue;
            }

            let hub = Arc::new(RootHub::new(class, map, Arc::clone(&controller), config));
            let device = Arc::new(RootHubDevice::new(&hub));
            let node = match tree.add(parent, &format!("xhci-rh-{class}"), device) {
                Ok(node) => node,
                Err(err) => {
                    manager.shutdown(tree);
                    return Err(err);
                }
            };
            info!(
                %class,
                ports = hub.port_count(),
                physical = ?hub.port_map().physical_ports(),
                "root hub started"
            );
            manager.hubs.push(ManagedHub { hub, node });
        }

        if manager.hubs.is_empty() {
            warn!(controller_ports, "controller reports no usable root ports");
        }

        manager.handle_root_hub_change();
        Ok(manager)
    }

    pub fn hubs(&self) -> impl Iterator<Item = &Arc<RootHub>> {
        self.hubs.iter().map(|h| &h.hub)
    }

    pub fn hub(&self, class: SpeedClass) -> Option<&Arc<RootHub>> {
        self.hubs().find(|hub| hub.speed() == class)
    }

    pub fn node(&self, class: SpeedClass) -> Option<DeviceId> {
        self.hubs
            .iter()
            .find(|h| h.hub.speed() == class)
            .map(|h| h.node)
    }

    /// Delivers raw `PORTSC` change bits for `physical` to the hub that owns it.
    ///
    /// Returns false (and logs) when no hub claims the port.
    pub fn route_port_change(&self, physical: u8, raw: u32) -> bool {
        for managed in &self.hubs {
            let hub = &managed.hub;
            if hub.port_map().virtual_port(physical).is_none() {
                continue;
            }
            let bits = PortChange::from_portsc(hub.speed(), raw);
            return hub.notify_port_changed(physical, bits);
        }
        warn!(
            physical,
            raw,
            "port change on a port no root hub owns; dropping"
        );
        false
    }

    /// Port status change event: acknowledges every latched `PORTSC` change bit and routes it.
    pub fn handle_root_hub_change(&self) {
        for physical in 1..=self.controller.port_count() {
            let portsc = self.controller.read_portsc(physical);
            let changes = portsc & regs::PORTSC_CHANGE_MASK;
            if changes == 0 {
                continue;
            }
            self.controller
                .write_portsc(physical, regs::portsc_write_value(portsc, changes));
            self.route_port_change(physical, changes);
        }
    }

    /// Tears every hub down: parked interrupts complete with device-gone, the node is flagged
    /// HANGUP and removed. Idempotent.
    pub fn shutdown(&mut self, tree: &mut DeviceTree) {
        for ManagedHub { hub, node } in self.hubs.drain(..) {
            hub.cancel_all();
            if let Err(err) = tree
                .signal_set(node, DeviceSignals::HANGUP)
                .and_then(|()| tree.remove(node))
            {
                warn!(class = %hub.speed(), %err, "failed to remove root hub node");
            }
            info!(class = %hub.speed(), "root hub stopped");
        }
    }
}

impl Drop for RootHubManager {
    fn drop(&mut self) {
        for managed in &self.hubs {
            managed.hub.cancel_all();
        }
    }
}
