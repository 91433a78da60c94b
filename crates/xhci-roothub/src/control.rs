//! Control transfer handling for the root hubs.
//!
//! Requests are answered synchronously against the port change table, the port map and the
//! live `PORTSC` registers. Nothing here parks or retries.

use tracing::debug;

use crate::controller::HostController;
use crate::descriptor::{
    Descriptors, HUB_INTERRUPT_IN_EP, USB_DESCRIPTOR_TYPE_BOS, USB_DESCRIPTOR_TYPE_CONFIGURATION,
    USB_DESCRIPTOR_TYPE_DEVICE, USB_DESCRIPTOR_TYPE_HUB, USB_DESCRIPTOR_TYPE_SS_HUB,
    USB_DESCRIPTOR_TYPE_STRING,
};
use crate::error::{Result, RootHubError};
use crate::hub::HubState;
use crate::port::{port_status_from_portsc, PortChange, PortMap, UsbPortStatus};
use crate::regs;
use crate::setup::{RequestDirection, RequestRecipient, RequestType, SetupPacket};
use crate::speed::SpeedClass;

pub const USB_REQUEST_GET_STATUS: u8 = 0x00;
pub const USB_REQUEST_CLEAR_FEATURE: u8 = 0x01;
pub const USB_REQUEST_SET_FEATURE: u8 = 0x03;
pub const USB_REQUEST_GET_DESCRIPTOR: u8 = 0x06;
pub const USB_REQUEST_GET_CONFIGURATION: u8 = 0x08;
pub const USB_REQUEST_SET_CONFIGURATION: u8 = 0x09;
pub const HUB_REQUEST_SET_HUB_DEPTH: u8 = 0x0c;

pub const HUB_FEATURE_C_HUB_LOCAL_POWER: u16 = 0;
pub const HUB_FEATURE_C_HUB_OVER_CURRENT: u16 = 1;

pub const HUB_PORT_FEATURE_CONNECTION: u16 = 0;
pub const HUB_PORT_FEATURE_ENABLE: u16 = 1;
pub const HUB_PORT_FEATURE_SUSPEND: u16 = 2;
pub const HUB_PORT_FEATURE_OVER_CURRENT: u16 = 3;
pub const HUB_PORT_FEATURE_RESET: u16 = 4;
pub const HUB_PORT_FEATURE_LINK_STATE: u16 = 5;
pub const HUB_PORT_FEATURE_POWER: u16 = 8;
pub const HUB_PORT_FEATURE_LOW_SPEED: u16 = 9;
pub const HUB_PORT_FEATURE_C_PORT_CONNECTION: u16 = 16;
pub const HUB_PORT_FEATURE_C_PORT_ENABLE: u16 = 17;
pub const HUB_PORT_FEATURE_C_PORT_SUSPEND: u16 = 18;
pub const HUB_PORT_FEATURE_C_PORT_OVER_CURRENT: u16 = 19;
pub const HUB_PORT_FEATURE_C_PORT_RESET: u16 = 20;
pub const HUB_PORT_FEATURE_TEST: u16 = 21;
pub const HUB_PORT_FEATURE_INDICATOR: u16 = 22;
pub const HUB_PORT_FEATURE_U1_TIMEOUT: u16 = 23;
pub const HUB_PORT_FEATURE_U2_TIMEOUT: u16 = 24;
pub const HUB_PORT_FEATURE_C_PORT_LINK_STATE: u16 = 25;
pub const HUB_PORT_FEATURE_C_PORT_CONFIG_ERROR: u16 = 26;
pub const HUB_PORT_FEATURE_REMOTE_WAKE_MASK: u16 = 27;
pub const HUB_PORT_FEATURE_BH_PORT_RESET: u16 = 28;
pub const HUB_PORT_FEATURE_C_BH_PORT_RESET: u16 = 29;

/// Maximum hub depth a SuperSpeed root hub may be told it sits at.
const MAX_HUB_DEPTH: u16 = 4;

/// Change bit cleared by a `C_*` port feature selector.
fn change_for_feature(feature: u16) -> Option<PortChange> {
    Some(match feature {
        HUB_PORT_FEATURE_C_PORT_CONNECTION => PortChange::CONNECTION,
        HUB_PORT_FEATURE_C_PORT_ENABLE => PortChange::ENABLE,
        HUB_PORT_FEATURE_C_PORT_SUSPEND => PortChange::SUSPEND,
        HUB_PORT_FEATURE_C_PORT_OVER_CURRENT => PortChange::OVER_CURRENT,
        HUB_PORT_FEATURE_C_PORT_RESET => PortChange::RESET,
        HUB_PORT_FEATURE_C_BH_PORT_RESET => PortChange::BH_RESET,
        HUB_PORT_FEATURE_C_PORT_LINK_STATE => PortChange::LINK_STATE,
        HUB_PORT_FEATURE_C_PORT_CONFIG_ERROR => PortChange::CONFIG_ERROR,
        _ => return None,
    })
}

/// Copies `data` into `buf`, clamped to `wLength`.
fn respond(setup: SetupPacket, buf: &mut [u8], data: &[u8]) -> Result<usize> {
    let len = data.len().min(usize::from(setup.w_length));
    buf[..len].copy_from_slice(&data[..len]);
    Ok(len)
}

fn unsupported(setup: SetupPacket) -> RootHubError {
    RootHubError::NotSupported {
        request_type: setup.bm_request_type,
        request: setup.b_request,
    }
}

/// Borrowed view of one root hub, valid for the duration of a single control transfer.
pub(crate) struct ControlEngine<'a> {
    pub class: SpeedClass,
    pub map: &'a PortMap,
    pub descriptors: &'a Descriptors,
    pub controller: &'a dyn HostController,
}

impl ControlEngine<'_> {
    /// Handles one control transfer. IN data is written to `buf`; returns the number of bytes
    /// written (0 for requests without a data stage).
    pub fn handle(
        &self,
        state: &mut HubState,
        setup: SetupPacket,
        buf: &mut [u8],
    ) -> Result<usize> {
        match setup.request_direction() {
            RequestDirection::DeviceToHost => {
                if buf.len() < usize::from(setup.w_length) {
                    return Err(RootHubError::InvalidLength {
                        reason: "buffer shorter than wLength",
                    });
                }
            }
            RequestDirection::HostToDevice => {
                if setup.w_length != 0 {
                    return Err(RootHubError::InvalidLength {
                        reason: "unexpected OUT data stage",
                    });
                }
            }
        }

        match (setup.request_type(), setup.recipient()) {
            (RequestType::Standard, RequestRecipient::Device) => {
                self.standard_device(state, setup, buf)
            }
            (RequestType::Standard, RequestRecipient::Interface) => {
                match (setup.request_direction(), setup.b_request) {
                    (RequestDirection::DeviceToHost, USB_REQUEST_GET_STATUS) => {
                        // Hub has a single interface (0), with no status flags.
                        if setup.w_index != 0 {
                            return Err(RootHubError::InvalidValue {
                                value: setup.w_index,
                                reason: "no such interface",
                            });
                        }
                        respond(setup, buf, &[0, 0])
                    }
                    _ => Err(unsupported(setup)),
                }
            }
            (RequestType::Standard, RequestRecipient::Endpoint) => {
                match (setup.request_direction(), setup.b_request) {
                    (RequestDirection::DeviceToHost, USB_REQUEST_GET_STATUS) => {
                        let ep = (setup.w_index & 0x00ff) as u8;
                        if ep != 0 && ep != HUB_INTERRUPT_IN_EP {
                            return Err(RootHubError::InvalidValue {
                                value: setup.w_index,
                                reason: "no such endpoint",
                            });
                        }
                        respond(setup, buf, &[0, 0])
                    }
                    _ => Err(unsupported(setup)),
                }
            }
            (RequestType::Class, RequestRecipient::Device) => self.class_hub(setup, buf),
            (RequestType::Class, RequestRecipient::Other) => self.class_port(state, setup, buf),
            _ => Err(unsupported(setup)),
        }
    }

    fn standard_device(
        &self,
        state: &mut HubState,
        setup: SetupPacket,
        buf: &mut [u8],
    ) -> Result<usize> {
        match (setup.request_direction(), setup.b_request) {
            (RequestDirection::DeviceToHost, USB_REQUEST_GET_STATUS) => {
                // Self powered, remote wakeup disabled.
                respond(setup, buf, &[0x01, 0x00])
            }
            (RequestDirection::DeviceToHost, USB_REQUEST_GET_DESCRIPTOR) => {
                let data = self.descriptor(setup)?;
                respond(setup, buf, data)
            }
            (RequestDirection::DeviceToHost, USB_REQUEST_GET_CONFIGURATION) => {
                respond(setup, buf, &[state.configuration])
            }
            (RequestDirection::HostToDevice, USB_REQUEST_SET_CONFIGURATION) => {
                let config = setup.w_value & 0x00ff;
                if config > 1 {
                    return Err(RootHubError::InvalidValue {
                        value: setup.w_value,
                        reason: "unknown configuration",
                    });
                }
                state.configuration = config as u8;
                Ok(0)
            }
            _ => Err(unsupported(setup)),
        }
    }

    fn descriptor(&self, setup: SetupPacket) -> Result<&[u8]> {
        let bad_index = || RootHubError::InvalidValue {
            value: setup.w_value,
            reason: "no such descriptor",
        };
        match setup.descriptor_type() {
            USB_DESCRIPTOR_TYPE_DEVICE => Ok(self.descriptors.device()),
            USB_DESCRIPTOR_TYPE_CONFIGURATION if setup.descriptor_index() == 0 => {
                Ok(self.descriptors.config())
            }
            USB_DESCRIPTOR_TYPE_STRING => self
                .descriptors
                .string(setup.descriptor_index())
                .ok_or_else(bad_index),
            USB_DESCRIPTOR_TYPE_BOS => self.descriptors.bos().ok_or_else(bad_index),
            // Some host stacks fetch the hub descriptor with a standard request.
            ty if ty == self.hub_descriptor_type() => Ok(self.descriptors.hub()),
            _ => Err(bad_index()),
        }
    }

    fn hub_descriptor_type(&self) -> u8 {
        match self.class {
            SpeedClass::Usb2 => USB_DESCRIPTOR_TYPE_HUB,
            SpeedClass::SuperSpeed => USB_DESCRIPTOR_TYPE_SS_HUB,
        }
    }

    fn class_hub(&self, setup: SetupPacket, buf: &mut [u8]) -> Result<usize> {
        match (setup.request_direction(), setup.b_request) {
            (RequestDirection::DeviceToHost, USB_REQUEST_GET_DESCRIPTOR) => {
                if setup.descriptor_type() != self.hub_descriptor_type() {
                    return Err(RootHubError::InvalidValue {
                        value: setup.w_value,
                        reason: "wrong hub descriptor type for this hub",
                    });
                }
                respond(setup, buf, self.descriptors.hub())
            }
            (RequestDirection::DeviceToHost, USB_REQUEST_GET_STATUS) => {
                // Local power good, no over-current, nothing changed.
                respond(setup, buf, &[0, 0, 0, 0])
            }
            (RequestDirection::HostToDevice, USB_REQUEST_CLEAR_FEATURE) => match setup.w_value {
                HUB_FEATURE_C_HUB_LOCAL_POWER | HUB_FEATURE_C_HUB_OVER_CURRENT => Ok(0),
                feature => Err(RootHubError::InvalidFeature { feature }),
            },
            (RequestDirection::HostToDevice, HUB_REQUEST_SET_HUB_DEPTH)
                if self.class == SpeedClass::SuperSpeed =>
            {
                if setup.w_value > MAX_HUB_DEPTH {
                    return Err(RootHubError::InvalidValue {
                        value: setup.w_value,
                        reason: "hub depth out of range",
                    });
                }
                Ok(0)
            }
            _ => Err(unsupported(setup)),
        }
    }

    /// Validates the port number in `wIndex[7:0]` and returns `(virtual, physical)`.
    fn port(&self, setup: SetupPacket) -> Result<(usize, u8)> {
        let port = setup.port_index();
        let invalid = || RootHubError::InvalidPort {
            port,
            port_count: self.map.len(),
        };
        if port == 0 || usize::from(port) > self.map.len() {
            return Err(invalid());
        }
        let physical = self
            .map
            .physical_port(usize::from(port))
            .ok_or_else(invalid)?;
        Ok((usize::from(port), physical))
    }

    fn class_port(
        &self,
        state: &mut HubState,
        setup: SetupPacket,
        buf: &mut [u8],
    ) -> Result<usize> {
        match (setup.request_direction(), setup.b_request) {
            (RequestDirection::DeviceToHost, USB_REQUEST_GET_STATUS) => {
                if usize::from(setup.w_length) != UsbPortStatus::LEN {
                    return Err(RootHubError::InvalidLength {
                        reason: "GetPortStatus requires wLength == 4",
                    });
                }
                if setup.w_value != 0 {
                    return Err(RootHubError::InvalidValue {
                        value: setup.w_value,
                        reason: "unsupported port status type",
                    });
                }
                let (port, physical) = self.port(setup)?;
                let portsc = self.controller.read_portsc(physical);
                let status = UsbPortStatus {
                    status: port_status_from_portsc(self.class, portsc),
                    change: state.ports.change(port).unwrap_or(PortChange::empty()),
                };
                respond(setup, buf, &status.to_bytes())
            }
            (RequestDirection::HostToDevice, USB_REQUEST_SET_FEATURE) => {
                let (port, physical) = self.port(setup)?;
                self.set_port_feature(setup, port, physical)?;
                Ok(0)
            }
            (RequestDirection::HostToDevice, USB_REQUEST_CLEAR_FEATURE) => {
                let (port, physical) = self.port(setup)?;
                self.clear_port_feature(state, setup, port, physical)?;
                Ok(0)
            }
            _ => Err(unsupported(setup)),
        }
    }

    fn write_port(&self, physical: u8, set: u32) {
        let current = self.controller.read_portsc(physical);
        self.controller
            .write_portsc(physical, regs::portsc_write_value(current, set));
    }

    fn set_port_feature(&self, setup: SetupPacket, port: usize, physical: u8) -> Result<()> {
        let feature = setup.w_value;
        let link_state = |pls: u32| regs::PORTSC_LWS | (pls << regs::PORTSC_PLS_SHIFT);

        let set = match (self.class, feature) {
            (_, HUB_PORT_FEATURE_POWER) => regs::PORTSC_PP,
            (_, HUB_PORT_FEATURE_RESET) => regs::PORTSC_PR,
            (SpeedClass::Usb2, HUB_PORT_FEATURE_SUSPEND) => link_state(regs::PLS_U3),
            (SpeedClass::SuperSpeed, HUB_PORT_FEATURE_BH_PORT_RESET) => regs::PORTSC_WPR,
            (SpeedClass::SuperSpeed, HUB_PORT_FEATURE_LINK_STATE) => {
                let pls = u32::from(setup.index_selector());
                if pls > regs::PLS_RX_DETECT {
                    return Err(RootHubError::InvalidValue {
                        value: setup.w_index,
                        reason: "link state cannot be requested",
                    });
                }
                link_state(pls)
            }
            (SpeedClass::SuperSpeed, HUB_PORT_FEATURE_REMOTE_WAKE_MASK) => {
                let mask = setup.index_selector();
                let mut wake = 0;
                if mask & 0x01 != 0 {
                    wake |= regs::PORTSC_WCE;
                }
                if mask & 0x02 != 0 {
                    wake |= regs::PORTSC_WDE;
                }
                if mask & 0x04 != 0 {
                    wake |= regs::PORTSC_WOE;
                }
                let current = self.controller.read_portsc(physical);
                let cleared = current & !(regs::PORTSC_WCE | regs::PORTSC_WDE | regs::PORTSC_WOE);
                self.controller
                    .write_portsc(physical, regs::portsc_write_value(cleared, wake));
                debug!(class = %self.class, port, physical, mask, "set remote wake mask");
                return Ok(());
            }
            _ => return Err(RootHubError::InvalidFeature { feature }),
        };

        debug!(class = %self.class, port, physical, feature, "set port feature");
        self.write_port(physical, set);
        Ok(())
    }

    fn clear_port_feature(
        &self,
        state: &mut HubState,
        setup: SetupPacket,
        port: usize,
        physical: u8,
    ) -> Result<()> {
        let feature = setup.w_value;

        if let Some(change) = change_for_feature(feature) {
            if !PortChange::valid_for(self.class).contains(change) {
                return Err(RootHubError::InvalidFeature { feature });
            }
            state.ports.clear(port, change);
            return Ok(());
        }

        match (self.class, feature) {
            (_, HUB_PORT_FEATURE_POWER) => {
                let current = self.controller.read_portsc(physical);
                self.controller.write_portsc(
                    physical,
                    regs::portsc_write_value(current, 0) & !regs::PORTSC_PP,
                );
            }
            // PED is write-1-to-disable.
            (SpeedClass::Usb2, HUB_PORT_FEATURE_ENABLE) => {
                self.write_port(physical, regs::PORTSC_PED);
            }
            (SpeedClass::Usb2, HUB_PORT_FEATURE_SUSPEND) => {
                self.write_port(
                    physical,
                    regs::PORTSC_LWS | (regs::PLS_RESUME << regs::PORTSC_PLS_SHIFT),
                );
            }
            _ => return Err(RootHubError::InvalidFeature { feature }),
        }

        debug!(class = %self.class, port, physical, feature, "clear port feature");
        Ok(())
    }
}
