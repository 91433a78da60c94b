use tracing::warn;

use crate::descriptor::SS_HUB_MAX_PORTS;
use crate::speed::{SpeedClass, SupportedProtocol};

/// Virtual-to-physical port translation for one root hub.
///
/// Virtual ports are what the hub class driver sees (`1..=len()`); physical ports are xHCI
/// port IDs (1-based). The map is built once and never changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortMap {
    physical: Vec<u8>,
}

impl PortMap {
    /// Selects every physical port in `1..=controller_ports` whose protocol entry matches
    /// `class`, in ascending order.
    ///
    /// A port covered by several entries belongs to the first one, so two maps built from the
    /// same table for different classes never share a physical port. A SuperSpeed map keeps at
    /// most [`SS_HUB_MAX_PORTS`] ports; the rest are left unclaimed.
    pub fn build(
        protocols: &[SupportedProtocol],
        class: SpeedClass,
        controller_ports: u8,
    ) -> Self {
        for proto in protocols {
            let end = u16::from(proto.port_offset) + u16::from(proto.port_count);
            if proto.port_offset == 0 || end > u16::from(controller_ports) + 1 {
                warn!(
                    offset = proto.port_offset,
                    count = proto.port_count,
                    controller_ports,
                    "supported protocol range exceeds controller ports; clamping"
                );
            }
        }

        let mut physical: Vec<u8> = (1..=controller_ports)
            .filter(|&port| owning_class(protocols, port) == Some(class))
            .collect();
        if class == SpeedClass::SuperSpeed && physical.len() > SS_HUB_MAX_PORTS {
            warn!(
                ports = physical.len(),
                max = SS_HUB_MAX_PORTS,
                dropped = ?&physical[SS_HUB_MAX_PORTS..],
                "too many SuperSpeed root ports; ignoring the excess"
            );
            physical.truncate(SS_HUB_MAX_PORTS);
        }
        Self { physical }
    }

    /// Builds a map directly from a list of physical ports.
    ///
    /// Returns `None` if the list contains a zero or a duplicate.
    pub fn from_physical(physical: Vec<u8>) -> Option<Self> {
        let mut seen = [false; 256];
        for &port in &physical {
            if port == 0 || seen[usize::from(port)] {
                return None;
            }
            seen[usize::from(port)] = true;
        }
        Some(Self { physical })
    }

    pub fn len(&self) -> usize {
        self.physical.len()
    }

    pub fn is_empty(&self) -> bool {
        self.physical.is_empty()
    }

    /// Physical port for the 1-based virtual `port`, if in range.
    pub fn physical_port(&self, port: usize) -> Option<u8> {
        port.checked_sub(1)
            .and_then(|idx| self.physical.get(idx))
            .copied()
    }

    /// Virtual port (1-based) that maps to `physical`, if this hub owns it.
    pub fn virtual_port(&self, physical: u8) -> Option<usize> {
        self.physical
            .iter()
            .position(|&p| p == physical)
            .map(|idx| idx + 1)
    }

    pub fn physical_ports(&self) -> &[u8] {
        &self.physical
    }
}

fn owning_class(protocols: &[SupportedProtocol], port: u8) -> Option<SpeedClass> {
    protocols
        .iter()
        .find(|proto| proto.covers(port))
        .and_then(SupportedProtocol::speed_class)
}
