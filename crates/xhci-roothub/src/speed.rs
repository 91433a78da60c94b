//! Speed classes and the controller's port-capability table.
//!
//! xHCI controllers describe which root ports speak which protocol through Supported Protocol
//! extended capabilities. Each capability covers a contiguous, 1-based range of ports. The root
//! hub layer exposes one virtual hub per speed class, so this table is what decides how
//! physical ports are grouped.

use core::fmt;

use tracing::warn;

use crate::regs;

/// Signalling class of a root port group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SpeedClass {
    /// USB 2.0 ports (low/full/high-speed).
    Usb2,
    /// USB 3.x SuperSpeed ports.
    SuperSpeed,
}

impl SpeedClass {
    /// All classes, in the order root hubs are created.
    pub const ALL: [SpeedClass; 2] = [SpeedClass::Usb2, SpeedClass::SuperSpeed];

    pub fn from_major_revision(major: u8) -> Option<Self> {
        match major {
            0x02 => Some(SpeedClass::Usb2),
            0x03 => Some(SpeedClass::SuperSpeed),
            _ => None,
        }
    }
}

impl fmt::Display for SpeedClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpeedClass::Usb2 => f.write_str("usb2"),
            SpeedClass::SuperSpeed => f.write_str("usb3"),
        }
    }
}

/// One decoded Supported Protocol capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupportedProtocol {
    pub major_revision: u8,
    pub minor_revision: u8,
    /// First physical port (1-based) covered by this entry.
    pub port_offset: u8,
    pub port_count: u8,
}

impl SupportedProtocol {
    pub fn speed_class(&self) -> Option<SpeedClass> {
        SpeedClass::from_major_revision(self.major_revision)
    }

    /// Returns true if `port` (1-based) falls inside this entry's range.
    pub fn covers(&self, port: u8) -> bool {
        let start = u16::from(self.port_offset);
        let end = start + u16::from(self.port_count);
        (start..end).contains(&u16::from(port))
    }
}

/// Upper bound on capabilities walked, so a looping `next` chain cannot hang start-up.
const MAX_EXT_CAPS: usize = 64;

/// Decodes every Supported Protocol capability in an xHCI extended capability list.
///
/// `ext_caps` holds the dwords starting at the first capability (the `xECP` offset). Entries with
/// an unknown protocol name are skipped with a warning.
pub fn parse_supported_protocols(ext_caps: &[u32]) -> Vec<SupportedProtocol> {
    let mut out = Vec::new();
    let mut idx = 0usize;

    for _ in 0..MAX_EXT_CAPS {
        let Some(&header) = ext_caps.get(idx) else {
            break;
        };
        let cap_id = (header & 0xff) as u8;
        let next = ((header >> 8) & 0xff) as usize;

        if cap_id == regs::EXT_CAP_ID_SUPPORTED_PROTOCOL {
            match (ext_caps.get(idx + 1), ext_caps.get(idx + 2)) {
                (Some(&name), Some(&ports)) if name == regs::PROTOCOL_NAME_USB => {
                    out.push(SupportedProtocol {
                        major_revision: (header >> 24) as u8,
                        minor_revision: (header >> 16) as u8,
                        port_offset: (ports & 0xff) as u8,
                        port_count: ((ports >> 8) & 0xff) as u8,
                    });
                }
                (Some(&name), Some(_)) => {
                    warn!(name, "skipping non-USB protocol capability");
                }
                _ => {
                    warn!(offset = idx, "truncated supported protocol capability");
                    break;
                }
            }
        }

        if next == 0 {
            break;
        }
        idx += next;
    }

    out
}

/// Encodes a Supported Protocol capability header and port dword.
///
/// Controller models and tests use this to build `xECP` tables.
pub const fn encode_supported_protocol(
    major: u8,
    minor: u8,
    port_offset: u8,
    port_count: u8,
    next_dwords: u8,
) -> [u32; 4] {
    [
        (regs::EXT_CAP_ID_SUPPORTED_PROTOCOL as u32)
            | ((next_dwords as u32) << 8)
            | ((minor as u32) << 16)
            | ((major as u32) << 24),
        regs::PROTOCOL_NAME_USB,
        (port_offset as u32) | ((port_count as u32) << 8),
        0,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_usb2_and_usb3_ranges_behind_legacy_support() {
        let mut caps = vec![
            // USB Legacy Support, next capability 2 dwords later.
            (regs::EXT_CAP_ID_USB_LEGACY_SUPPORT as u32) | (2 << 8),
            0,
        ];
        caps.extend(encode_supported_protocol(0x03, 0x00, 1, 4, 4));
        caps.extend(encode_supported_protocol(0x02, 0x00, 5, 4, 0));

        let protos = parse_supported_protocols(&caps);
        assert_eq!(
            protos,
            vec![
                SupportedProtocol {
                    major_revision: 3,
                    minor_revision: 0,
                    port_offset: 1,
                    port_count: 4
                },
                SupportedProtocol {
                    major_revision: 2,
                    minor_revision: 0,
                    port_offset: 5,
                    port_count: 4
                },
            ]
        );
        assert_eq!(protos[0].speed_class(), Some(SpeedClass::SuperSpeed));
        assert!(protos[1].covers(8));
        assert!(!protos[1].covers(9));
    }

    #[test]
    fn self_referencing_next_pointer_terminates() {
        // next=0 ends the list, but a next pointer that keeps landing on capabilities must still
        // be bounded.
        let mut caps = Vec::new();
        for _ in 0..(MAX_EXT_CAPS * 2) {
            caps.extend(encode_supported_protocol(0x02, 0x00, 1, 1, 4));
        }
        let protos = parse_supported_protocols(&caps);
        assert_eq!(protos.len(), MAX_EXT_CAPS);
    }

    #[test]
    fn truncated_capability_is_ignored() {
        let caps = vec![(regs::EXT_CAP_ID_SUPPORTED_PROTOCOL as u32) | (0x02 << 24)];
        assert!(parse_supported_protocols(&caps).is_empty());
    }
}
