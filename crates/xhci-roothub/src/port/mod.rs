//! Hub-class port status words and the per-hub change table.
//!
//! `GetPortStatus` returns two little-endian words: `wPortStatus` (current state) and
//! `wPortChange` (latched transitions). The current half is derived from the live `PORTSC`
//! register on every read; the change half lives in [`PortStatusTable`] and is only ever set by
//! the hardware notification path and cleared by `ClearPortFeature(C_*)`.

use bitflags::bitflags;

use crate::regs;
use crate::speed::SpeedClass;

pub mod map;

pub use map::PortMap;

/// `wPortStatus` bits for USB 2.0 hub ports (USB 2.0 table 11-21).
pub mod usb2 {
    pub const PORT_CONNECTION: u16 = 1 << 0;
    pub const PORT_ENABLE: u16 = 1 << 1;
    pub const PORT_SUSPEND: u16 = 1 << 2;
    pub const PORT_OVER_CURRENT: u16 = 1 << 3;
    pub const PORT_RESET: u16 = 1 << 4;
    pub const PORT_POWER: u16 = 1 << 8;
    pub const PORT_LOW_SPEED: u16 = 1 << 9;
    pub const PORT_HIGH_SPEED: u16 = 1 << 10;
    pub const PORT_TEST: u16 = 1 << 11;
    pub const PORT_INDICATOR: u16 = 1 << 12;
}

/// `wPortStatus` bits for SuperSpeed hub ports (USB 3.2 table 10-13).
pub mod ss {
    pub const PORT_CONNECTION: u16 = 1 << 0;
    pub const PORT_ENABLE: u16 = 1 << 1;
    pub const PORT_OVER_CURRENT: u16 = 1 << 3;
    pub const PORT_RESET: u16 = 1 << 4;
    pub const PORT_LINK_STATE_SHIFT: u16 = 5;
    pub const PORT_LINK_STATE_MASK: u16 = 0xf << PORT_LINK_STATE_SHIFT;
    pub const PORT_POWER: u16 = 1 << 9;
    pub const PORT_SPEED_SHIFT: u16 = 10;
    pub const PORT_SPEED_MASK: u16 = 0x7 << PORT_SPEED_SHIFT;
}

bitflags! {
    /// `wPortChange` bits.
    ///
    /// USB 2.0 and SuperSpeed hubs share bits 0, 3 and 4; bits 1-2 are USB 2.0 only and bits 5-7
    /// are SuperSpeed only, so a single set covers both layouts. Use [`PortChange::valid_for`] to
    /// restrict to one class.
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct PortChange: u16 {
        const CONNECTION = 1 << 0;
        const ENABLE = 1 << 1;
        const SUSPEND = 1 << 2;
        const OVER_CURRENT = 1 << 3;
        const RESET = 1 << 4;
        const BH_RESET = 1 << 5;
        const LINK_STATE = 1 << 6;
        const CONFIG_ERROR = 1 << 7;
    }
}

impl PortChange {
    /// Change bits defined for ports of `class`.
    pub const fn valid_for(class: SpeedClass) -> Self {
        match class {
            SpeedClass::Usb2 => Self::CONNECTION
                .union(Self::ENABLE)
                .union(Self::SUSPEND)
                .union(Self::OVER_CURRENT)
                .union(Self::RESET),
            SpeedClass::SuperSpeed => Self::CONNECTION
                .union(Self::OVER_CURRENT)
                .union(Self::RESET)
                .union(Self::BH_RESET)
                .union(Self::LINK_STATE)
                .union(Self::CONFIG_ERROR),
        }
    }

    /// Translates latched xHCI `PORTSC` change bits into the hub layout of `class`.
    pub fn from_portsc(class: SpeedClass, portsc: u32) -> Self {
        let mut ch = PortChange::empty();
        if portsc & regs::PORTSC_CSC != 0 {
            ch |= PortChange::CONNECTION;
        }
        if portsc & regs::PORTSC_OCC != 0 {
            ch |= PortChange::OVER_CURRENT;
        }
        if portsc & regs::PORTSC_PRC != 0 {
            ch |= PortChange::RESET;
        }
        match class {
            SpeedClass::Usb2 => {
                if portsc & regs::PORTSC_PEC != 0 {
                    ch |= PortChange::ENABLE;
                }
                // On USB2 ports a link state change is the U3 -> U0 resume completing.
                if portsc & regs::PORTSC_PLC != 0 {
                    ch |= PortChange::SUSPEND;
                }
            }
            SpeedClass::SuperSpeed => {
                if portsc & regs::PORTSC_WRC != 0 {
                    ch |= PortChange::BH_RESET;
                }
                if portsc & regs::PORTSC_PLC != 0 {
                    ch |= PortChange::LINK_STATE;
                }
                if portsc & regs::PORTSC_CEC != 0 {
                    ch |= PortChange::CONFIG_ERROR;
                }
            }
        }
        ch
    }
}

/// Translates the current-state bits of `PORTSC` into `wPortStatus` for `class`.
pub fn port_status_from_portsc(class: SpeedClass, portsc: u32) -> u16 {
    let mut st = 0u16;
    match class {
        SpeedClass::Usb2 => {
            if portsc & regs::PORTSC_CCS != 0 {
                st |= usb2::PORT_CONNECTION;
            }
            if portsc & regs::PORTSC_PED != 0 {
                st |= usb2::PORT_ENABLE;
            }
            if regs::portsc_link_state(portsc) == regs::PLS_U3 {
                st |= usb2::PORT_SUSPEND;
            }
            if portsc & regs::PORTSC_OCA != 0 {
                st |= usb2::PORT_OVER_CURRENT;
            }
            if portsc & regs::PORTSC_PR != 0 {
                st |= usb2::PORT_RESET;
            }
            if portsc & regs::PORTSC_PP != 0 {
                st |= usb2::PORT_POWER;
            }
            if portsc & regs::PORTSC_PIC_MASK != 0 {
                st |= usb2::PORT_INDICATOR;
            }
            // Speed is only meaningful while something is connected.
            if portsc & regs::PORTSC_CCS != 0 {
                match regs::portsc_speed(portsc) {
                    regs::PSIV_LOW_SPEED => st |= usb2::PORT_LOW_SPEED,
                    regs::PSIV_HIGH_SPEED => st |= usb2::PORT_HIGH_SPEED,
                    _ => {}
                }
            }
        }
        SpeedClass::SuperSpeed => {
            if portsc & regs::PORTSC_CCS != 0 {
                st |= ss::PORT_CONNECTION;
            }
            if portsc & regs::PORTSC_PED != 0 {
                st |= ss::PORT_ENABLE;
            }
            if portsc & regs::PORTSC_OCA != 0 {
                st |= ss::PORT_OVER_CURRENT;
            }
            if portsc & regs::PORTSC_PR != 0 {
                st |= ss::PORT_RESET;
            }
            let pls = regs::portsc_link_state(portsc) as u16;
            st |= (pls << ss::PORT_LINK_STATE_SHIFT) & ss::PORT_LINK_STATE_MASK;
            if portsc & regs::PORTSC_PP != 0 {
                st |= ss::PORT_POWER;
            }
            // PORT_SPEED is 0 (5Gbps) for every SuperSpeed Gen1 link, which is all we report.
        }
    }
    st
}

/// One `GetPortStatus` response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsbPortStatus {
    pub status: u16,
    pub change: PortChange,
}

impl UsbPortStatus {
    pub const LEN: usize = 4;

    pub fn to_bytes(self) -> [u8; Self::LEN] {
        let st = self.status.to_le_bytes();
        let ch = self.change.bits().to_le_bytes();
        [st[0], st[1], ch[0], ch[1]]
    }

    pub fn from_bytes(bytes: [u8; Self::LEN]) -> Self {
        Self {
            status: u16::from_le_bytes([bytes[0], bytes[1]]),
            change: PortChange::from_bits_retain(u16::from_le_bytes([bytes[2], bytes[3]])),
        }
    }
}

/// Length in bytes of the hub status-change bitmap for `num_ports` ports (bit 0 is the hub).
pub fn hub_bitmap_len(num_ports: usize) -> usize {
    num_ports.saturating_add(1).div_ceil(8)
}

/// Cached change bits for every virtual port of one root hub.
///
/// Indices are virtual port numbers (1-based). Out-of-range ports read as `None` and are
/// ignored by `merge` and `clear`.
#[derive(Debug, Clone)]
pub(crate) struct PortStatusTable {
    class: SpeedClass,
    changes: Vec<PortChange>,
}

impl PortStatusTable {
    pub fn new(class: SpeedClass, num_ports: usize) -> Self {
        Self {
            class,
            changes: vec![PortChange::empty(); num_ports],
        }
    }

    fn slot_mut(&mut self, port: usize) -> Option<&mut PortChange> {
        port.checked_sub(1).and_then(|idx| self.changes.get_mut(idx))
    }

    pub fn change(&self, port: usize) -> Option<PortChange> {
        port.checked_sub(1)
            .and_then(|idx| self.changes.get(idx))
            .copied()
    }

    /// Latches `bits` on `port`. Bits the speed class does not define are dropped. Returns the
    /// bits that were newly set.
    pub fn merge(&mut self, port: usize, bits: PortChange) -> PortChange {
        let bits = bits & PortChange::valid_for(self.class);
        let Some(slot) = self.slot_mut(port) else {
            return PortChange::empty();
        };
        let new = bits - *slot;
        *slot |= bits;
        new
    }

    pub fn clear(&mut self, port: usize, bits: PortChange) {
        if let Some(slot) = self.slot_mut(port) {
            slot.remove(bits);
        }
    }

    pub fn any_change(&self) -> bool {
        self.changes.iter().any(|c| !c.is_empty())
    }

    /// Builds the interrupt endpoint bitmap: bit N set iff virtual port N has a latched change.
    pub fn change_bitmap(&self) -> Vec<u8> {
        let mut bitmap = vec![0u8; hub_bitmap_len(self.changes.len())];
        for (idx, change) in self.changes.iter().enumerate() {
            if change.is_empty() {
                continue;
            }
            let bit = idx + 1;
            bitmap[bit / 8] |= 1u8 << (bit % 8);
        }
        bitmap
    }
}
