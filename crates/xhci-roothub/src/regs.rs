//! xHCI register bits consumed by the root hub.
//!
//! Only the `PORTSC` layout and the extended capability headers are modelled here; everything
//! else about the controller is owned by the [`crate::HostController`] implementation.

// ---- PORTSC (xHCI 1.2 section 5.4.8) ----

/// Current Connect Status.
pub const PORTSC_CCS: u32 = 1 << 0;
/// Port Enabled/Disabled. Writing 1 disables the port.
pub const PORTSC_PED: u32 = 1 << 1;
/// Over-current Active.
pub const PORTSC_OCA: u32 = 1 << 3;
/// Port Reset.
pub const PORTSC_PR: u32 = 1 << 4;
/// Port Link State.
pub const PORTSC_PLS_SHIFT: u32 = 5;
pub const PORTSC_PLS_MASK: u32 = 0xf << PORTSC_PLS_SHIFT;
/// Port Power.
pub const PORTSC_PP: u32 = 1 << 9;
/// Port Speed (Protocol Speed ID value).
pub const PORTSC_SPEED_SHIFT: u32 = 10;
pub const PORTSC_SPEED_MASK: u32 = 0xf << PORTSC_SPEED_SHIFT;
/// Port Indicator Control.
pub const PORTSC_PIC_SHIFT: u32 = 14;
pub const PORTSC_PIC_MASK: u32 = 0x3 << PORTSC_PIC_SHIFT;
/// Port Link State Write Strobe.
pub const PORTSC_LWS: u32 = 1 << 16;
/// Connect Status Change.
pub const PORTSC_CSC: u32 = 1 << 17;
/// Port Enabled/Disabled Change.
pub const PORTSC_PEC: u32 = 1 << 18;
/// Warm Port Reset Change.
pub const PORTSC_WRC: u32 = 1 << 19;
/// Over-current Change.
pub const PORTSC_OCC: u32 = 1 << 20;
/// Port Reset Change.
pub const PORTSC_PRC: u32 = 1 << 21;
/// Port Link State Change.
pub const PORTSC_PLC: u32 = 1 << 22;
/// Port Config Error Change.
pub const PORTSC_CEC: u32 = 1 << 23;
/// Wake on Connect/Disconnect/Over-current Enable.
pub const PORTSC_WCE: u32 = 1 << 25;
pub const PORTSC_WDE: u32 = 1 << 26;
pub const PORTSC_WOE: u32 = 1 << 27;
/// Warm Port Reset (USB3 ports only).
pub const PORTSC_WPR: u32 = 1 << 31;

/// All write-1-to-clear change bits.
pub const PORTSC_CHANGE_MASK: u32 =
    PORTSC_CSC | PORTSC_PEC | PORTSC_WRC | PORTSC_OCC | PORTSC_PRC | PORTSC_PLC | PORTSC_CEC;

/// Bits that survive a read-modify-write unchanged.
///
/// Everything else is either read-only, write-1-to-clear, or a strobe that must only be written
/// deliberately (`PED`, `PR`, `LWS`, `WPR`).
pub const PORTSC_RW_MASK: u32 =
    PORTSC_PP | PORTSC_PIC_MASK | PORTSC_WCE | PORTSC_WDE | PORTSC_WOE;

/// Port link states (`PORTSC.PLS`) used by the root hub.
pub const PLS_U0: u32 = 0;
pub const PLS_U1: u32 = 1;
pub const PLS_U2: u32 = 2;
pub const PLS_U3: u32 = 3;
pub const PLS_DISABLED: u32 = 4;
pub const PLS_RX_DETECT: u32 = 5;
pub const PLS_RESUME: u32 = 15;

/// Protocol Speed ID values for the default USB2 speed mapping (xHCI 1.2 table 7-13).
pub const PSIV_FULL_SPEED: u32 = 1;
pub const PSIV_LOW_SPEED: u32 = 2;
pub const PSIV_HIGH_SPEED: u32 = 3;
pub const PSIV_SUPER_SPEED: u32 = 4;

/// Returns the value to write back to `PORTSC` so that only `set` takes effect.
///
/// Read-write bits keep their current value; change bits and strobes from `current` are dropped
/// so a feature write does not accidentally acknowledge a change or disable the port.
pub const fn portsc_write_value(current: u32, set: u32) -> u32 {
    (current & PORTSC_RW_MASK) | set
}

pub const fn portsc_link_state(portsc: u32) -> u32 {
    (portsc & PORTSC_PLS_MASK) >> PORTSC_PLS_SHIFT
}

pub const fn portsc_speed(portsc: u32) -> u32 {
    (portsc & PORTSC_SPEED_MASK) >> PORTSC_SPEED_SHIFT
}

// ---- Extended capabilities (xECP) ----

/// xHCI Extended Capability ID: USB Legacy Support.
pub const EXT_CAP_ID_USB_LEGACY_SUPPORT: u8 = 1;

/// xHCI Extended Capability ID: Supported Protocol.
pub const EXT_CAP_ID_SUPPORTED_PROTOCOL: u8 = 2;

/// Supported Protocol: Protocol name string "USB ".
pub const PROTOCOL_NAME_USB: u32 = u32::from_le_bytes(*b"USB ");
