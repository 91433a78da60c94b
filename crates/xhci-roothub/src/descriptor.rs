//! Descriptor tables served by the root hubs.
//!
//! Every buffer is built once when a hub is created and handed out read-only afterwards.

use crate::config::RootHubConfig;
use crate::port::hub_bitmap_len;
use crate::speed::SpeedClass;

pub const USB_DESCRIPTOR_TYPE_DEVICE: u8 = 0x01;
pub const USB_DESCRIPTOR_TYPE_CONFIGURATION: u8 = 0x02;
pub const USB_DESCRIPTOR_TYPE_STRING: u8 = 0x03;
pub const USB_DESCRIPTOR_TYPE_INTERFACE: u8 = 0x04;
pub const USB_DESCRIPTOR_TYPE_ENDPOINT: u8 = 0x05;
pub const USB_DESCRIPTOR_TYPE_BOS: u8 = 0x0f;
pub const USB_DESCRIPTOR_TYPE_DEVICE_CAPABILITY: u8 = 0x10;
pub const USB_DESCRIPTOR_TYPE_HUB: u8 = 0x29;
pub const USB_DESCRIPTOR_TYPE_SS_HUB: u8 = 0x2a;
pub const USB_DESCRIPTOR_TYPE_SS_EP_COMPANION: u8 = 0x30;

/// Address of the status-change interrupt IN endpoint.
pub const HUB_INTERRUPT_IN_EP: u8 = 0x81;

/// SuperSpeed hubs describe at most 15 downstream ports.
pub const SS_HUB_MAX_PORTS: usize = 15;

const USB_CLASS_HUB: u8 = 0x09;
const HUB_PROTOCOL_HS_SINGLE_TT: u8 = 0x01;
const HUB_PROTOCOL_SS: u8 = 0x03;

/// Per-port power switching (bits 1:0 = 01b) and per-port over-current reporting
/// (bits 4:3 = 01b).
const HUB_W_HUB_CHARACTERISTICS: u16 = 0x0009;
/// bPwrOn2PwrGood, in 2ms units.
const HUB_POWER_ON_TO_GOOD: u8 = 10;

#[derive(Debug, Clone)]
pub struct Descriptors {
    device: Vec<u8>,
    config: Vec<u8>,
    hub: Vec<u8>,
    bos: Option<Vec<u8>>,
    strings: [Vec<u8>; 3],
}

impl Descriptors {
    pub fn new(class: SpeedClass, num_ports: usize, config: &RootHubConfig) -> Self {
        let (hub, bos) = match class {
            SpeedClass::Usb2 => (build_usb2_hub_descriptor(num_ports), None),
            SpeedClass::SuperSpeed => (
                build_ss_hub_descriptor(num_ports),
                Some(build_ss_bos_descriptor()),
            ),
        };
        Self {
            device: build_device_descriptor(class, config),
            config: build_config_descriptor(class, hub_bitmap_len(num_ports), config),
            hub,
            bos,
            strings: [
                vec![0x04, USB_DESCRIPTOR_TYPE_STRING, 0x09, 0x04], // en-US
                build_string_descriptor_utf16le(&config.manufacturer),
                build_string_descriptor_utf16le(config.product(class)),
            ],
        }
    }

    pub fn device(&self) -> &[u8] {
        &self.device
    }

    pub fn config(&self) -> &[u8] {
        &self.config
    }

    pub fn hub(&self) -> &[u8] {
        &self.hub
    }

    pub fn bos(&self) -> Option<&[u8]> {
        self.bos.as_deref()
    }

    pub fn string(&self, index: u8) -> Option<&[u8]> {
        self.strings.get(usize::from(index)).map(Vec::as_slice)
    }
}

fn build_device_descriptor(class: SpeedClass, config: &RootHubConfig) -> Vec<u8> {
    let (bcd_usb, protocol, max_packet0): (u16, u8, u8) = match class {
        SpeedClass::Usb2 => (0x0200, HUB_PROTOCOL_HS_SINGLE_TT, 64),
        // SuperSpeed encodes bMaxPacketSize0 as an exponent: 2^9 = 512.
        SpeedClass::SuperSpeed => (0x0300, HUB_PROTOCOL_SS, 9),
    };
    let bcd_usb = bcd_usb.to_le_bytes();
    let vid = config.vendor_id.to_le_bytes();
    let pid = config.product_id(class).to_le_bytes();
    let release = config.device_release.to_le_bytes();

    vec![
        0x12, // bLength
        USB_DESCRIPTOR_TYPE_DEVICE,
        bcd_usb[0],
        bcd_usb[1],
        USB_CLASS_HUB, // bDeviceClass
        0x00,          // bDeviceSubClass
        protocol,      // bDeviceProtocol
        max_packet0,
        vid[0],
        vid[1],
        pid[0],
        pid[1],
        release[0],
        release[1],
        0x01, // iManufacturer
        0x02, // iProduct
        0x00, // iSerialNumber
        0x01, // bNumConfigurations
    ]
}

fn build_config_descriptor(
    class: SpeedClass,
    interrupt_bitmap_len: usize,
    config: &RootHubConfig,
) -> Vec<u8> {
    let max_packet_size = u16::try_from(interrupt_bitmap_len).unwrap_or(u16::MAX);
    let w_max_packet_size = max_packet_size.to_le_bytes();

    // Config(9) + Interface(9) + Endpoint(7), plus the SuperSpeed endpoint companion (6).
    let total_len: u16 = match class {
        SpeedClass::Usb2 => 25,
        SpeedClass::SuperSpeed => 31,
    };
    let total = total_len.to_le_bytes();

    let mut desc = vec![
        // Configuration descriptor
        0x09, // bLength
        USB_DESCRIPTOR_TYPE_CONFIGURATION,
        total[0],
        total[1], // wTotalLength
        0x01,     // bNumInterfaces
        0x01,     // bConfigurationValue
        0x00,     // iConfiguration
        0xc0,     // bmAttributes (self powered)
        0x00,     // bMaxPower
        // Interface descriptor
        0x09, // bLength
        USB_DESCRIPTOR_TYPE_INTERFACE,
        0x00,          // bInterfaceNumber
        0x00,          // bAlternateSetting
        0x01,          // bNumEndpoints
        USB_CLASS_HUB, // bInterfaceClass
        0x00,          // bInterfaceSubClass
        0x00,          // bInterfaceProtocol
        0x00,          // iInterface
        // Endpoint descriptor (Interrupt IN)
        0x07, // bLength
        USB_DESCRIPTOR_TYPE_ENDPOINT,
        HUB_INTERRUPT_IN_EP,
        0x03, // bmAttributes (Interrupt)
        w_max_packet_size[0],
        w_max_packet_size[1],
        config.interrupt_interval,
    ];
    if class == SpeedClass::SuperSpeed {
        desc.extend_from_slice(&[
            0x06, // bLength
            USB_DESCRIPTOR_TYPE_SS_EP_COMPANION,
            0x00, // bMaxBurst
            0x00, // bmAttributes
            w_max_packet_size[0],
            w_max_packet_size[1], // wBytesPerInterval
        ]);
    }
    debug_assert_eq!(desc.len(), usize::from(total_len));
    desc
}

fn build_usb2_hub_descriptor(num_ports: usize) -> Vec<u8> {
    let bitmap_len = hub_bitmap_len(num_ports);
    let mut port_pwr_ctrl_mask = vec![0u8; bitmap_len];
    for port in 1..=num_ports {
        port_pwr_ctrl_mask[port / 8] |= 1u8 << (port % 8);
    }

    let mut desc = Vec::with_capacity(7 + 2 * bitmap_len);
    desc.push((7 + 2 * bitmap_len) as u8); // bLength
    desc.push(USB_DESCRIPTOR_TYPE_HUB);
    desc.push(num_ports as u8); // bNbrPorts
    desc.extend_from_slice(&HUB_W_HUB_CHARACTERISTICS.to_le_bytes());
    desc.push(HUB_POWER_ON_TO_GOOD);
    desc.push(0x00); // bHubContrCurrent
    desc.resize(desc.len() + bitmap_len, 0); // DeviceRemovable
    desc.extend_from_slice(&port_pwr_ctrl_mask);
    desc
}

fn build_ss_hub_descriptor(num_ports: usize) -> Vec<u8> {
    let mut desc = Vec::with_capacity(12);
    desc.push(12); // bLength
    desc.push(USB_DESCRIPTOR_TYPE_SS_HUB);
    desc.push(num_ports.min(SS_HUB_MAX_PORTS) as u8); // bNbrPorts
    desc.extend_from_slice(&HUB_W_HUB_CHARACTERISTICS.to_le_bytes());
    desc.push(HUB_POWER_ON_TO_GOOD);
    desc.push(0x00); // bHubContrCurrent
    desc.push(0x00); // bHubHdrDecLat
    desc.extend_from_slice(&0u16.to_le_bytes()); // wHubDelay
    desc.extend_from_slice(&0u16.to_le_bytes()); // DeviceRemovable
    desc
}

fn build_ss_bos_descriptor() -> Vec<u8> {
    // BOS(5) + SuperSpeed USB Device Capability(10).
    let total = 15u16.to_le_bytes();
    vec![
        0x05, // bLength
        USB_DESCRIPTOR_TYPE_BOS,
        total[0],
        total[1], // wTotalLength
        0x01,     // bNumDeviceCaps
        0x0a,     // bLength
        USB_DESCRIPTOR_TYPE_DEVICE_CAPABILITY,
        0x03, // bDevCapabilityType (SuperSpeed USB)
        0x00, // bmAttributes
        0x0e,
        0x00, // wSpeedsSupported (full, high, super)
        0x03, // bFunctionalitySupport
        0x0a, // bU1DevExitLat
        0xff,
        0x07, // wU2DevExitLat
    ]
}

fn build_string_descriptor_utf16le(s: &str) -> Vec<u8> {
    // bLength is a u8, so cap at 254 bytes and never split a surrogate pair.
    const MAX_LEN: usize = 254;

    let mut out = Vec::with_capacity(MAX_LEN);
    out.push(0); // bLength placeholder
    out.push(USB_DESCRIPTOR_TYPE_STRING);
    for ch in s.chars() {
        let mut buf = [0u16; 2];
        let units = ch.encode_utf16(&mut buf);
        if out.len() + units.len() * 2 > MAX_LEN {
            break;
        }
        for unit in units {
            out.extend_from_slice(&unit.to_le_bytes());
        }
    }
    out[0] = out.len() as u8;
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usb2_descriptors() {
        let d = Descriptors::new(SpeedClass::Usb2, 4, &RootHubConfig::default());
        let dev = d.device();
        assert_eq!(dev.len(), 18);
        assert_eq!(&dev[2..4], &[0x00, 0x02]);
        assert_eq!(dev[4], USB_CLASS_HUB);
        assert_eq!(dev[6], HUB_PROTOCOL_HS_SINGLE_TT);

        let cfg = d.config();
        assert_eq!(cfg.len(), 25);
        assert_eq!(cfg[7] & 0x40, 0x40, "self powered");
        assert_eq!(cfg[20], HUB_INTERRUPT_IN_EP);
        assert_eq!(&cfg[22..24], &[1, 0], "4 ports fit in a 1-byte bitmap");

        let hub = d.hub();
        assert_eq!(hub, &[9, 0x29, 4, 0x09, 0x00, 10, 0, 0x00, 0x1e]);
        assert!(d.bos().is_none());
    }

    #[test]
    fn usb2_hub_descriptor_scales_with_port_count() {
        let d = Descriptors::new(SpeedClass::Usb2, 8, &RootHubConfig::default());
        let hub = d.hub();
        assert_eq!(hub[0], 11);
        assert_eq!(hub[2], 8);
        assert_eq!(&hub[7..9], &[0x00, 0x00]);
        assert_eq!(&hub[9..11], &[0xfe, 0x01]);
    }

    #[test]
    fn superspeed_descriptors() {
        let d = Descriptors::new(SpeedClass::SuperSpeed, 4, &RootHubConfig::default());
        let dev = d.device();
        assert_eq!(&dev[2..4], &[0x00, 0x03]);
        assert_eq!(dev[6], HUB_PROTOCOL_SS);
        assert_eq!(dev[7], 9);

        let cfg = d.config();
        assert_eq!(cfg.len(), 31);
        assert_eq!(&cfg[2..4], &[31, 0]);
        assert_eq!(cfg[26], USB_DESCRIPTOR_TYPE_SS_EP_COMPANION);

        let hub = d.hub();
        assert_eq!(hub.len(), 12);
        assert_eq!(hub[1], USB_DESCRIPTOR_TYPE_SS_HUB);
        assert_eq!(hub[2], 4);

        let bos = d.bos().expect("SuperSpeed hub has a BOS descriptor");
        assert_eq!(usize::from(u16::from_le_bytes([bos[2], bos[3]])), bos.len());
    }

    #[test]
    fn strings_follow_config() {
        let config = RootHubConfig {
            manufacturer: "Acme".to_string(),
            ..RootHubConfig::default()
        };
        let d = Descriptors::new(SpeedClass::Usb2, 1, &config);
        assert_eq!(d.string(0), Some(&[4u8, 3, 0x09, 0x04][..]));
        assert_eq!(
            d.string(1),
            Some(&[10u8, 3, b'A', 0, b'c', 0, b'm', 0, b'e', 0][..])
        );
        assert!(d.string(3).is_none());
    }

    #[test]
    fn string_descriptors_are_capped_to_u8_length_and_remain_valid_utf16() {
        let long = "😀".repeat(1000);
        let desc = build_string_descriptor_utf16le(&long);
        assert_eq!(desc.len(), 254);
        assert_eq!(desc[0] as usize, desc.len());

        let units: Vec<u16> = desc[2..]
            .chunks_exact(2)
            .map(|b| u16::from_le_bytes([b[0], b[1]]))
            .collect();
        String::from_utf16(&units).expect("payload must be valid UTF-16");
    }
}
