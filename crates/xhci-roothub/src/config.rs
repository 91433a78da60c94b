use crate::speed::SpeedClass;

/// Identity and descriptor knobs for the virtual root hubs.
///
/// The values are baked into each hub's descriptors when it is created; changing a config
/// afterwards has no effect on running hubs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootHubConfig {
    pub vendor_id: u16,
    pub usb2_product_id: u16,
    pub usb3_product_id: u16,
    /// `bcdDevice` reported by both hubs.
    pub device_release: u16,
    pub manufacturer: String,
    pub usb2_product: String,
    pub usb3_product: String,
    /// `bInterval` of the status-change endpoint. Units depend on the speed class (2^(n-1)
    /// microframes for both high-speed and SuperSpeed).
    pub interrupt_interval: u8,
}

impl RootHubConfig {
    pub fn product_id(&self, class: SpeedClass) -> u16 {
        match class {
            SpeedClass::Usb2 => self.usb2_product_id,
            SpeedClass::SuperSpeed => self.usb3_product_id,
        }
    }

    pub fn product(&self, class: SpeedClass) -> &str {
        match class {
            SpeedClass::Usb2 => &self.usb2_product,
            SpeedClass::SuperSpeed => &self.usb3_product,
        }
    }
}

impl Default for RootHubConfig {
    fn default() -> Self {
        Self {
            vendor_id: 0x18d1,
            usb2_product_id: 0xa002,
            usb3_product_id: 0xa003,
            device_release: 0x0100,
            manufacturer: "xHCI".to_string(),
            usb2_product: "USB 2.0 Root Hub".to_string(),
            usb3_product: "USB 3.0 Root Hub".to_string(),
            interrupt_interval: 0x0c,
        }
    }
}
