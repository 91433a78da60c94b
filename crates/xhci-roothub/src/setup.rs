/// The 8-byte SETUP stage of a control transfer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SetupPacket {
    pub bm_request_type: u8,
    pub b_request: u8,
    pub w_value: u16,
    pub w_index: u16,
    pub w_length: u16,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RequestDirection {
    HostToDevice,
    DeviceToHost,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RequestType {
    Standard,
    Class,
    Vendor,
    Reserved,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RequestRecipient {
    Device,
    Interface,
    Endpoint,
    Other,
    Reserved,
}

impl SetupPacket {
    pub const LEN: usize = 8;

    pub fn from_bytes(bytes: [u8; Self::LEN]) -> Self {
        Self {
            bm_request_type: bytes[0],
            b_request: bytes[1],
            w_value: u16::from_le_bytes([bytes[2], bytes[3]]),
            w_index: u16::from_le_bytes([bytes[4], bytes[5]]),
            w_length: u16::from_le_bytes([bytes[6], bytes[7]]),
        }
    }

    pub fn request_direction(self) -> RequestDirection {
        if self.bm_request_type & 0x80 != 0 {
            RequestDirection::DeviceToHost
        } else {
            RequestDirection::HostToDevice
        }
    }

    pub fn request_type(self) -> RequestType {
        match (self.bm_request_type >> 5) & 0x3 {
            0 => RequestType::Standard,
            1 => RequestType::Class,
            2 => RequestType::Vendor,
            _ => RequestType::Reserved,
        }
    }

    pub fn recipient(self) -> RequestRecipient {
        match self.bm_request_type & 0x1f {
            0 => RequestRecipient::Device,
            1 => RequestRecipient::Interface,
            2 => RequestRecipient::Endpoint,
            3 => RequestRecipient::Other,
            _ => RequestRecipient::Reserved,
        }
    }

    /// Descriptor type for GET_DESCRIPTOR (high byte of `wValue`).
    pub fn descriptor_type(self) -> u8 {
        (self.w_value >> 8) as u8
    }

    pub fn descriptor_index(self) -> u8 {
        (self.w_value & 0x00ff) as u8
    }

    /// Hub port number carried in the low byte of `wIndex`.
    pub fn port_index(self) -> u16 {
        self.w_index & 0x00ff
    }

    /// Feature-specific selector carried in the high byte of `wIndex` (test selector, link
    /// state, U1/U2 timeout).
    pub fn index_selector(self) -> u8 {
        (self.w_index >> 8) as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_get_port_status() {
        let setup = SetupPacket::from_bytes([0xa3, 0x00, 0x00, 0x00, 0x02, 0x00, 0x04, 0x00]);
        assert_eq!(setup.request_direction(), RequestDirection::DeviceToHost);
        assert_eq!(setup.request_type(), RequestType::Class);
        assert_eq!(setup.recipient(), RequestRecipient::Other);
        assert_eq!(setup.port_index(), 2);
        assert_eq!(setup.w_length, 4);
    }

    #[test]
    fn splits_link_state_from_port_number() {
        let setup = SetupPacket {
            bm_request_type: 0x23,
            b_request: 0x03,
            w_value: 5,
            w_index: (3 << 8) | 7,
            w_length: 0,
        };
        assert_eq!(setup.port_index(), 7);
        assert_eq!(setup.index_selector(), 3);
    }
}
