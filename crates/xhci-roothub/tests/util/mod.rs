#![allow(dead_code)]

use std::sync::{mpsc, Arc, Mutex};

use xhci_roothub::port::PortMap;
use xhci_roothub::regs;
use xhci_roothub::speed::encode_supported_protocol;
use xhci_roothub::{
    HostController, InterruptRequest, Result, RootHub, RootHubConfig, SetupPacket, SpeedClass,
};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// Register-level model of an xHCI root port array.
///
/// Writes follow the `PORTSC` rules the root hub relies on: change bits are write-1-to-clear,
/// `PED` is write-1-to-disable, `PR`/`WPR`/`LWS` are strobes, `PP` and the wake enables are
/// plain read-write bits.
pub struct FakeController {
    caps: Vec<u32>,
    ports: Mutex<Vec<u32>>,
    writes: Mutex<Vec<(u8, u32)>>,
}

impl FakeController {
    /// `layout` lists `(major revision, first port, count)` entries in capability order.
    pub fn new(layout: &[(u8, u8, u8)]) -> Arc<Self> {
        let mut caps = Vec::new();
        for (idx, &(major, offset, count)) in layout.iter().enumerate() {
            let next = if idx + 1 == layout.len() { 0 } else { 4 };
            caps.extend(encode_supported_protocol(major, 0, offset, count, next));
        }
        let port_count = layout
            .iter()
            .map(|&(_, offset, count)| offset + count - 1)
            .max()
            .unwrap_or(0);
        Arc::new(Self {
            caps,
            ports: Mutex::new(vec![regs::PORTSC_PP; usize::from(port_count)]),
            writes: Mutex::new(Vec::new()),
        })
    }

    /// USB3 on physical 1-2, USB2 on physical 3-6.
    pub fn mixed() -> Arc<Self> {
        Self::new(&[(3, 1, 2), (2, 3, 4)])
    }

    pub fn portsc(&self, port: u8) -> u32 {
        self.ports.lock().unwrap()[usize::from(port) - 1]
    }

    /// Sets the register directly, as hardware would.
    pub fn set_portsc(&self, port: u8, value: u32) {
        self.ports.lock().unwrap()[usize::from(port) - 1] = value;
    }

    /// Hardware-side: plug in a device and latch CSC.
    pub fn connect(&self, port: u8, speed: u32) {
        let mut ports = self.ports.lock().unwrap();
        let reg = &mut ports[usize::from(port) - 1];
        *reg |= regs::PORTSC_CCS | regs::PORTSC_CSC | (speed << regs::PORTSC_SPEED_SHIFT);
    }

    /// Hardware-side: finish a port reset, enabling the port and latching PRC.
    pub fn complete_reset(&self, port: u8) {
        let mut ports = self.ports.lock().unwrap();
        let reg = &mut ports[usize::from(port) - 1];
        *reg &= !regs::PORTSC_PR;
        *reg |= regs::PORTSC_PED | regs::PORTSC_PRC;
    }

    pub fn writes(&self) -> Vec<(u8, u32)> {
        self.writes.lock().unwrap().clone()
    }

    pub fn clear_writes(&self) {
        self.writes.lock().unwrap().clear();
    }
}

impl HostController for FakeController {
    fn port_count(&self) -> u8 {
        self.ports.lock().unwrap().len() as u8
    }

    fn ext_caps(&self) -> Vec<u32> {
        self.caps.clone()
    }

    fn read_portsc(&self, port: u8) -> u32 {
        self.portsc(port)
    }

    fn write_portsc(&self, port: u8, value: u32) {
        self.writes.lock().unwrap().push((port, value));

        let mut ports = self.ports.lock().unwrap();
        let reg = &mut ports[usize::from(port) - 1];
        let mut next = *reg & !regs::PORTSC_RW_MASK;
        next |= value & regs::PORTSC_RW_MASK;
        next &= !(value & regs::PORTSC_CHANGE_MASK);
        if value & regs::PORTSC_PED != 0 {
            next &= !regs::PORTSC_PED;
        }
        if value & regs::PORTSC_PR != 0 {
            next |= regs::PORTSC_PR;
        }
        if value & regs::PORTSC_LWS != 0 {
            next = (next & !regs::PORTSC_PLS_MASK) | (value & regs::PORTSC_PLS_MASK);
        }
        if value & regs::PORTSC_WPR != 0 {
            next |= regs::PORTSC_PR;
        }
        if next & regs::PORTSC_PP == 0 {
            next &= !(regs::PORTSC_PED | regs::PORTSC_CCS);
        }
        *reg = next;
    }
}

/// Root hub over the USB2 ports of [`FakeController::mixed`] (virtual 1-4 = physical 3-6).
pub fn usb2_hub(ctrl: &Arc<FakeController>) -> Arc<RootHub> {
    hub(ctrl, SpeedClass::Usb2)
}

/// Root hub over the USB3 ports of [`FakeController::mixed`] (virtual 1-2 = physical 1-2).
pub fn usb3_hub(ctrl: &Arc<FakeController>) -> Arc<RootHub> {
    hub(ctrl, SpeedClass::SuperSpeed)
}

pub fn hub(ctrl: &Arc<FakeController>, class: SpeedClass) -> Arc<RootHub> {
    let protocols = xhci_roothub::speed::parse_supported_protocols(&ctrl.ext_caps());
    let map = PortMap::build(&protocols, class, ctrl.port_count());
    Arc::new(RootHub::new(
        class,
        map,
        ctrl.clone(),
        &RootHubConfig::default(),
    ))
}

pub fn setup(
    bm_request_type: u8,
    b_request: u8,
    w_value: u16,
    w_index: u16,
    w_length: u16,
) -> SetupPacket {
    SetupPacket {
        bm_request_type,
        b_request,
        w_value,
        w_index,
        w_length,
    }
}

/// Runs an IN control request and returns the data stage.
pub fn control_in(hub: &RootHub, setup: SetupPacket) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; usize::from(setup.w_length)];
    let len = hub.control(setup, &mut buf)?;
    buf.truncate(len);
    Ok(buf)
}

pub fn control_out(hub: &RootHub, setup: SetupPacket) -> Result<()> {
    let len = hub.control(setup, &mut [])?;
    assert_eq!(len, 0, "OUT requests have no data stage");
    Ok(())
}

pub fn get_port_status(hub: &RootHub, port: u16) -> Result<(u16, u16)> {
    let data = control_in(hub, setup(0xa3, 0x00, 0, port, 4))?;
    Ok((
        u16::from_le_bytes([data[0], data[1]]),
        u16::from_le_bytes([data[2], data[3]]),
    ))
}

pub fn set_port_feature(hub: &RootHub, port: u16, feature: u16) -> Result<()> {
    control_out(hub, setup(0x23, 0x03, feature, port, 0))
}

pub fn clear_port_feature(hub: &RootHub, port: u16, feature: u16) -> Result<()> {
    control_out(hub, setup(0x23, 0x01, feature, port, 0))
}

pub type Completions = mpsc::Receiver<(u32, Result<Vec<u8>>)>;

/// Interrupt request that reports `(stream, result)` on `tx` when completed.
pub fn interrupt(stream: u32, tx: &mpsc::Sender<(u32, Result<Vec<u8>>)>) -> InterruptRequest {
    let tx = tx.clone();
    InterruptRequest::new(stream, 64, move |res| {
        let _ = tx.send((stream, res));
    })
}
