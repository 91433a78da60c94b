use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tracing::debug;

use super::RootHub;
use crate::descriptor::HUB_INTERRUPT_IN_EP;
use crate::devmgr::DeviceOps;
use crate::error::{Result, RootHubError};
use crate::notify::{InterruptCompletion, InterruptRequest, SubmitOutcome};
use crate::setup::SetupPacket;
use crate::speed::SpeedClass;

/// Returns the hub's bus speed as a little-endian `u32` ([`USB_SPEED_HIGH`] or
/// [`USB_SPEED_SUPER`]).
pub const IOCTL_USB_GET_DEVICE_SPEED: u32 = 0x0001;
/// Returns the number of downstream ports as a little-endian `u32`.
pub const IOCTL_USB_GET_PORT_COUNT: u32 = 0x0002;

pub const USB_SPEED_FULL: u32 = 1;
pub const USB_SPEED_LOW: u32 = 2;
pub const USB_SPEED_HIGH: u32 = 3;
pub const USB_SPEED_SUPER: u32 = 4;

pub type ControlCompletion = Box<dyn FnOnce(Result<Vec<u8>>) + Send + 'static>;

/// A transfer queued on a root hub device node.
pub enum UsbTransfer {
    /// Runs synchronously; the completion receives the IN data (empty for OUT requests).
    Control {
        setup: SetupPacket,
        complete: ControlCompletion,
    },
    /// Status-change interrupt IN on `endpoint`, tied to the handle that opened `stream`.
    Interrupt {
        stream: u32,
        endpoint: u8,
        length: usize,
        complete: InterruptCompletion,
    },
}

impl fmt::Debug for UsbTransfer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UsbTransfer::Control { setup, .. } => f
                .debug_struct("Control")
                .field("setup", setup)
                .finish_non_exhaustive(),
            UsbTransfer::Interrupt {
                stream,
                endpoint,
                length,
                ..
            } => f
                .debug_struct("Interrupt")
                .field("stream", stream)
                .field("endpoint", endpoint)
                .field("length", length)
                .finish_non_exhaustive(),
        }
    }
}

/// Device-node adapter for a [`RootHub`].
///
/// Holds only a weak reference; once the owning manager drops the hub every operation fails
/// with [`RootHubError::DeviceGone`]. Interrupt transfers are accepted only on streams returned
/// by `open` and not yet closed.
#[derive(Debug)]
pub struct RootHubDevice {
    hub: Weak<RootHub>,
    next_stream: AtomicU32,
    open_streams: Mutex<HashSet<u32>>,
}

impl RootHubDevice {
    pub fn new(hub: &Arc<RootHub>) -> Self {
        Self {
            hub: Arc::downgrade(hub),
            next_stream: AtomicU32::new(1),
            open_streams: Mutex::new(HashSet::new()),
        }
    }

    fn hub(&self) -> Result<Arc<RootHub>> {
        self.hub.upgrade().ok_or(RootHubError::DeviceGone)
    }

    fn streams(&self) -> MutexGuard<'_, HashSet<u32>> {
        self.open_streams
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn is_open(&self, stream: u32) -> bool {
        self.streams().contains(&stream)
    }
}

impl DeviceOps for RootHubDevice {
    fn open(&self, _flags: u32) -> Result<u32> {
        let hub = self.hub()?;
        if hub.is_removed() {
            return Err(RootHubError::DeviceGone);
        }
        let stream = self.next_stream.fetch_add(1, Ordering::Relaxed);
        self.streams().insert(stream);
        Ok(stream)
    }

    fn close(&self, handle: u32) -> Result<()> {
        if !self.streams().remove(&handle) {
            return Err(RootHubError::UnknownStream { stream: handle });
        }
        // A closed handle's parked request has nobody left to deliver to.
        if let Ok(hub) = self.hub() {
            hub.cancel_stream(handle);
        }
        Ok(())
    }

    fn ioctl(&self, op: u32, _input: &[u8], output: &mut [u8]) -> Result<usize> {
        let hub = self.hub()?;
        let value = match op {
            IOCTL_USB_GET_DEVICE_SPEED => match hub.speed() {
                SpeedClass::Usb2 => USB_SPEED_HIGH,
                SpeedClass::SuperSpeed => USB_SPEED_SUPER,
            },
            IOCTL_USB_GET_PORT_COUNT => hub.port_count() as u32,
            _ => return Err(RootHubError::UnsupportedIoctl { op }),
        };
        let bytes = value.to_le_bytes();
        let out = output
            .get_mut(..bytes.len())
            .ok_or(RootHubError::InvalidLength {
                reason: "ioctl output buffer too small",
            })?;
        out.copy_from_slice(&bytes);
        Ok(bytes.len())
    }

    fn queue_transfer(&self, transfer: UsbTransfer) -> Result<()> {
        let hub = self.hub()?;
        match transfer {
            UsbTransfer::Control { setup, complete } => {
                if hub.is_removed() {
                    return Err(RootHubError::DeviceGone);
                }
                let mut buf = vec![0u8; usize::from(setup.w_length)];
                let result = hub.control(setup, &mut buf).map(|len| {
                    buf.truncate(len);
                    buf
                });
                complete(result);
                Ok(())
            }
            UsbTransfer::Interrupt {
                stream,
                endpoint,
                length,
                complete,
            } => {
                if endpoint != HUB_INTERRUPT_IN_EP {
                    return Err(RootHubError::InvalidValue {
                        value: u16::from(endpoint),
                        reason: "no such endpoint",
                    });
                }
                if !self.is_open(stream) {
                    return Err(RootHubError::UnknownStream { stream });
                }
                let outcome =
                    hub.submit_interrupt(InterruptRequest::new(stream, length, complete))?;
                // A close that raced the submission may have missed the parked request.
                if outcome == SubmitOutcome::Queued && !self.is_open(stream) {
                    hub.cancel_stream(stream);
                }
                Ok(())
            }
        }
    }

    fn unbind(&self) {
        if let Ok(hub) = self.hub() {
            debug!(class = %hub.speed(), "root hub unbound");
            hub.cancel_all();
        }
    }
}
