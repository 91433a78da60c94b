//! A virtual hub fronting the xHCI root ports of one speed class.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::config::RootHubConfig;
use crate::control::ControlEngine;
use crate::controller::HostController;
use crate::descriptor::Descriptors;
use crate::error::{Result, RootHubError};
use crate::notify::{complete_all, ChangeQueue, InterruptRequest, SubmitOutcome};
use crate::port::{PortChange, PortMap, PortStatusTable};
use crate::setup::SetupPacket;
use crate::speed::SpeedClass;

pub mod device;

pub use device::{RootHubDevice, UsbTransfer};

/// Mutable state of one root hub, guarded by [`RootHub`]'s lock.
#[derive(Debug)]
pub(crate) struct HubState {
    pub(crate) ports: PortStatusTable,
    pub(crate) queue: ChangeQueue,
    pub(crate) configuration: u8,
}

pub struct RootHub {
    class: SpeedClass,
    map: PortMap,
    descriptors: Descriptors,
    controller: Arc<dyn HostController>,
    state: Mutex<HubState>,
}

impl std::fmt::Debug for RootHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RootHub")
            .field("class", &self.class)
            .field("map", &self.map)
            .finish_non_exhaustive()
    }
}

impl RootHub {
    pub fn new(
        class: SpeedClass,
        map: PortMap,
        controller: Arc<dyn HostController>,
        config: &RootHubConfig,
    ) -> Self {
        let num_ports = map.len();
        Self {
            class,
            descriptors: Descriptors::new(class, num_ports, config),
            map,
            controller,
            state: Mutex::new(HubState {
                ports: PortStatusTable::new(class, num_ports),
                queue: ChangeQueue::new(),
                configuration: 0,
            }),
        }
    }

    pub fn speed(&self) -> SpeedClass {
        self.class
    }

    pub fn port_count(&self) -> usize {
        self.map.len()
    }

    pub fn port_map(&self) -> &PortMap {
        &self.map
    }

    pub fn descriptors(&self) -> &Descriptors {
        &self.descriptors
    }

    /// True once [`RootHub::cancel_all`] has run.
    pub fn is_removed(&self) -> bool {
        self.lock().queue.is_closed()
    }

    /// Change bits currently latched on virtual `port`, or `None` if out of range.
    pub fn port_change(&self, port: usize) -> Option<PortChange> {
        self.lock().ports.change(port)
    }

    fn lock(&self) -> MutexGuard<'_, HubState> {
        // Completions never run under the lock, so a poisoned state is still consistent.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Answers one control transfer. See [`crate::control`].
    pub fn control(&self, setup: SetupPacket, buf: &mut [u8]) -> Result<usize> {
        let mut state = self.lock();
        if state.queue.is_closed() {
            return Err(RootHubError::DeviceGone);
        }
        let engine = ControlEngine {
            class: self.class,
            map: &self.map,
            descriptors: &self.descriptors,
            controller: self.controller.as_ref(),
        };
        engine.handle(&mut state, setup, buf)
    }

    /// Submits an interrupt IN request on the status-change endpoint.
    ///
    /// On `Err` the request is dropped without its completion running. Otherwise the
    /// completion runs exactly once: immediately if a change is already latched, or later from
    /// [`RootHub::notify_port_changed`] or a cancellation.
    pub fn submit_interrupt(&self, request: InterruptRequest) -> Result<SubmitOutcome> {
        let mut state = self.lock();
        state.queue.admit(request.stream())?;

        if state.ports.any_change() {
            let bitmap = state.ports.change_bitmap();
            drop(state);
            debug!(
                class = %self.class,
                stream = request.stream(),
                ?bitmap,
                "interrupt completed on submit"
            );
            request.complete(Ok(bitmap));
            return Ok(SubmitOutcome::Completed);
        }

        debug!(class = %self.class, stream = request.stream(), "interrupt parked");
        state.queue.park(request);
        Ok(SubmitOutcome::Queued)
    }

    /// Latches `bits` on the virtual port mapped to `physical` and wakes every parked request.
    ///
    /// Returns false if this hub does not own `physical`.
    pub fn notify_port_changed(&self, physical: u8, bits: PortChange) -> bool {
        let Some(port) = self.map.virtual_port(physical) else {
            return false;
        };
        if bits.is_empty() {
            return true;
        }

        let mut state = self.lock();
        let new = state.ports.merge(port, bits);
        if !state.ports.any_change() {
            return true;
        }
        let waiters = state.queue.drain();
        let bitmap = state.ports.change_bitmap();
        drop(state);

        debug!(
            class = %self.class,
            port,
            physical,
            new = new.bits(),
            waiters = waiters.len(),
            "port change"
        );
        complete_all(waiters, &Ok(bitmap));
        true
    }

    /// Closes the hub: every parked request completes with [`RootHubError::DeviceGone`] and
    /// later requests fail. Idempotent.
    pub fn cancel_all(&self) {
        let cancelled = self.lock().queue.close();
        if !cancelled.is_empty() {
            debug!(class = %self.class, count = cancelled.len(), "cancelling parked interrupts");
        }
        complete_all(cancelled, &Err(RootHubError::DeviceGone));
    }

    /// Cancels the request parked on `stream`, if any. Returns whether one was found.
    pub fn cancel_stream(&self, stream: u32) -> bool {
        let request = self.lock().queue.take_stream(stream);
        let Some(request) = request else {
            return false;
        };
        request.complete(Err(RootHubError::DeviceGone));
        true
    }

    pub fn pending_interrupts(&self) -> usize {
        self.lock().queue.len()
    }
}
