//! Parked status-change interrupt requests.
//!
//! A hub class driver keeps one interrupt IN request outstanding on the hub's status-change
//! endpoint. The request completes with the change bitmap as soon as any port has a latched
//! change, either immediately on submission or later when a port event arrives.

use std::collections::VecDeque;
use std::fmt;

use crate::error::{Result, RootHubError};

pub type InterruptCompletion = Box<dyn FnOnce(Result<Vec<u8>>) + Send + 'static>;

/// One interrupt IN transfer on the status-change endpoint.
pub struct InterruptRequest {
    stream: u32,
    length: usize,
    completion: InterruptCompletion,
}

impl InterruptRequest {
    /// `length` is the transfer's buffer size; the bitmap is truncated to it.
    pub fn new(
        stream: u32,
        length: usize,
        completion: impl FnOnce(Result<Vec<u8>>) + Send + 'static,
    ) -> Self {
        Self {
            stream,
            length,
            completion: Box::new(completion),
        }
    }

    pub fn stream(&self) -> u32 {
        self.stream
    }

    pub fn length(&self) -> usize {
        self.length
    }

    pub(crate) fn complete(self, result: Result<Vec<u8>>) {
        let length = self.length;
        (self.completion)(result.map(|mut bitmap| {
            bitmap.truncate(length);
            bitmap
        }));
    }
}

impl fmt::Debug for InterruptRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterruptRequest")
            .field("stream", &self.stream)
            .field("length", &self.length)
            .finish_non_exhaustive()
    }
}

/// What happened to an accepted interrupt request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// A change was already latched; the completion has run.
    Completed,
    /// Parked until the next port change or teardown.
    Queued,
}

/// FIFO of parked requests plus the closed flag set at teardown.
#[derive(Debug, Default)]
pub struct ChangeQueue {
    pending: VecDeque<InterruptRequest>,
    closed: bool,
}

impl ChangeQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Rejects submissions after teardown and second submissions on a stream that already has
    /// a request parked.
    pub fn admit(&self, stream: u32) -> Result<()> {
        if self.closed {
            return Err(RootHubError::DeviceGone);
        }
        if self.pending.iter().any(|req| req.stream == stream) {
            return Err(RootHubError::DuplicateInterrupt { stream });
        }
        Ok(())
    }

    pub fn park(&mut self, request: InterruptRequest) {
        self.pending.push_back(request);
    }

    /// Removes every parked request, oldest first.
    pub fn drain(&mut self) -> Vec<InterruptRequest> {
        self.pending.drain(..).collect()
    }

    /// Closes the queue and returns whatever was still parked. Later calls return nothing.
    pub fn close(&mut self) -> Vec<InterruptRequest> {
        self.closed = true;
        self.drain()
    }

    pub fn take_stream(&mut self, stream: u32) -> Option<InterruptRequest> {
        let idx = self.pending.iter().position(|req| req.stream == stream)?;
        self.pending.remove(idx)
    }
}

/// Completes `requests` in order with clones of `result`.
///
/// Must be called with no hub lock held; completions may resubmit.
pub(crate) fn complete_all(requests: Vec<InterruptRequest>, result: &Result<Vec<u8>>) {
    for request in requests {
        request.complete(result.clone());
    }
}
