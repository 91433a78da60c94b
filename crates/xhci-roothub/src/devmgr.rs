//! Minimal device tree the root hubs are published into.
//!
//! Nodes live in an arena and are addressed by [`DeviceId`] handles that carry a generation,
//! so a handle to a removed node never aliases a node added later in the same slot.

use std::sync::Arc;

use bitflags::bitflags;
use thiserror::Error;

use crate::error::{Result, RootHubError};
use crate::hub::UsbTransfer;

bitflags! {
    /// Readiness signals asserted on a device node.
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct DeviceSignals: u32 {
        const READABLE = 1 << 0;
        const WRITABLE = 1 << 1;
        const ERROR = 1 << 2;
        const HANGUP = 1 << 3;
    }
}

/// Operations a device node dispatches to its driver.
///
/// Every method has a default: I/O entry points fail with [`RootHubError::UnsupportedOp`],
/// lifecycle hooks do nothing.
pub trait DeviceOps: Send + Sync {
    /// Opens a new handle and returns its id.
    fn open(&self, _flags: u32) -> Result<u32> {
        Err(RootHubError::UnsupportedOp)
    }

    fn close(&self, _handle: u32) -> Result<()> {
        Err(RootHubError::UnsupportedOp)
    }

    fn read(&self, _buf: &mut [u8], _offset: u64) -> Result<usize> {
        Err(RootHubError::UnsupportedOp)
    }

    fn write(&self, _buf: &[u8], _offset: u64) -> Result<usize> {
        Err(RootHubError::UnsupportedOp)
    }

    fn ioctl(&self, op: u32, _input: &[u8], _output: &mut [u8]) -> Result<usize> {
        Err(RootHubError::UnsupportedIoctl { op })
    }

    /// Queues a USB transfer. On `Err` the transfer's completion is not called.
    fn queue_transfer(&self, _transfer: UsbTransfer) -> Result<()> {
        Err(RootHubError::UnsupportedOp)
    }

    fn suspend(&self, _flags: u32) -> Result<()> {
        Err(RootHubError::UnsupportedOp)
    }

    fn resume(&self, _flags: u32) -> Result<()> {
        Err(RootHubError::UnsupportedOp)
    }

    /// The node is about to be removed; outstanding work should be cancelled.
    fn unbind(&self) {}

    /// The node has been removed from the tree.
    fn release(&self) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceId {
    index: u32,
    generation: u32,
}

impl std::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}v{}", self.index, self.generation)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TopologyError {
    #[error("device {id} does not exist")]
    StaleId { id: DeviceId },
    #[error("device {id} still has {children} children")]
    HasChildren { id: DeviceId, children: usize },
}

struct Node {
    name: String,
    parent: Option<DeviceId>,
    children: Vec<DeviceId>,
    ops: Arc<dyn DeviceOps>,
    signals: DeviceSignals,
}

struct Slot {
    generation: u32,
    node: Option<Node>,
}

#[derive(Default)]
pub struct DeviceTree {
    slots: Vec<Slot>,
    free: Vec<u32>,
}

impl std::fmt::Debug for DeviceTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceTree")
            .field("nodes", &self.len())
            .finish()
    }
}

impl DeviceTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.node.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: DeviceId) -> bool {
        self.node(id).is_ok()
    }

    /// Adds a node with no parent.
    pub fn add_root(&mut self, name: &str, ops: Arc<dyn DeviceOps>) -> DeviceId {
        self.insert(name, None, ops)
    }

    pub fn add(
        &mut self,
        parent: DeviceId,
        name: &str,
        ops: Arc<dyn DeviceOps>,
    ) -> std::result::Result<DeviceId, TopologyError> {
        self.node(parent)?;
        let id = self.insert(name, Some(parent), ops);
        self.node_mut(parent)?.children.push(id);
        Ok(id)
    }

    fn insert(
        &mut self,
        name: &str,
        parent: Option<DeviceId>,
        ops: Arc<dyn DeviceOps>,
    ) -> DeviceId {
        let node = Node {
            name: name.to_string(),
            parent,
            children: Vec::new(),
            ops,
            signals: DeviceSignals::empty(),
        };
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.node = Some(node);
            return DeviceId {
                index,
                generation: slot.generation,
            };
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            node: Some(node),
        });
        DeviceId {
            index,
            generation: 0,
        }
    }

    /// Removes a leaf node and calls its `release` hook.
    pub fn remove(&mut self, id: DeviceId) -> std::result::Result<(), TopologyError> {
        let node = self.node(id)?;
        if !node.children.is_empty() {
            return Err(TopologyError::HasChildren {
                id,
                children: node.children.len(),
            });
        }
        let parent = node.parent;

        let slot = &mut self.slots[id.index as usize];
        let Some(node) = slot.node.take() else {
            return Err(TopologyError::StaleId { id });
        };
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);

        if let Some(parent) = parent {
            if let Ok(parent) = self.node_mut(parent) {
                parent.children.retain(|&child| child != id);
            }
        }
        node.ops.release();
        Ok(())
    }

    fn node(&self, id: DeviceId) -> std::result::Result<&Node, TopologyError> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_ref())
            .ok_or(TopologyError::StaleId { id })
    }

    fn node_mut(&mut self, id: DeviceId) -> std::result::Result<&mut Node, TopologyError> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_mut())
            .ok_or(TopologyError::StaleId { id })
    }

    pub fn name(&self, id: DeviceId) -> std::result::Result<&str, TopologyError> {
        Ok(&self.node(id)?.name)
    }

    pub fn parent(&self, id: DeviceId) -> std::result::Result<Option<DeviceId>, TopologyError> {
        Ok(self.node(id)?.parent)
    }

    pub fn children(&self, id: DeviceId) -> std::result::Result<&[DeviceId], TopologyError> {
        Ok(&self.node(id)?.children)
    }

    pub fn ops(&self, id: DeviceId) -> std::result::Result<Arc<dyn DeviceOps>, TopologyError> {
        Ok(Arc::clone(&self.node(id)?.ops))
    }

    pub fn signals(&self, id: DeviceId) -> std::result::Result<DeviceSignals, TopologyError> {
        Ok(self.node(id)?.signals)
    }

    pub fn signal_set(
        &mut self,
        id: DeviceId,
        signals: DeviceSignals,
    ) -> std::result::Result<(), TopologyError> {
        self.node_mut(id)?.signals.insert(signals);
        Ok(())
    }

    pub fn signal_clear(
        &mut self,
        id: DeviceId,
        signals: DeviceSignals,
    ) -> std::result::Result<(), TopologyError> {
        self.node_mut(id)?.signals.remove(signals);
        Ok(())
    }
}
