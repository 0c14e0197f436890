//! Interfaces to the replication log and the cluster ID allocator.
//!
//! The topology manager never treats a change as committed until a
//! [`ConsensusSink`] has accepted the corresponding [`RaftCommand`].

mod memory;

pub use memory::{InMemoryConsensusSink, InMemoryIdAllocator};

use crate::core::{FLASH_GROUP_PREFIX, FLASH_NODE_PREFIX, FlashGroupValue, Result};
use crate::node::FlashNodeValue;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Kind of metadata record submitted to the log.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum RaftOp {
    AddFlashGroup,
    DeleteFlashGroup,
    UpdateFlashGroup,
    AddFlashNode,
    UpdateFlashNode,
}

impl RaftOp {
    pub fn is_delete(&self) -> bool {
        matches!(self, RaftOp::DeleteFlashGroup)
    }
}

/// A single metadata record: operation, stable key and JSON value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RaftCommand {
    pub op: RaftOp,
    pub key: String,
    pub value: Vec<u8>,
}

impl RaftCommand {
    pub fn flash_group(op: RaftOp, value: &FlashGroupValue) -> Result<Self> {
        Ok(Self {
            op,
            key: flash_group_key(value.id),
            value: serde_json::to_vec(value)?,
        })
    }

    pub fn flash_node(op: RaftOp, value: &FlashNodeValue) -> Result<Self> {
        Ok(Self {
            op,
            key: flash_node_key(value.id, &value.addr),
            value: serde_json::to_vec(value)?,
        })
    }
}

pub fn flash_group_key(id: u64) -> String {
    format!("{}{}", FLASH_GROUP_PREFIX, id)
}

pub fn flash_node_key(id: u64, addr: &str) -> String {
    format!("{}{}#{}", FLASH_NODE_PREFIX, id, addr)
}

/// Durable, replicated metadata log.
#[async_trait]
pub trait ConsensusSink: Send + Sync {
    /// Submits a record and waits until it is committed or rejected.
    async fn submit(&self, command: RaftCommand) -> Result<()>;
}

/// Cluster-wide unique ID allocation.
#[async_trait]
pub trait IdAllocator: Send + Sync {
    async fn allocate_id(&self) -> Result<u64>;
}
