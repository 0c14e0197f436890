// ============================================================================
// Flash group topology manager
// ============================================================================

pub mod config;
pub mod consensus;
pub mod core;
pub mod flash;
pub mod node;
pub mod web;

pub use config::TopologyConfig;
pub use consensus::{
    ConsensusSink, IdAllocator, InMemoryConsensusSink, InMemoryIdAllocator, RaftCommand, RaftOp,
    flash_group_key, flash_node_key,
};
pub use crate::core::{
    ClientFlashGroupView, FlashGroupAdminView, FlashGroupRemoval, FlashGroupStatus,
    FlashGroupValue, FlashGroupsClientView, FlashNodeViewInfo, Result, TopologyError,
    UNUSED_FLASH_GROUP_ID,
};
pub use flash::{
    FlashGroup, FlashGroupManager, FlashGroupRing, FlashNodeTarget, FlashNodeTopology,
    FlashNodeZone,
};
pub use node::{FlashNode, FlashNodeValue, InMemoryNodeRegistry, NodeRegistry};
