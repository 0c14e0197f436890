use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Assignment sentinel: a flash node carrying this group id belongs to no group.
pub const UNUSED_FLASH_GROUP_ID: u64 = 0;

/// Maximum slots a single flash group may own on the ring.
pub const DEFAULT_FLASH_GROUP_SLOTS_COUNT: usize = 32;

pub const FLASH_GROUP_PREFIX: &str = "#flashGroup#";
pub const FLASH_NODE_PREFIX: &str = "#flashNode#";

/// Serving status of a flash group.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum FlashGroupStatus {
    #[default]
    Inactive,
    Active,
}

impl FlashGroupStatus {
    pub fn from_active(active: bool) -> Self {
        if active {
            FlashGroupStatus::Active
        } else {
            FlashGroupStatus::Inactive
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, FlashGroupStatus::Active)
    }
}

/// Durable shape of a flash group, as submitted to the consensus log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FlashGroupValue {
    pub id: u64,
    pub slots: Vec<u32>,
    pub status: FlashGroupStatus,
}

/// Operator-facing projection of a single flash node.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FlashNodeViewInfo {
    pub id: u64,
    pub addr: String,
    pub zone_name: String,
    pub version: String,
    pub report_time: DateTime<Utc>,
    pub is_active: bool,
    pub is_enable: bool,
    pub flash_group_id: u64,
}

/// Operator-facing projection of a flash group.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FlashGroupAdminView {
    pub id: u64,
    pub slots: Vec<u32>,
    pub status: FlashGroupStatus,
    pub flash_node_count: usize,
    /// Members keyed by zone name; nodes inside a zone are sorted by address.
    pub zone_flash_nodes: BTreeMap<String, Vec<FlashNodeViewInfo>>,
}

impl FlashGroupAdminView {
    pub fn hosts_in_zone(&self, zone_name: &str) -> Vec<String> {
        self.zone_flash_nodes
            .get(zone_name)
            .map(|nodes| nodes.iter().map(|node| node.addr.clone()).collect())
            .unwrap_or_default()
    }
}

/// Routing entry published to storage clients.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClientFlashGroupView {
    pub id: u64,
    pub slots: Vec<u32>,
    pub hosts: Vec<String>,
}

/// Payload of the client topology snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct FlashGroupsClientView {
    pub flash_groups: Vec<ClientFlashGroupView>,
}

/// Result of removing a flash group.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FlashGroupRemoval {
    pub id: u64,
    pub slots: Vec<u32>,
    pub evicted_hosts: Vec<String>,
}
