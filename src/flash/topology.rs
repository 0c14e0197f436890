use super::group::FlashGroup;
use super::zone::FlashNodeZone;
use crate::config::TopologyConfig;
use crate::consensus::{ConsensusSink, RaftCommand, RaftOp};
use crate::core::{
    ClientFlashGroupView, FlashGroupAdminView, FlashGroupStatus, FlashGroupsClientView, Result,
    TopologyError, UNUSED_FLASH_GROUP_ID,
};
use crate::node::FlashNode;
use arc_swap::ArcSwap;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::{Mutex, RwLock};
use tracing::{Level, event};
use uuid::Uuid;

/// Registry of every flash group and zone in the cluster.
///
/// Owns the ring slot bookkeeping, the client serving switch and the
/// serialized client snapshot. Created once per master term and dropped with
/// it.
pub struct FlashNodeTopology {
    flash_groups: RwLock<HashMap<u64, Arc<FlashGroup>>>,
    zones: RwLock<HashMap<String, Arc<FlashNodeZone>>>,
    slot_owners: StdMutex<BTreeMap<u32, u64>>,
    slots_per_group: usize,
    slot_allocation_attempts: usize,
    client_off: AtomicBool,
    client_empty: Arc<Vec<u8>>,
    client_cache: ArcSwap<Vec<u8>>,
    rebuild: Mutex<()>,
}

impl FlashNodeTopology {
    pub fn new(config: &TopologyConfig) -> Result<Self> {
        config.validate().map_err(TopologyError::InvalidArgument)?;
        let client_empty = serde_json::to_vec(&FlashGroupsClientView::default())?;
        Ok(Self {
            flash_groups: RwLock::new(HashMap::new()),
            zones: RwLock::new(HashMap::new()),
            slot_owners: StdMutex::new(BTreeMap::new()),
            slots_per_group: config.slots_per_group,
            slot_allocation_attempts: config.slot_allocation_attempts,
            client_off: AtomicBool::new(false),
            client_empty: Arc::new(client_empty),
            client_cache: ArcSwap::from_pointee(Vec::new()),
            rebuild: Mutex::new(()),
        })
    }
}

// Topology behavior is split by concern.
include!("topology/registry.rs");
include!("topology/slots.rs");
include!("topology/client_cache.rs");
