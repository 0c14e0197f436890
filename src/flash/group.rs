use crate::consensus::{ConsensusSink, RaftCommand, RaftOp};
use crate::core::{
    FlashGroupAdminView, FlashGroupStatus, FlashGroupValue, Result, TopologyError,
};
use crate::node::FlashNode;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug)]
struct FlashGroupInner {
    value: FlashGroupValue,
    flash_nodes: HashMap<String, Arc<FlashNode>>,
    removed: bool,
}

impl FlashGroupInner {
    fn ensure_present(&self) -> Result<()> {
        if self.removed {
            return Err(TopologyError::NotFound(format!(
                "flash group {}",
                self.value.id
            )));
        }
        Ok(())
    }
}

/// A set of flash nodes responsible for a set of ring slots.
///
/// Slots, status and membership live behind one reader/writer lock. Membership
/// changes are applied here only after the node's assignment is durable.
#[derive(Debug)]
pub struct FlashGroup {
    id: u64,
    inner: RwLock<FlashGroupInner>,
}

impl FlashGroup {
    pub fn new(id: u64, slots: Vec<u32>, status: FlashGroupStatus) -> Self {
        Self {
            id,
            inner: RwLock::new(FlashGroupInner {
                value: FlashGroupValue { id, slots, status },
                flash_nodes: HashMap::new(),
                removed: false,
            }),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub async fn status(&self) -> FlashGroupStatus {
        self.inner.read().await.value.status
    }

    pub async fn slots(&self) -> Vec<u32> {
        self.inner.read().await.value.slots.clone()
    }

    pub async fn value(&self) -> FlashGroupValue {
        self.inner.read().await.value.clone()
    }

    /// Adds a member. Fails with `NotFound` once the group was deleted.
    pub async fn put_flash_node(&self, node: Arc<FlashNode>) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.ensure_present()?;
        inner.flash_nodes.insert(node.addr().to_string(), node);
        Ok(())
    }

    pub async fn remove_flash_node(&self, addr: &str) {
        self.inner.write().await.flash_nodes.remove(addr);
    }

    /// Member addresses, sorted. With `only_active`, members that are
    /// inactive or disabled are left out.
    pub async fn flash_node_hosts(&self, only_active: bool) -> Result<Vec<String>> {
        let inner = self.inner.read().await;
        let mut hosts = Vec::with_capacity(inner.flash_nodes.len());
        for (host, node) in &inner.flash_nodes {
            if only_active && !node.is_active_and_enable()? {
                continue;
            }
            hosts.push(host.clone());
        }
        hosts.sort();
        Ok(hosts)
    }

    /// Member addresses located in `zone_name`, sorted.
    pub async fn flash_node_hosts_in_zone(&self, zone_name: &str) -> Vec<String> {
        let inner = self.inner.read().await;
        let mut hosts = inner
            .flash_nodes
            .values()
            .filter(|node| node.zone_name() == zone_name)
            .map(|node| node.addr().to_string())
            .collect::<Vec<_>>();
        hosts.sort();
        hosts
    }

    pub async fn flash_node_count(&self) -> usize {
        self.inner.read().await.flash_nodes.len()
    }

    /// Projection for operators, taken under a single read lock.
    pub async fn admin_view(&self) -> Result<FlashGroupAdminView> {
        let inner = self.inner.read().await;
        let mut zone_flash_nodes: BTreeMap<String, Vec<_>> = BTreeMap::new();
        for node in inner.flash_nodes.values() {
            zone_flash_nodes
                .entry(node.zone_name().to_string())
                .or_default()
                .push(node.view_info()?);
        }
        for nodes in zone_flash_nodes.values_mut() {
            nodes.sort_by(|a, b| a.addr.cmp(&b.addr));
        }
        Ok(FlashGroupAdminView {
            id: inner.value.id,
            slots: inner.value.slots.clone(),
            status: inner.value.status,
            flash_node_count: inner.flash_nodes.len(),
            zone_flash_nodes,
        })
    }

    /// Sets the status and persists an update record while holding the write
    /// lock. A rejected write restores the previous status.
    ///
    /// Returns whether the status actually changed.
    pub async fn update_status(
        &self,
        status: FlashGroupStatus,
        sink: &dyn ConsensusSink,
    ) -> Result<bool> {
        let mut inner = self.inner.write().await;
        inner.ensure_present()?;
        let old_status = inner.value.status;
        inner.value.status = status;

        let persisted = match RaftCommand::flash_group(RaftOp::UpdateFlashGroup, &inner.value) {
            Ok(command) => sink.submit(command).await,
            Err(err) => Err(err),
        };
        if let Err(err) = persisted {
            inner.value.status = old_status;
            return Err(err.into_persistence());
        }
        Ok(old_status != status)
    }

    /// Submits the delete record for an empty group while holding the write
    /// lock, then marks the group removed so no member can be added to it.
    pub async fn delete(&self, sink: &dyn ConsensusSink) -> Result<FlashGroupValue> {
        let mut inner = self.inner.write().await;
        inner.ensure_present()?;
        if !inner.flash_nodes.is_empty() {
            return Err(TopologyError::Precondition(format!(
                "flash group {} still has {} flash nodes",
                self.id,
                inner.flash_nodes.len()
            )));
        }

        let command = RaftCommand::flash_group(RaftOp::DeleteFlashGroup, &inner.value)?;
        sink.submit(command)
            .await
            .map_err(TopologyError::into_persistence)?;
        inner.removed = true;
        Ok(inner.value.clone())
    }
}
