use crate::core::{Result, TopologyError};
use crate::node::FlashNode;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{Level, event};

/// Flash nodes physically located in one zone.
///
/// Used for placement only; group membership is tracked on the nodes and
/// groups themselves.
pub struct FlashNodeZone {
    name: String,
    flash_nodes: RwLock<BTreeMap<String, Arc<FlashNode>>>,
}

impl FlashNodeZone {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            flash_nodes: RwLock::new(BTreeMap::new()),
        }
    }

    pub async fn put_flash_node(&self, node: Arc<FlashNode>) {
        let mut nodes = self.flash_nodes.write().await;
        nodes.insert(node.addr().to_string(), node);
    }

    pub async fn flash_node_count(&self) -> usize {
        self.flash_nodes.read().await.len()
    }

    /// Picks `count` distinct nodes that are active, enabled, unassigned and
    /// not in `exclude_hosts`, in address order.
    ///
    /// All or nothing: when fewer than `count` qualify nothing is returned and
    /// the error carries how many were found.
    pub async fn select_flash_nodes(
        &self,
        count: usize,
        exclude_hosts: &[String],
    ) -> Result<Vec<String>> {
        let excluded: HashSet<&str> = exclude_hosts.iter().map(String::as_str).collect();
        let nodes = self.flash_nodes.read().await;

        let mut selected = Vec::with_capacity(count);
        for (addr, node) in nodes.iter() {
            if selected.len() >= count {
                break;
            }
            if excluded.contains(addr.as_str()) || !node.is_writable()? {
                continue;
            }
            selected.push(addr.clone());
        }

        if selected.len() < count {
            event!(
                Level::WARN,
                zone = %self.name,
                found = selected.len(),
                requested = count,
                "not enough writable flash nodes in zone"
            );
            return Err(TopologyError::InsufficientCapacity {
                found: selected.len(),
                requested: count,
            });
        }
        Ok(selected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn zone_with(addrs: &[&str]) -> (FlashNodeZone, Vec<Arc<FlashNode>>) {
        let zone = FlashNodeZone::new("z1");
        let mut nodes = Vec::new();
        for (idx, addr) in addrs.iter().enumerate() {
            let node = Arc::new(FlashNode::new(idx as u64 + 1, *addr, "z1", "test"));
            zone.put_flash_node(node.clone()).await;
            nodes.push(node);
        }
        (zone, nodes)
    }

    #[tokio::test]
    async fn test_select_skips_excluded_and_assigned() {
        let (zone, nodes) = zone_with(&["a:1", "b:1", "c:1", "d:1"]).await;
        nodes[1].lock().await.set_flash_group_id(5).unwrap();

        let selected = zone
            .select_flash_nodes(2, &["a:1".to_string()])
            .await
            .unwrap();
        assert_eq!(selected, vec!["c:1".to_string(), "d:1".to_string()]);
    }

    #[tokio::test]
    async fn test_select_skips_inactive_and_disabled() {
        let (zone, nodes) = zone_with(&["a:1", "b:1", "c:1"]).await;
        nodes[0].set_enable(false).unwrap();
        nodes[2]
            .report_heartbeat(chrono::Utc::now() - chrono::Duration::hours(1))
            .unwrap();
        nodes[2]
            .lock()
            .await
            .ensure_live(std::time::Duration::from_secs(1))
            .unwrap_err();

        let selected = zone.select_flash_nodes(1, &[]).await.unwrap();
        assert_eq!(selected, vec!["b:1".to_string()]);
    }

    #[tokio::test]
    async fn test_select_is_all_or_nothing() {
        let (zone, _nodes) = zone_with(&["a:1", "b:1"]).await;

        let err = zone.select_flash_nodes(3, &[]).await.unwrap_err();
        match err {
            TopologyError::InsufficientCapacity { found, requested } => {
                assert_eq!(found, 2);
                assert_eq!(requested, 3);
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(zone.flash_node_count().await, 2);
    }
}
