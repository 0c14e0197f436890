use super::FlashNode;
use crate::core::{Result, TopologyError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Source of truth for flash nodes, keyed by network address.
#[async_trait]
pub trait NodeRegistry: Send + Sync {
    /// Looks up a node by address.
    async fn lookup(&self, addr: &str) -> Result<Arc<FlashNode>>;

    /// Registers a new node. Duplicate addresses are rejected.
    async fn register(&self, node: Arc<FlashNode>) -> Result<()>;
}

/// A `NodeRegistry` kept entirely in memory.
#[derive(Default)]
pub struct InMemoryNodeRegistry {
    nodes: RwLock<HashMap<String, Arc<FlashNode>>>,
}

impl InMemoryNodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl NodeRegistry for InMemoryNodeRegistry {
    async fn lookup(&self, addr: &str) -> Result<Arc<FlashNode>> {
        let nodes = self.nodes.read().await;
        nodes
            .get(addr)
            .cloned()
            .ok_or_else(|| TopologyError::NotFound(format!("flash node '{}'", addr)))
    }

    async fn register(&self, node: Arc<FlashNode>) -> Result<()> {
        let addr = node.addr().to_string();
        if addr.trim().is_empty() {
            return Err(TopologyError::InvalidArgument(
                "flash node addr must not be empty".to_string(),
            ));
        }
        let mut nodes = self.nodes.write().await;
        if nodes.contains_key(&addr) {
            return Err(TopologyError::Conflict(format!(
                "flash node '{}' is already registered",
                addr
            )));
        }
        nodes.insert(addr, node);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_register_and_lookup() {
        let registry = InMemoryNodeRegistry::new();
        registry
            .register(Arc::new(FlashNode::new(1, "10.0.0.2:17430", "z1", "")))
            .await
            .unwrap();
        registry
            .register(Arc::new(FlashNode::new(2, "10.0.0.1:17430", "z2", "")))
            .await
            .unwrap();

        let node = registry.lookup("10.0.0.1:17430").await.unwrap();
        assert_eq!(node.zone_name(), "z2");
        assert_eq!(registry.lookup("10.0.0.2:17430").await.unwrap().id(), 1);

        let missing = registry.lookup("10.0.0.9:17430").await;
        assert!(matches!(missing, Err(TopologyError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_duplicate_registration_conflicts() {
        let registry = InMemoryNodeRegistry::new();
        let node = Arc::new(FlashNode::new(1, "10.0.0.1:17430", "z1", ""));
        registry.register(node.clone()).await.unwrap();

        let again = registry.register(node).await;
        assert!(matches!(again, Err(TopologyError::Conflict(_))));
    }
}
