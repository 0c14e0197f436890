/// Concurrent membership tests
///
/// Independent callers mutate the same groups at the same time.
/// Run with: cargo test --test flash_group_concurrency_tests
use async_trait::async_trait;
use flashtopo::{
    ConsensusSink, FlashGroupManager, FlashNodeTarget, InMemoryConsensusSink,
    InMemoryIdAllocator, InMemoryNodeRegistry, NodeRegistry, RaftCommand, RaftOp,
    TopologyConfig, TopologyError, UNUSED_FLASH_GROUP_ID, flash_node_key,
};
use futures::future::join_all;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Barrier;

/// Holds back submissions of one record kind before committing them.
struct DelayingSink {
    inner: InMemoryConsensusSink,
    delayed: RaftOp,
    delay: Duration,
}

impl DelayingSink {
    fn new(delayed: RaftOp, delay: Duration) -> Self {
        Self {
            inner: InMemoryConsensusSink::new(),
            delayed,
            delay,
        }
    }

    async fn count(&self, op: RaftOp) -> usize {
        self.inner
            .records()
            .await
            .iter()
            .filter(|record| record.op == op)
            .count()
    }
}

#[async_trait]
impl ConsensusSink for DelayingSink {
    async fn submit(&self, command: RaftCommand) -> flashtopo::Result<()> {
        if command.op == self.delayed {
            tokio::time::sleep(self.delay).await;
        }
        self.inner.submit(command).await
    }
}

fn manager_with_sink(
    sink: Arc<DelayingSink>,
) -> (Arc<FlashGroupManager>, Arc<InMemoryNodeRegistry>) {
    let registry = Arc::new(InMemoryNodeRegistry::new());
    let manager = FlashGroupManager::new(
        TopologyConfig::new().slots_per_group(4),
        sink,
        registry.clone(),
        Arc::new(InMemoryIdAllocator::new()),
    )
    .unwrap();
    (Arc::new(manager), registry)
}

fn manager() -> (Arc<FlashGroupManager>, Arc<InMemoryNodeRegistry>) {
    let registry = Arc::new(InMemoryNodeRegistry::new());
    let manager = FlashGroupManager::new(
        TopologyConfig::new().slots_per_group(4),
        Arc::new(InMemoryConsensusSink::new()),
        registry.clone(),
        Arc::new(InMemoryIdAllocator::new()),
    )
    .unwrap();
    (Arc::new(manager), registry)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_adds_of_distinct_nodes_are_not_lost() {
    for round in 0..50 {
        let (manager, _registry) = manager();
        manager.add_flash_node("a:1", "z1", "").await.unwrap();
        manager.add_flash_node("b:1", "z1", "").await.unwrap();
        let group_id = manager.create_flash_group(Vec::new()).await.unwrap().id;

        let barrier = Arc::new(Barrier::new(2));
        let mut handles = Vec::new();
        for addr in ["a:1", "b:1"] {
            let manager = Arc::clone(&manager);
            let barrier = Arc::clone(&barrier);
            handles.push(tokio::spawn(async move {
                barrier.wait().await;
                manager
                    .add_flash_node_to_group(group_id, FlashNodeTarget::Host(addr.to_string()))
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let view = manager.get_flash_group(group_id).await.unwrap();
        assert_eq!(view.flash_node_count, 2, "round {} lost a member", round);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_racing_assignments_of_one_node_pick_one_group() {
    for round in 0..20 {
        let (manager, registry) = manager();
        manager.add_flash_node("a:1", "z1", "").await.unwrap();
        let mut ids = Vec::new();
        for _ in 0..4 {
            ids.push(manager.create_flash_group(Vec::new()).await.unwrap().id);
        }

        let outcomes = join_all(ids.iter().map(|id| {
            let manager = Arc::clone(&manager);
            let id = *id;
            tokio::spawn(async move {
                manager
                    .add_flash_node_to_group(id, FlashNodeTarget::Host("a:1".to_string()))
                    .await
                    .map(|_| id)
            })
        }))
        .await;

        let mut winners = Vec::new();
        for outcome in outcomes {
            match outcome.unwrap() {
                Ok(id) => winners.push(id),
                Err(TopologyError::Conflict(_)) => {}
                Err(other) => panic!("round {}: unexpected error {:?}", round, other),
            }
        }
        assert_eq!(winners.len(), 1, "round {}", round);

        let node = registry.lookup("a:1").await.unwrap();
        assert_eq!(node.flash_group_id().unwrap(), winners[0]);
        for id in &ids {
            let count = manager.get_flash_group(*id).await.unwrap().flash_node_count;
            assert_eq!(count, usize::from(*id == winners[0]));
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_creates_never_share_slots() {
    let (manager, _registry) = manager();

    let created = join_all((0..16).map(|_| {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move { manager.create_flash_group(Vec::new()).await })
    }))
    .await;

    let mut seen = HashSet::new();
    for view in created {
        let view = view.unwrap().unwrap();
        assert_eq!(view.slots.len(), 4);
        for slot in view.slots {
            assert!(seen.insert(slot), "slot {} handed out twice", slot);
        }
    }
    assert_eq!(manager.topology().owned_slot_count().unwrap(), 64);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_readers_run_alongside_membership_changes() {
    let (manager, registry) = manager();
    let mut addrs = Vec::new();
    for idx in 0..8 {
        let addr = format!("10.0.0.{}:17430", idx);
        manager.add_flash_node(&addr, "z1", "").await.unwrap();
        addrs.push(addr);
    }
    let group_id = manager.create_flash_group(Vec::new()).await.unwrap().id;
    manager.set_flash_group_status(group_id, true).await.unwrap();

    let writer = {
        let manager = Arc::clone(&manager);
        let addrs = addrs.clone();
        tokio::spawn(async move {
            for addr in &addrs {
                manager
                    .add_flash_node_to_group(group_id, FlashNodeTarget::Host(addr.clone()))
                    .await
                    .unwrap();
            }
            for addr in &addrs {
                manager
                    .remove_flash_node_from_group(group_id, FlashNodeTarget::Host(addr.clone()))
                    .await
                    .unwrap();
            }
        })
    };

    let reader = {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move {
            for _ in 0..200 {
                let view = manager.get_flash_group(group_id).await.unwrap();
                assert!(view.flash_node_count <= 8);
                let snapshot = manager.client_flash_groups();
                if !snapshot.is_empty() {
                    serde_json::from_slice::<serde_json::Value>(&snapshot).unwrap();
                }
                tokio::task::yield_now().await;
            }
        })
    };

    writer.await.unwrap();
    reader.await.unwrap();

    for addr in &addrs {
        let node = registry.lookup(addr).await.unwrap();
        assert_eq!(node.flash_group_id().unwrap(), UNUSED_FLASH_GROUP_ID);
    }
    assert_eq!(
        manager.get_flash_group(group_id).await.unwrap().flash_node_count,
        0
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_group_removed_during_assignment_releases_node() {
    let sink = Arc::new(DelayingSink::new(
        RaftOp::UpdateFlashNode,
        Duration::from_millis(200),
    ));
    let (manager, registry) = manager_with_sink(sink.clone());
    let node_id = manager.add_flash_node("a:1", "z1", "").await.unwrap().id;
    let group_id = manager.create_flash_group(vec![10]).await.unwrap().id;

    let adding = {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move {
            manager
                .add_flash_node_to_group(group_id, FlashNodeTarget::Host("a:1".to_string()))
                .await
        })
    };
    // Let the assignment record get in flight before the group goes away.
    tokio::time::sleep(Duration::from_millis(50)).await;
    let removal = manager.remove_flash_group(group_id).await.unwrap();
    assert!(removal.evicted_hosts.is_empty());

    let err = adding.await.unwrap().unwrap_err();
    assert!(matches!(err, TopologyError::NotFound(_)), "{:?}", err);

    let node = registry.lookup("a:1").await.unwrap();
    assert_eq!(node.flash_group_id().unwrap(), UNUSED_FLASH_GROUP_ID);
    let record = sink
        .inner
        .committed_value(&flash_node_key(node_id, "a:1"))
        .await
        .unwrap();
    let value: serde_json::Value = serde_json::from_slice(&record).unwrap();
    assert_eq!(value["flash_group_id"], 0);

    let next = manager.create_flash_group(vec![20]).await.unwrap().id;
    let view = manager
        .add_flash_node_to_group(next, FlashNodeTarget::Host("a:1".to_string()))
        .await
        .unwrap();
    assert_eq!(view.flash_node_count, 1);
    assert_eq!(node.flash_group_id().unwrap(), next);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_registration_persists_one_record() {
    let sink = Arc::new(DelayingSink::new(
        RaftOp::AddFlashNode,
        Duration::from_millis(100),
    ));
    let (manager, registry) = manager_with_sink(sink.clone());

    let outcomes = join_all((0..2).map(|_| {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move { manager.add_flash_node("a:1", "z1", "").await })
    }))
    .await;

    let mut registered = Vec::new();
    for outcome in outcomes {
        match outcome.unwrap() {
            Ok(info) => registered.push(info.id),
            Err(TopologyError::Conflict(_)) => {}
            Err(other) => panic!("unexpected error {:?}", other),
        }
    }
    assert_eq!(registered.len(), 1);
    assert_eq!(sink.count(RaftOp::AddFlashNode).await, 1);
    assert_eq!(registry.lookup("a:1").await.unwrap().id(), registered[0]);
}
