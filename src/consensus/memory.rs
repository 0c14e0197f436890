use super::{ConsensusSink, IdAllocator, RaftCommand};
use crate::core::{Result, TopologyError};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use tokio::sync::Mutex;

#[derive(Default)]
struct SinkState {
    log: Vec<RaftCommand>,
    committed: HashMap<String, Vec<u8>>,
    failing_keys: HashSet<String>,
}

/// An in-memory `ConsensusSink` for standalone masters and tests.
///
/// Keeps the ordered log of accepted records and the resulting key/value
/// state. Rejections can be injected to exercise rollback paths.
#[derive(Default)]
pub struct InMemoryConsensusSink {
    state: Mutex<SinkState>,
    fail_next: AtomicUsize,
}

impl InMemoryConsensusSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rejects the next `count` submissions, whatever their key.
    pub fn fail_next(&self, count: usize) {
        self.fail_next.store(count, Ordering::SeqCst);
    }

    /// Rejects every submission for `key` until cleared.
    pub async fn fail_key(&self, key: impl Into<String>) {
        self.state.lock().await.failing_keys.insert(key.into());
    }

    pub async fn clear_failures(&self) {
        self.fail_next.store(0, Ordering::SeqCst);
        self.state.lock().await.failing_keys.clear();
    }

    /// Returns all accepted records in commit order.
    pub async fn records(&self) -> Vec<RaftCommand> {
        self.state.lock().await.log.clone()
    }

    /// Returns the committed value stored under `key`, if any.
    pub async fn committed_value(&self, key: &str) -> Option<Vec<u8>> {
        self.state.lock().await.committed.get(key).cloned()
    }

    fn take_injected_failure(&self) -> bool {
        self.fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |remaining| {
                remaining.checked_sub(1)
            })
            .is_ok()
    }
}

#[async_trait]
impl ConsensusSink for InMemoryConsensusSink {
    async fn submit(&self, command: RaftCommand) -> Result<()> {
        if self.take_injected_failure() {
            return Err(TopologyError::Persistence(format!(
                "injected rejection of {:?} for key '{}'",
                command.op, command.key
            )));
        }

        let mut state = self.state.lock().await;
        if state.failing_keys.contains(&command.key) {
            return Err(TopologyError::Persistence(format!(
                "key '{}' is rejected by the log",
                command.key
            )));
        }

        if command.op.is_delete() {
            state.committed.remove(&command.key);
        } else {
            state
                .committed
                .insert(command.key.clone(), command.value.clone());
        }
        state.log.push(command);
        Ok(())
    }
}

/// Monotonic ID allocator. Never hands out 0, the unassigned sentinel.
pub struct InMemoryIdAllocator {
    next: AtomicU64,
}

impl InMemoryIdAllocator {
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    pub fn starting_at(first: u64) -> Self {
        Self {
            next: AtomicU64::new(first.max(1)),
        }
    }
}

impl Default for InMemoryIdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IdAllocator for InMemoryIdAllocator {
    async fn allocate_id(&self) -> Result<u64> {
        let id = self.next.fetch_add(1, Ordering::SeqCst);
        if id == u64::MAX {
            return Err(TopologyError::Allocation("id space exhausted".to_string()));
        }
        Ok(id)
    }
}
