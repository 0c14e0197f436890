use crate::core::DEFAULT_FLASH_GROUP_SLOTS_COUNT;
use std::time::Duration;

/// Flash topology manager configuration
#[derive(Debug, Clone)]
pub struct TopologyConfig {
    /// A node whose last report is older than this cannot join a group
    pub node_timeout: Duration,

    /// Slot cap per group, also the size of an auto-allocated batch
    pub slots_per_group: usize,

    /// Random draws allowed when auto-allocating a slot batch
    pub slot_allocation_attempts: usize,

    /// How long an HTTP caller waits for a mutation to finish
    pub request_timeout: Duration,

    /// Admin/client HTTP listen address
    pub listen_addr: String,
}

impl TopologyConfig {
    /// Create a configuration with defaults
    pub fn new() -> Self {
        Self {
            node_timeout: Duration::from_secs(180),
            slots_per_group: DEFAULT_FLASH_GROUP_SLOTS_COUNT,
            slot_allocation_attempts: 4096,
            request_timeout: Duration::from_secs(30),
            listen_addr: "127.0.0.1:17010".to_string(),
        }
    }

    /// Set the node liveness threshold
    pub fn node_timeout(mut self, timeout: Duration) -> Self {
        self.node_timeout = timeout;
        self
    }

    /// Set the per-group slot count
    pub fn slots_per_group(mut self, count: usize) -> Self {
        self.slots_per_group = count;
        self
    }

    /// Set the allocation attempt budget
    pub fn slot_allocation_attempts(mut self, attempts: usize) -> Self {
        self.slot_allocation_attempts = attempts;
        self
    }

    /// Set request timeout
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the listen address
    pub fn listen_addr(mut self, addr: &str) -> Self {
        self.listen_addr = addr.to_string();
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.slots_per_group == 0 {
            return Err("slots_per_group must be > 0".to_string());
        }

        if self.slot_allocation_attempts < self.slots_per_group {
            return Err("slot_allocation_attempts cannot be less than slots_per_group".to_string());
        }

        if self.node_timeout.is_zero() {
            return Err("node_timeout must be > 0".to_string());
        }

        if self.request_timeout.is_zero() {
            return Err("request_timeout must be > 0".to_string());
        }

        if self.listen_addr.trim().is_empty() {
            return Err("listen_addr cannot be empty".to_string());
        }

        Ok(())
    }
}

impl Default for TopologyConfig {
    fn default() -> Self {
        Self::new()
    }
}
