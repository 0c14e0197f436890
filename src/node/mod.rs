pub mod registry;

pub use registry::{InMemoryNodeRegistry, NodeRegistry};

use crate::core::{FlashNodeViewInfo, Result, TopologyError, UNUSED_FLASH_GROUP_ID};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::RwLock;
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};

/// Durable shape of a flash node, as submitted to the consensus log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FlashNodeValue {
    pub id: u64,
    pub addr: String,
    pub zone_name: String,
    pub version: String,
    pub flash_group_id: u64,
    pub is_enable: bool,
}

#[derive(Debug, Clone)]
struct FlashNodeState {
    flash_group_id: u64,
    report_time: DateTime<Utc>,
    is_active: bool,
    is_enable: bool,
}

/// A cache server that can be assigned to at most one flash group.
///
/// Field reads go through a short-lived state lock. Changing the assigned
/// group requires the node's mutation lock, obtained with [`FlashNode::lock`].
#[derive(Debug)]
pub struct FlashNode {
    id: u64,
    addr: String,
    zone_name: String,
    version: String,
    mutation: Mutex<()>,
    state: RwLock<FlashNodeState>,
}

impl FlashNode {
    /// Creates an unassigned, enabled node that reported just now.
    pub fn new(
        id: u64,
        addr: impl Into<String>,
        zone_name: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            id,
            addr: addr.into(),
            zone_name: zone_name.into(),
            version: version.into(),
            mutation: Mutex::new(()),
            state: RwLock::new(FlashNodeState {
                flash_group_id: UNUSED_FLASH_GROUP_ID,
                report_time: Utc::now(),
                is_active: true,
                is_enable: true,
            }),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub fn zone_name(&self) -> &str {
        &self.zone_name
    }

    pub fn flash_group_id(&self) -> Result<u64> {
        Ok(self.state.read()?.flash_group_id)
    }

    pub fn is_active(&self) -> Result<bool> {
        Ok(self.state.read()?.is_active)
    }

    pub fn is_active_and_enable(&self) -> Result<bool> {
        let state = self.state.read()?;
        Ok(state.is_active && state.is_enable)
    }

    /// True when the node may be handed to a group by zone selection.
    pub fn is_writable(&self) -> Result<bool> {
        let state = self.state.read()?;
        Ok(state.is_active && state.is_enable && state.flash_group_id == UNUSED_FLASH_GROUP_ID)
    }

    /// Records a heartbeat received at `at`.
    pub fn report_heartbeat(&self, at: DateTime<Utc>) -> Result<()> {
        let mut state = self.state.write()?;
        state.report_time = at;
        state.is_active = true;
        Ok(())
    }

    pub fn set_enable(&self, enable: bool) -> Result<()> {
        self.state.write()?.is_enable = enable;
        Ok(())
    }

    /// Acquires the node's mutation lock.
    pub async fn lock(&self) -> FlashNodeGuard<'_> {
        FlashNodeGuard {
            node: self,
            _mutation: self.mutation.lock().await,
        }
    }

    /// Poisons the state lock, as a panicking writer would.
    #[cfg(test)]
    pub(crate) fn poison_state(&self) {
        let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _state = self.state.write().unwrap();
            panic!("flash node state writer panicked");
        }));
    }

    pub fn view_info(&self) -> Result<FlashNodeViewInfo> {
        let state = self.state.read()?;
        Ok(FlashNodeViewInfo {
            id: self.id,
            addr: self.addr.clone(),
            zone_name: self.zone_name.clone(),
            version: self.version.clone(),
            report_time: state.report_time,
            is_active: state.is_active,
            is_enable: state.is_enable,
            flash_group_id: state.flash_group_id,
        })
    }

    pub fn value(&self) -> Result<FlashNodeValue> {
        let state = self.state.read()?;
        Ok(FlashNodeValue {
            id: self.id,
            addr: self.addr.clone(),
            zone_name: self.zone_name.clone(),
            version: self.version.clone(),
            flash_group_id: state.flash_group_id,
            is_enable: state.is_enable,
        })
    }
}

/// Holds a flash node's mutation lock. The assignment field can only be
/// written through this guard.
pub struct FlashNodeGuard<'a> {
    node: &'a FlashNode,
    _mutation: MutexGuard<'a, ()>,
}

impl FlashNodeGuard<'_> {
    pub fn node(&self) -> &FlashNode {
        self.node
    }

    pub fn flash_group_id(&self) -> Result<u64> {
        self.node.flash_group_id()
    }

    pub fn set_flash_group_id(&mut self, flash_group_id: u64) -> Result<()> {
        self.node.state.write()?.flash_group_id = flash_group_id;
        Ok(())
    }

    /// Fails with `StaleNode` when the last report is older than `timeout`,
    /// marking the node inactive as a side effect.
    pub fn ensure_live(&mut self, timeout: Duration) -> Result<()> {
        let mut state = self.node.state.write()?;
        let elapsed = Utc::now().signed_duration_since(state.report_time);
        // Negative elapsed means a report from the future; treat it as live.
        let stale = elapsed.to_std().map(|e| e > timeout).unwrap_or(false);
        if stale {
            state.is_active = false;
            return Err(TopologyError::StaleNode {
                addr: self.node.addr.clone(),
                last_report: state.report_time,
            });
        }
        Ok(())
    }

    pub fn value(&self) -> Result<FlashNodeValue> {
        self.node.value()
    }
}
