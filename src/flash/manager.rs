use super::group::FlashGroup;
use super::topology::FlashNodeTopology;
use crate::config::TopologyConfig;
use crate::consensus::{ConsensusSink, IdAllocator, RaftCommand, RaftOp};
use crate::core::{
    FlashGroupAdminView, FlashGroupRemoval, FlashGroupStatus, FlashNodeViewInfo, Result,
    TopologyError, UNUSED_FLASH_GROUP_ID,
};
use crate::node::{FlashNode, FlashNodeGuard, NodeRegistry};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{Instrument, Level, event, info_span};

/// Nodes addressed by a membership change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlashNodeTarget {
    /// A single node by address.
    Host(String),
    /// `count` nodes picked from a zone.
    Zone { zone_name: String, count: usize },
}

/// Coordinates flash group and flash node changes.
///
/// Every change is submitted to the consensus log before it becomes visible
/// in memory. A node's mutation lock is always released before the group's
/// lock is taken, and no two group locks are held at once.
pub struct FlashGroupManager {
    config: TopologyConfig,
    registration: Mutex<()>,
    topology: Arc<FlashNodeTopology>,
    sink: Arc<dyn ConsensusSink>,
    registry: Arc<dyn NodeRegistry>,
    id_alloc: Arc<dyn IdAllocator>,
}

impl FlashGroupManager {
    /// Starts a manager with an empty topology.
    pub fn new(
        config: TopologyConfig,
        sink: Arc<dyn ConsensusSink>,
        registry: Arc<dyn NodeRegistry>,
        id_alloc: Arc<dyn IdAllocator>,
    ) -> Result<Self> {
        let topology = Arc::new(FlashNodeTopology::new(&config)?);
        Ok(Self {
            config,
            registration: Mutex::new(()),
            topology,
            sink,
            registry,
            id_alloc,
        })
    }

    pub fn config(&self) -> &TopologyConfig {
        &self.config
    }

    pub fn topology(&self) -> &Arc<FlashNodeTopology> {
        &self.topology
    }

    /// Registers a flash node and places it in its zone.
    ///
    /// Registrations are serialized so an address is checked, persisted and
    /// registered as one step.
    pub async fn add_flash_node(
        &self,
        addr: &str,
        zone_name: &str,
        version: &str,
    ) -> Result<FlashNodeViewInfo> {
        if addr.trim().is_empty() || zone_name.trim().is_empty() {
            return Err(TopologyError::InvalidArgument(
                "flash node addr and zone name must not be empty".to_string(),
            ));
        }
        let _registration = self.registration.lock().await;
        if self.registry.lookup(addr).await.is_ok() {
            return Err(TopologyError::Conflict(format!(
                "flash node '{}' is already registered",
                addr
            )));
        }

        let id = self.id_alloc.allocate_id().await?;
        let node = Arc::new(FlashNode::new(id, addr, zone_name, version));
        let command = RaftCommand::flash_node(RaftOp::AddFlashNode, &node.value()?)?;
        self.sink
            .submit(command)
            .await
            .map_err(TopologyError::into_persistence)?;

        self.registry.register(node.clone()).await?;
        self.topology.put_flash_node(node.clone()).await;
        event!(Level::INFO, addr, zone_name, id, "flash node registered");
        node.view_info()
    }

    pub async fn create_flash_group(&self, slots: Vec<u32>) -> Result<FlashGroupAdminView> {
        let span = info_span!("flash.group.create", requested_slots = slots.len());
        async move {
            let created = match self.id_alloc.allocate_id().await {
                Ok(id) => {
                    self.topology
                        .create_flash_group(id, slots, self.sink.as_ref())
                        .await
                }
                Err(err) => Err(err),
            };
            let group = match created {
                Ok(group) => group,
                Err(err) => {
                    event!(Level::ERROR, error = %err, "flash group creation failed");
                    return Err(err);
                }
            };

            self.refresh_client_cache().await?;
            let view = group.admin_view().await?;
            event!(Level::INFO, id = view.id, slots = ?view.slots, "flash group created");
            Ok(view)
        }
        .instrument(span)
        .await
    }

    /// Evicts every member, then deletes the group.
    ///
    /// Eviction stops at the first failing node; nodes released before it stay
    /// released and the group stays registered.
    pub async fn remove_flash_group(&self, id: u64) -> Result<FlashGroupRemoval> {
        let span = info_span!("flash.group.remove", id);
        async move {
            let group = self.topology.get_flash_group(id).await?;
            let hosts = group.flash_node_hosts(false).await?;

            let target: &FlashGroup = &group;
            let evicted = self
                .run_batch(hosts, |host| async move {
                    self.remove_flash_node_from_flash_group(&host, target).await
                })
                .await;
            let evicted = match evicted {
                Ok(evicted) => evicted,
                Err(err) => {
                    self.refresh_after_batch(&err).await;
                    return Err(err);
                }
            };
            event!(Level::INFO, succeeded = ?evicted, "flash group members evicted");

            let removed = self
                .topology
                .remove_flash_group(&group, self.sink.as_ref())
                .await;
            let refreshed = if removed.is_ok() || !evicted.is_empty() {
                self.refresh_client_cache().await
            } else {
                Ok(())
            };
            removed?;
            refreshed?;

            event!(Level::INFO, "flash group removed");
            Ok(FlashGroupRemoval {
                id,
                slots: group.slots().await,
                evicted_hosts: evicted,
            })
        }
        .instrument(span)
        .await
    }

    pub async fn set_flash_group_status(
        &self,
        id: u64,
        active: bool,
    ) -> Result<FlashGroupAdminView> {
        let group = self.topology.get_flash_group(id).await?;
        let status = FlashGroupStatus::from_active(active);
        let changed = group.update_status(status, self.sink.as_ref()).await?;
        if changed {
            event!(Level::INFO, id, status = ?status, "flash group status changed");
            self.refresh_client_cache().await?;
        }
        group.admin_view().await
    }

    pub async fn get_flash_group(&self, id: u64) -> Result<FlashGroupAdminView> {
        self.topology.get_flash_group(id).await?.admin_view().await
    }

    /// Lists groups with the given activity, or all of them for `None`.
    pub async fn list_flash_groups(
        &self,
        active: Option<bool>,
    ) -> Result<Vec<FlashGroupAdminView>> {
        let status = FlashGroupStatus::from_active(active.unwrap_or(false));
        self.topology
            .get_flash_groups_admin_view(status, active.is_none())
            .await
    }

    pub async fn add_flash_node_to_group(
        &self,
        id: u64,
        target: FlashNodeTarget,
    ) -> Result<FlashGroupAdminView> {
        let span = info_span!("flash.group.add_node", id, target = ?target);
        async move {
            let group = self.topology.get_flash_group(id).await?;
            match target {
                FlashNodeTarget::Host(addr) => {
                    self.add_flash_node_to_flash_group(&addr, &group).await?;
                    self.refresh_client_cache().await?;
                }
                FlashNodeTarget::Zone { zone_name, count } => {
                    let added = self
                        .select_flash_nodes_from_zone_add_to_flash_group(
                            &zone_name,
                            count,
                            &[],
                            &group,
                        )
                        .await;
                    self.finish_batch(added).await?;
                }
            }
            group.admin_view().await
        }
        .instrument(span)
        .await
    }

    pub async fn remove_flash_node_from_group(
        &self,
        id: u64,
        target: FlashNodeTarget,
    ) -> Result<FlashGroupAdminView> {
        let span = info_span!("flash.group.remove_node", id, target = ?target);
        async move {
            let group = self.topology.get_flash_group(id).await?;
            match target {
                FlashNodeTarget::Host(addr) => {
                    self.remove_flash_node_from_flash_group(&addr, &group).await?;
                    self.refresh_client_cache().await?;
                }
                FlashNodeTarget::Zone { zone_name, count } => {
                    let removed = self
                        .remove_flash_nodes_from_target_zone(&zone_name, count, &group)
                        .await;
                    self.finish_batch(removed).await?;
                }
            }
            group.admin_view().await
        }
        .instrument(span)
        .await
    }

    pub fn set_serving_enabled(&self, enabled: bool) {
        self.topology.set_serving_enabled(enabled);
        event!(Level::INFO, enabled, "flash group client serving toggled");
    }

    /// Serialized topology served to storage clients.
    pub fn client_flash_groups(&self) -> Arc<Vec<u8>> {
        self.topology.client_response()
    }

    /// Assigns a node, then exposes it in the group. A group deleted while
    /// the assignment was in flight refuses the node; the assignment is then
    /// released again and the group's `NotFound` returned.
    async fn add_flash_node_to_flash_group(&self, addr: &str, group: &FlashGroup) -> Result<()> {
        let node = self.set_flash_node_to_flash_group(addr, group.id()).await?;
        if let Err(err) = group.put_flash_node(node).await {
            event!(
                Level::WARN,
                addr,
                flash_group_id = group.id(),
                "flash group removed during assignment, releasing flash node"
            );
            self.set_flash_node_to_unused(addr, group.id()).await?;
            return Err(err);
        }
        Ok(())
    }

    /// Validates and durably assigns a node. Returns with the node lock
    /// released so the caller can take the group lock.
    async fn set_flash_node_to_flash_group(
        &self,
        addr: &str,
        flash_group_id: u64,
    ) -> Result<Arc<FlashNode>> {
        let node = self.registry.lookup(addr).await?;
        {
            let mut guard = node.lock().await;
            let current = guard.flash_group_id()?;
            if current != UNUSED_FLASH_GROUP_ID {
                return Err(TopologyError::Conflict(format!(
                    "flash node '{}' belongs to flash group {}, cannot join flash group {}",
                    addr, current, flash_group_id
                )));
            }
            if let Err(err) = guard.ensure_live(self.config.node_timeout) {
                event!(Level::WARN, addr, error = %err, "stale flash node marked inactive");
                return Err(err);
            }
            self.persist_assignment(&mut guard, flash_group_id).await?;
        }
        event!(Level::INFO, addr, flash_group_id, "flash node assigned");
        Ok(node)
    }

    async fn remove_flash_node_from_flash_group(
        &self,
        addr: &str,
        group: &FlashGroup,
    ) -> Result<()> {
        let node = self.set_flash_node_to_unused(addr, group.id()).await?;
        group.remove_flash_node(node.addr()).await;
        event!(Level::INFO, addr, flash_group_id = group.id(), "flash node released");
        Ok(())
    }

    async fn set_flash_node_to_unused(
        &self,
        addr: &str,
        flash_group_id: u64,
    ) -> Result<Arc<FlashNode>> {
        let node = self.registry.lookup(addr).await?;
        {
            let mut guard = node.lock().await;
            let current = guard.flash_group_id()?;
            if current != flash_group_id {
                return Err(TopologyError::Conflict(format!(
                    "flash node '{}' belongs to flash group {}, not flash group {}",
                    addr, current, flash_group_id
                )));
            }
            self.persist_assignment(&mut guard, UNUSED_FLASH_GROUP_ID)
                .await?;
        }
        Ok(node)
    }

    /// Sets the assignment field, then submits the node record. A rejected
    /// submission restores the previous value before returning.
    async fn persist_assignment(
        &self,
        guard: &mut FlashNodeGuard<'_>,
        flash_group_id: u64,
    ) -> Result<()> {
        let previous = guard.flash_group_id()?;
        guard.set_flash_group_id(flash_group_id)?;

        let persisted = match guard
            .value()
            .and_then(|value| RaftCommand::flash_node(RaftOp::UpdateFlashNode, &value))
        {
            Ok(command) => self.sink.submit(command).await,
            Err(err) => Err(err),
        };
        if let Err(err) = persisted {
            guard.set_flash_group_id(previous)?;
            event!(
                Level::WARN,
                addr = guard.node().addr(),
                attempted = flash_group_id,
                restored = previous,
                error = %err,
                "flash node assignment rolled back"
            );
            return Err(err.into_persistence());
        }
        Ok(())
    }

    async fn select_flash_nodes_from_zone_add_to_flash_group(
        &self,
        zone_name: &str,
        count: usize,
        exclude_hosts: &[String],
        group: &FlashGroup,
    ) -> Result<Vec<String>> {
        if count == 0 {
            return Err(TopologyError::InvalidArgument(
                "count must be >= 1".to_string(),
            ));
        }
        let zone = self.topology.get_zone(zone_name).await?;
        let hosts = zone.select_flash_nodes(count, exclude_hosts).await?;

        let added = self
            .run_batch(hosts, |host| async move {
                self.add_flash_node_to_flash_group(&host, group).await
            })
            .await?;
        event!(Level::INFO, zone_name, succeeded = ?added, "flash nodes added from zone");
        Ok(added)
    }

    async fn remove_flash_nodes_from_target_zone(
        &self,
        zone_name: &str,
        count: usize,
        group: &FlashGroup,
    ) -> Result<Vec<String>> {
        if count == 0 {
            return Err(TopologyError::InvalidArgument(
                "count must be >= 1".to_string(),
            ));
        }
        let hosts = group.flash_node_hosts_in_zone(zone_name).await;
        if hosts.len() < count {
            return Err(TopologyError::InsufficientCapacity {
                found: hosts.len(),
                requested: count,
            });
        }

        let removed = self
            .run_batch(hosts.into_iter().take(count).collect(), |host| async move {
                self.remove_flash_node_from_flash_group(&host, group).await
            })
            .await?;
        event!(Level::INFO, zone_name, succeeded = ?removed, "flash nodes removed from zone");
        Ok(removed)
    }

    /// Applies `step` to each host in order, stopping at the first failure.
    /// Earlier successes are not undone.
    async fn run_batch<F, Fut>(&self, hosts: Vec<String>, mut step: F) -> Result<Vec<String>>
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let mut succeeded = Vec::with_capacity(hosts.len());
        for host in hosts {
            if let Err(err) = step(host.clone()).await {
                event!(
                    Level::WARN,
                    failed_host = %host,
                    succeeded = ?succeeded,
                    error = %err,
                    "flash node batch stopped"
                );
                return Err(TopologyError::BatchFailed {
                    succeeded,
                    failed_host: host,
                    source: Box::new(err),
                });
            }
            succeeded.push(host);
        }
        Ok(succeeded)
    }

    async fn finish_batch(&self, outcome: Result<Vec<String>>) -> Result<Vec<String>> {
        match outcome {
            Ok(hosts) => {
                self.refresh_client_cache().await?;
                Ok(hosts)
            }
            Err(err) => {
                self.refresh_after_batch(&err).await;
                Err(err)
            }
        }
    }

    /// Committed batch progress is already visible truth; republish it.
    /// The batch error is what gets returned, so a rebuild failure here is
    /// only logged.
    async fn refresh_after_batch(&self, err: &TopologyError) {
        if !err.succeeded_hosts().is_empty() {
            let _ = self.refresh_client_cache().await;
        }
    }

    /// Rebuilds the client snapshot after a committed change. On failure the
    /// previous snapshot stays published and the error reaches the caller.
    async fn refresh_client_cache(&self) -> Result<()> {
        let rebuilt = self.topology.update_client_cache().await;
        if let Err(err) = &rebuilt {
            event!(Level::ERROR, error = %err, "flash group client cache rebuild failed");
        }
        rebuilt
    }
}
