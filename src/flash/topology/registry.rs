impl FlashNodeTopology {
    /// Creates an Inactive group owning `requested_slots`, or a freshly
    /// allocated batch when none are requested.
    ///
    /// Slots are reserved before the add record is submitted and released
    /// again if the log rejects it. The group becomes visible in the registry
    /// only after the record is committed.
    pub async fn create_flash_group(
        &self,
        id: u64,
        requested_slots: Vec<u32>,
        sink: &dyn ConsensusSink,
    ) -> Result<Arc<FlashGroup>> {
        if id == UNUSED_FLASH_GROUP_ID {
            return Err(TopologyError::InvalidArgument(format!(
                "flash group id {} is reserved",
                id
            )));
        }
        if self.flash_groups.read().await.contains_key(&id) {
            return Err(TopologyError::Conflict(format!(
                "flash group {} already exists",
                id
            )));
        }

        let slots = self.reserve_slots(id, requested_slots)?;
        let group = Arc::new(FlashGroup::new(id, slots.clone(), FlashGroupStatus::Inactive));

        let value = group.value().await;
        let persisted = match RaftCommand::flash_group(RaftOp::AddFlashGroup, &value) {
            Ok(command) => sink.submit(command).await,
            Err(err) => Err(err),
        };
        if let Err(err) = persisted {
            self.release_slots(id, &slots)?;
            return Err(err.into_persistence());
        }

        self.flash_groups.write().await.insert(id, group.clone());
        Ok(group)
    }

    /// Deletes an empty group. Members must have been evicted beforehand.
    ///
    /// The emptiness check and the delete record happen under the group's
    /// write lock; once committed the group refuses new members even through
    /// handles taken before the removal.
    pub async fn remove_flash_group(
        &self,
        group: &FlashGroup,
        sink: &dyn ConsensusSink,
    ) -> Result<()> {
        let value = group.delete(sink).await?;

        self.flash_groups.write().await.remove(&value.id);
        self.release_slots(value.id, &value.slots)?;
        Ok(())
    }

    pub async fn get_flash_group(&self, id: u64) -> Result<Arc<FlashGroup>> {
        self.flash_groups
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| TopologyError::NotFound(format!("flash group {}", id)))
    }

    /// Snapshot of all registered groups, ordered by id.
    pub async fn flash_groups(&self) -> Vec<Arc<FlashGroup>> {
        let mut groups = self
            .flash_groups
            .read()
            .await
            .values()
            .cloned()
            .collect::<Vec<_>>();
        groups.sort_by_key(|group| group.id());
        groups
    }

    /// Admin views of all groups with `status`, or of every group when
    /// `all_status` is set.
    pub async fn get_flash_groups_admin_view(
        &self,
        status: FlashGroupStatus,
        all_status: bool,
    ) -> Result<Vec<FlashGroupAdminView>> {
        let mut views = Vec::new();
        for group in self.flash_groups().await {
            if all_status || group.status().await == status {
                views.push(group.admin_view().await?);
            }
        }
        Ok(views)
    }

    pub async fn get_zone(&self, name: &str) -> Result<Arc<FlashNodeZone>> {
        self.zones
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| TopologyError::NotFound(format!("flash node zone '{}'", name)))
    }

    /// Places a node in its zone, creating the zone on first use.
    pub async fn put_flash_node(&self, node: Arc<FlashNode>) {
        let zone = {
            let mut zones = self.zones.write().await;
            zones
                .entry(node.zone_name().to_string())
                .or_insert_with(|| Arc::new(FlashNodeZone::new(node.zone_name())))
                .clone()
        };
        zone.put_flash_node(node).await;
    }
}
