impl FlashNodeTopology {
    /// Rebuilds the client snapshot from every Active group and swaps it in.
    ///
    /// Readers keep the previous snapshot until the swap. Rebuilds are
    /// serialized so the last one started is the last one published. Groups
    /// are visited one at a time, never holding two group locks.
    pub async fn update_client_cache(&self) -> Result<()> {
        let _rebuild = self.rebuild.lock().await;

        let mut view = FlashGroupsClientView::default();
        for group in self.flash_groups().await {
            if let Some(entry) = Self::client_entry(&group).await? {
                view.flash_groups.push(entry);
            }
        }
        let encoded = serde_json::to_vec(&view)?;
        self.client_cache.store(Arc::new(encoded));

        event!(
            Level::DEBUG,
            flash_groups = view.flash_groups.len(),
            "flash group client cache rebuilt"
        );
        Ok(())
    }

    async fn client_entry(group: &FlashGroup) -> Result<Option<ClientFlashGroupView>> {
        let value = group.value().await;
        if !value.status.is_active() {
            return Ok(None);
        }
        Ok(Some(ClientFlashGroupView {
            id: value.id,
            slots: value.slots,
            hosts: group.flash_node_hosts(true).await?,
        }))
    }

    /// Operational kill-switch for client topology queries.
    pub fn set_serving_enabled(&self, enabled: bool) {
        self.client_off.store(!enabled, Ordering::Release);
    }

    pub fn is_serving_enabled(&self) -> bool {
        !self.client_off.load(Ordering::Acquire)
    }

    /// Serialized topology for clients. Empty payload while serving is
    /// disabled, zero bytes before the first rebuild.
    pub fn client_response(&self) -> Arc<Vec<u8>> {
        if !self.is_serving_enabled() {
            return self.client_empty.clone();
        }
        self.client_cache.load_full()
    }
}
