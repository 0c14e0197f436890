impl FlashNodeTopology {
    /// Returns the group owning `slot`, if any.
    pub fn slot_owner(&self, slot: u32) -> Result<Option<u64>> {
        Ok(self.slot_owners.lock()?.get(&slot).copied())
    }

    pub fn owned_slot_count(&self) -> Result<usize> {
        Ok(self.slot_owners.lock()?.len())
    }

    /// Deduplicates and caps `requested`, then reserves the slots for
    /// `group_id`. An empty request draws a fresh random batch.
    fn reserve_slots(&self, group_id: u64, requested: Vec<u32>) -> Result<Vec<u32>> {
        let mut owners = self.slot_owners.lock()?;

        let slots = if requested.is_empty() {
            self.allocate_slots(&owners)?
        } else {
            let mut unique = BTreeSet::new();
            for slot in requested {
                if unique.len() >= self.slots_per_group {
                    break;
                }
                unique.insert(slot);
            }
            if let Some((slot, owner)) = unique
                .iter()
                .find_map(|slot| owners.get(slot).map(|owner| (*slot, *owner)))
            {
                return Err(TopologyError::Allocation(format!(
                    "slot {} is already owned by flash group {}",
                    slot, owner
                )));
            }
            unique
        };

        for slot in &slots {
            owners.insert(*slot, group_id);
        }
        Ok(slots.into_iter().collect())
    }

    /// Draws `slots_per_group` CRC32-domain positions that no group owns.
    fn allocate_slots(&self, owners: &BTreeMap<u32, u64>) -> Result<BTreeSet<u32>> {
        let mut slots = BTreeSet::new();
        for _ in 0..self.slot_allocation_attempts {
            if slots.len() >= self.slots_per_group {
                break;
            }
            let candidate = crc32fast::hash(Uuid::new_v4().as_bytes());
            if !owners.contains_key(&candidate) {
                slots.insert(candidate);
            }
        }
        if slots.len() < self.slots_per_group {
            event!(
                Level::WARN,
                drawn = slots.len(),
                wanted = self.slots_per_group,
                "flash group slot allocation exhausted its attempts"
            );
            return Err(TopologyError::Allocation(format!(
                "only {} of {} collision-free slots found after {} attempts",
                slots.len(),
                self.slots_per_group,
                self.slot_allocation_attempts
            )));
        }
        Ok(slots)
    }

    fn release_slots(&self, group_id: u64, slots: &[u32]) -> Result<()> {
        let mut owners = self.slot_owners.lock()?;
        for slot in slots {
            if owners.get(slot) == Some(&group_id) {
                owners.remove(slot);
            }
        }
        Ok(())
    }
}
