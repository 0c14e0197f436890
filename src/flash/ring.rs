use crate::core::{ClientFlashGroupView, FlashGroupsClientView, Result};
use std::collections::BTreeMap;

/// Client-side view of the slot ring built from a published snapshot.
///
/// A key belongs to the group owning the smallest slot >= crc32(key),
/// wrapping to the smallest slot on the ring.
#[derive(Debug, Clone, Default)]
pub struct FlashGroupRing {
    slots: BTreeMap<u32, usize>,
    groups: Vec<ClientFlashGroupView>,
}

impl FlashGroupRing {
    pub fn new(view: FlashGroupsClientView) -> Self {
        let mut slots = BTreeMap::new();
        for (idx, group) in view.flash_groups.iter().enumerate() {
            for slot in &group.slots {
                slots.insert(*slot, idx);
            }
        }
        Self {
            slots,
            groups: view.flash_groups,
        }
    }

    /// Parses the serialized client snapshot.
    pub fn from_snapshot(bytes: &[u8]) -> Result<Self> {
        let view: FlashGroupsClientView = serde_json::from_slice(bytes)?;
        Ok(Self::new(view))
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Group responsible for the ring position `hash`.
    pub fn group_for_hash(&self, hash: u32) -> Option<&ClientFlashGroupView> {
        let (_, idx) = self
            .slots
            .range(hash..)
            .next()
            .or_else(|| self.slots.iter().next())?;
        self.groups.get(*idx)
    }

    pub fn group_for_key(&self, key: &[u8]) -> Option<&ClientFlashGroupView> {
        self.group_for_hash(crc32fast::hash(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ring() -> FlashGroupRing {
        FlashGroupRing::new(FlashGroupsClientView {
            flash_groups: vec![
                ClientFlashGroupView {
                    id: 1,
                    slots: vec![100, 5000],
                    hosts: vec!["a:1".to_string()],
                },
                ClientFlashGroupView {
                    id: 2,
                    slots: vec![2000],
                    hosts: vec!["b:1".to_string()],
                },
            ],
        })
    }

    #[test]
    fn test_hash_resolves_to_next_slot() {
        let ring = ring();
        assert_eq!(ring.group_for_hash(0).unwrap().id, 1);
        assert_eq!(ring.group_for_hash(100).unwrap().id, 1);
        assert_eq!(ring.group_for_hash(101).unwrap().id, 2);
        assert_eq!(ring.group_for_hash(2001).unwrap().id, 1);
    }

    #[test]
    fn test_hash_wraps_past_last_slot() {
        let ring = ring();
        assert_eq!(ring.group_for_hash(5001).unwrap().id, 1);
        assert_eq!(ring.group_for_hash(u32::MAX).unwrap().id, 1);
    }

    #[test]
    fn test_empty_ring_routes_nothing() {
        let ring = FlashGroupRing::from_snapshot(br#"{"flash_groups":[]}"#).unwrap();
        assert!(ring.is_empty());
        assert!(ring.group_for_key(b"inode-1").is_none());
    }

    #[test]
    fn test_key_routing_is_stable() {
        let ring = ring();
        let first = ring.group_for_key(b"inode-42/extent-7").map(|g| g.id);
        let second = ring.group_for_key(b"inode-42/extent-7").map(|g| g.id);
        assert!(first.is_some());
        assert_eq!(first, second);
    }
}
