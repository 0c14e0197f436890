//! Flash group topology: groups, zones, the slot ring and the membership
//! protocol that ties them to flash nodes.

pub mod group;
pub mod manager;
pub mod ring;
pub mod topology;
pub mod zone;

pub use group::FlashGroup;
pub use manager::{FlashGroupManager, FlashNodeTarget};
pub use ring::FlashGroupRing;
pub use topology::FlashNodeTopology;
pub use zone::FlashNodeZone;
