pub mod error;
pub mod types;

pub use error::{Result, TopologyError};
pub use types::{
    ClientFlashGroupView, DEFAULT_FLASH_GROUP_SLOTS_COUNT, FLASH_GROUP_PREFIX, FLASH_NODE_PREFIX,
    FlashGroupAdminView, FlashGroupRemoval, FlashGroupStatus, FlashGroupValue,
    FlashGroupsClientView, FlashNodeViewInfo, UNUSED_FLASH_GROUP_ID,
};
