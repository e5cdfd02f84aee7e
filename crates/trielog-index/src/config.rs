use serde::{Deserialize, Serialize};
use trielog_log::SyncMode;

/// Configuration for [`crate::FileIndex`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// When journal writes are fsynced.
    pub sync_mode: SyncMode,
}
