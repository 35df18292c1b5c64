use std::{path::PathBuf, sync::Arc};

use serde::Deserialize;

use crate::{backends::MemoryStore, r#trait::CampaignStore};

/// Configuration for the campaign store
///
/// # Examples
///
/// Purely in-memory (everything is lost on restart):
/// ```ron
/// Outreach (
///     store: Memory,
/// )
/// ```
///
/// In-memory with an on-disk snapshot:
/// ```ron
/// Outreach (
///     store: Snapshot(
///         path: "/var/lib/outreach/store.bin",
///     ),
/// )
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub enum StoreConfig {
    #[default]
    Memory,
    Snapshot {
        path: PathBuf,
    },
}

impl StoreConfig {
    /// Build the configured store
    ///
    /// # Errors
    ///
    /// Returns an error if an existing snapshot cannot be loaded
    pub fn build(&self) -> crate::Result<Arc<dyn CampaignStore>> {
        match self {
            Self::Memory => Ok(Arc::new(MemoryStore::new())),
            Self::Snapshot { path } => Ok(Arc::new(MemoryStore::open(path)?)),
        }
    }
}
