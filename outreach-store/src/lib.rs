pub mod backends;
pub mod config;
pub mod error;
pub mod r#trait;

pub use backends::{MemoryStore, TestStore};
pub use config::StoreConfig;
pub use error::{Result, StoreError};
pub use r#trait::{CampaignStore, JobFilter};
