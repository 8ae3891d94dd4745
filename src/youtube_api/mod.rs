pub mod client;
pub mod key_manager;
pub mod quota_costs;
pub mod selector;

pub use client::{YouTubeClient, YouTubeError, DEFAULT_BASE_URL};
pub use key_manager::{ApiKeyManager, RotationReport, SelectedKey};
pub use quota_costs::{QuotaCostTable, DEFAULT_QUOTA_COST};
