//! YouTube Data API key 池：在多把 API Key 之间分摊每日配额，
//! 加密存储、随机选择、配额记账、轮换，并在配额耗尽时自动换 key 重试。

pub mod config;
pub mod dao;
pub mod error;
pub mod logger;
pub mod youtube_api;

pub use config::PoolConfig;
pub use error::{CallError, PoolError, QuotaSignal};
pub use youtube_api::{ApiKeyManager, YouTubeClient, YouTubeError};
