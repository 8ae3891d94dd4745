//! # Key 池配置
//!
//! 默认值对应 YouTube Data API 每日 10000 单位的配额：
//! 选择阈值留出 1000 单位余量，吸收“检查”与“扣费”之间的并发窗口。

use anyhow::{Context, Result};
use std::time::Duration;

use crate::youtube_api::client::DEFAULT_BASE_URL;
use crate::youtube_api::quota_costs::QuotaCostTable;

pub const ENV_QUOTA_THRESHOLD: &str = "YT_POOL_QUOTA_THRESHOLD";
pub const ENV_DAILY_QUOTA_LIMIT: &str = "YT_POOL_DAILY_QUOTA_LIMIT";
pub const ENV_MAX_RETRIES: &str = "YT_POOL_MAX_RETRIES";
pub const ENV_SELECTION_RETRY_DELAY_MS: &str = "YT_POOL_SELECTION_RETRY_DELAY_MS";
pub const ENV_BASE_URL: &str = "YT_POOL_BASE_URL";

#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// 已用配额达到该值后不再选中该 key
    pub quota_threshold: i64,
    /// 下游每日配额上限，`quota_threshold` 不得超过它
    pub daily_quota_limit: i64,
    /// 随机选择的候选窗口大小（top-K）
    pub candidate_window: i64,
    /// 每次轮换最多启用/停用的 key 数
    pub rotation_batch: i64,
    /// `call_with_pool` 最多重试次数（总尝试次数 = max_retries + 1）
    pub max_retries: u32,
    /// 存储争用时选择 key 的总尝试次数
    pub selection_attempts: u32,
    /// 存储争用时两次选择之间的固定间隔
    pub selection_retry_delay: Duration,
    pub quota_costs: QuotaCostTable,
    pub youtube_base_url: String,
    pub request_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            quota_threshold: 9000,
            daily_quota_limit: 10000,
            candidate_window: 10,
            rotation_batch: 5,
            max_retries: 3,
            selection_attempts: 3,
            selection_retry_delay: Duration::from_millis(1000),
            quota_costs: QuotaCostTable::default(),
            youtube_base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl PoolConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quota_threshold(mut self, threshold: i64) -> Self {
        self.quota_threshold = threshold;
        self
    }

    /// 项目申请到更高的每日配额时调大
    pub fn with_daily_quota_limit(mut self, limit: i64) -> Self {
        self.daily_quota_limit = limit;
        self
    }

    pub fn with_candidate_window(mut self, window: i64) -> Self {
        self.candidate_window = window;
        self
    }

    pub fn with_rotation_batch(mut self, batch: i64) -> Self {
        self.rotation_batch = batch;
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn with_selection_retry_delay(mut self, delay: Duration) -> Self {
        self.selection_retry_delay = delay;
        self
    }

    pub fn with_quota_costs(mut self, costs: QuotaCostTable) -> Self {
        self.quota_costs = costs;
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.youtube_base_url = base_url.into();
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// 在默认值基础上读取环境变量覆盖
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(read_env)
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(value) = lookup(ENV_DAILY_QUOTA_LIMIT) {
            config.daily_quota_limit = value
                .parse()
                .with_context(|| format!("invalid {}: {}", ENV_DAILY_QUOTA_LIMIT, value))?;
        }
        if let Some(value) = lookup(ENV_QUOTA_THRESHOLD) {
            config.quota_threshold = value
                .parse()
                .with_context(|| format!("invalid {}: {}", ENV_QUOTA_THRESHOLD, value))?;
        }
        if let Some(value) = lookup(ENV_MAX_RETRIES) {
            config.max_retries = value
                .parse()
                .with_context(|| format!("invalid {}: {}", ENV_MAX_RETRIES, value))?;
        }
        if let Some(value) = lookup(ENV_SELECTION_RETRY_DELAY_MS) {
            let millis: u64 = value
                .parse()
                .with_context(|| format!("invalid {}: {}", ENV_SELECTION_RETRY_DELAY_MS, value))?;
            config.selection_retry_delay = Duration::from_millis(millis);
        }
        if let Some(value) = lookup(ENV_BASE_URL) {
            config.youtube_base_url = value;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.quota_threshold <= 0 {
            anyhow::bail!("quota_threshold must be positive");
        }
        if self.daily_quota_limit <= 0 {
            anyhow::bail!("daily_quota_limit must be positive");
        }
        if self.quota_threshold > self.daily_quota_limit {
            anyhow::bail!(
                "quota_threshold ({}) exceeds daily_quota_limit ({})",
                self.quota_threshold,
                self.daily_quota_limit
            );
        }
        if self.candidate_window <= 0 {
            anyhow::bail!("candidate_window must be positive");
        }
        if self.rotation_batch < 0 {
            anyhow::bail!("rotation_batch must not be negative");
        }
        if self.selection_attempts == 0 {
            anyhow::bail!("selection_attempts must be at least 1");
        }
        self.quota_costs.validate()?;
        Ok(())
    }
}

fn read_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = PoolConfig::default();
        assert_eq!(config.quota_threshold, 9000);
        assert_eq!(config.candidate_window, 10);
        assert_eq!(config.rotation_batch, 5);
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.selection_attempts, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_threshold_above_limit() {
        let config = PoolConfig::new().with_quota_threshold(20000);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_empty_window() {
        let config = PoolConfig::new().with_candidate_window(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_raised_daily_limit_allows_higher_threshold() {
        let config = PoolConfig::new()
            .with_daily_quota_limit(1_000_000)
            .with_quota_threshold(50_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_threshold_needs_matching_limit() {
        let err = PoolConfig::from_lookup(lookup_from(&[(ENV_QUOTA_THRESHOLD, "50000")])).unwrap_err();
        assert!(err.to_string().contains("daily_quota_limit"));

        let config = PoolConfig::from_lookup(lookup_from(&[
            (ENV_QUOTA_THRESHOLD, "50000"),
            (ENV_DAILY_QUOTA_LIMIT, "60000"),
        ]))
        .unwrap();
        assert_eq!(config.quota_threshold, 50_000);
        assert_eq!(config.daily_quota_limit, 60_000);
    }

    #[test]
    fn test_env_parse_errors() {
        assert!(PoolConfig::from_lookup(lookup_from(&[(ENV_MAX_RETRIES, "many")])).is_err());
        let config = PoolConfig::from_lookup(lookup_from(&[(ENV_SELECTION_RETRY_DELAY_MS, "250")])).unwrap();
        assert_eq!(config.selection_retry_delay, Duration::from_millis(250));
    }

    #[test]
    fn test_validate_rejects_negative_cost() {
        let config = PoolConfig::new()
            .with_quota_costs(QuotaCostTable::new().with_cost("videos.list", -500));
        assert!(config.validate().is_err());
    }
}
