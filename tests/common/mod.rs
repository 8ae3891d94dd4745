#![allow(dead_code)]

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use sqlx::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;
use std::sync::Arc;
use std::time::Duration;
use yt_key_pool::config::PoolConfig;
use yt_key_pool::dao::api_key::{ApiKey, ApiKeyCipher, create_api_key};
use yt_key_pool::dao::{INIT_SQL, init_db};
use yt_key_pool::youtube_api::ApiKeyManager;

pub const TEST_SECRET: &str = "integration-test-master-secret";

/// 创建内存中的测试数据库（单连接，保证所有查询落在同一个库上）
pub async fn setup_test_db() -> Arc<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to create in-memory database");

    init_db(&pool, INIT_SQL).await.expect("Failed to create table");
    Arc::new(pool)
}

/// 测试用配置：选择重试间隔调短
pub fn test_config() -> PoolConfig {
    PoolConfig::new().with_selection_retry_delay(Duration::from_millis(10))
}

pub fn test_cipher() -> ApiKeyCipher {
    ApiKeyCipher::new(TEST_SECRET)
}

pub async fn setup_manager(config: PoolConfig) -> (ApiKeyManager, Arc<SqlitePool>) {
    let pool = setup_test_db().await;
    let manager = ApiKeyManager::new(pool.clone(), test_cipher(), config)
        .expect("Failed to build manager");
    (manager, pool)
}

/// 直接写入一条指定计数的记录，返回 id
pub async fn seed_key(
    pool: &SqlitePool,
    encrypted_key: &str,
    is_active: bool,
    usage_count: i64,
    used_quota: i64,
    last_used: DateTime<Utc>,
) -> String {
    let mut record = ApiKey::new(encrypted_key.to_string(), Some("owner-1".to_string()), None);
    record.is_active = is_active;
    record.usage_count = usage_count;
    record.used_quota = used_quota;
    record.last_used = last_used;
    create_api_key(pool, &record).await.expect("Failed to seed key");
    record.id
}

/// 固定基准时间往后偏移若干秒
pub fn at(offset_secs: i64) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z")
        .expect("valid timestamp")
        .with_timezone(&Utc)
        + ChronoDuration::seconds(offset_secs)
}
