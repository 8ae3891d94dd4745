use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{QueryBuilder, Sqlite, SqlitePool, Result};

pub const DEFAULT_KEY_NAME: &str = "Unnamed API Key";

/// 一条 YouTube Data API Key 记录，`encrypted_key` 始终是密文
#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct ApiKey {
    pub id: String,
    #[serde(skip_serializing)]
    pub encrypted_key: String,
    pub name: String,
    pub owner_id: Option<String>,
    pub is_active: bool,
    pub usage_count: i64,
    pub used_quota: i64,
    pub last_used: DateTime<Utc>,
    pub last_reset: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl ApiKey {
    /// 构造一条新记录：启用状态、计数清零、时间戳取当前时间
    pub fn new(encrypted_key: String, owner_id: Option<String>, name: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            encrypted_key,
            name: name.unwrap_or_else(|| DEFAULT_KEY_NAME.to_string()),
            owner_id,
            is_active: true,
            usage_count: 0,
            used_quota: 0,
            last_used: now,
            last_reset: now,
            created_at: now,
        }
    }

    pub fn is_eligible(&self, quota_threshold: i64) -> bool {
        self.is_active && self.used_quota < quota_threshold
    }
}

/// Create a new api key entry (async)
pub async fn create_api_key(pool: &SqlitePool, api_key: &ApiKey) -> Result<u64> {
    let res = sqlx::query(r#"
        INSERT INTO youtube_api_keys (
            id, encrypted_key, name, owner_id, is_active, usage_count,
            used_quota, last_used, last_reset, created_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
    "#)
        .bind(&api_key.id)
        .bind(&api_key.encrypted_key)
        .bind(&api_key.name)
        .bind(&api_key.owner_id)
        .bind(api_key.is_active)
        .bind(api_key.usage_count)
        .bind(api_key.used_quota)
        .bind(api_key.last_used)
        .bind(api_key.last_reset)
        .bind(api_key.created_at)
        .execute(pool)
        .await?;
    Ok(res.rows_affected())
}

/// Read an api key entry by id (async)
pub async fn get_api_key_by_id(pool: &SqlitePool, id: &str) -> Result<Option<ApiKey>> {
    let api_key = sqlx::query_as::<_, ApiKey>("SELECT * FROM youtube_api_keys WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(api_key)
}

/// List all api key entries (async)
pub async fn list_api_keys(pool: &SqlitePool) -> Result<Vec<ApiKey>> {
    let api_keys = sqlx::query_as::<_, ApiKey>("SELECT * FROM youtube_api_keys ORDER BY created_at, id")
        .fetch_all(pool)
        .await?;
    Ok(api_keys)
}

/// 可选的候选 key：启用且已用配额低于阈值，
/// 按 usage_count、used_quota、last_used 升序排列，取前 `limit` 条
pub async fn list_selection_candidates(
    pool: &SqlitePool,
    quota_threshold: i64,
    limit: i64,
) -> Result<Vec<ApiKey>> {
    let api_keys = sqlx::query_as::<_, ApiKey>(r#"
        SELECT * FROM youtube_api_keys
        WHERE is_active = 1 AND used_quota < ?
        ORDER BY usage_count ASC, used_quota ASC, last_used ASC
        LIMIT ?
    "#)
        .bind(quota_threshold)
        .bind(limit)
        .fetch_all(pool)
        .await?;
    Ok(api_keys)
}

/// 停用时间最久的 key（last_used 升序）
pub async fn list_stalest_inactive_keys(pool: &SqlitePool, limit: i64) -> Result<Vec<ApiKey>> {
    let api_keys = sqlx::query_as::<_, ApiKey>(r#"
        SELECT * FROM youtube_api_keys
        WHERE is_active = 0
        ORDER BY last_used ASC
        LIMIT ?
    "#)
        .bind(limit)
        .fetch_all(pool)
        .await?;
    Ok(api_keys)
}

/// 消耗配额最多的启用 key（used_quota 降序）
pub async fn list_most_used_active_keys(pool: &SqlitePool, limit: i64) -> Result<Vec<ApiKey>> {
    let api_keys = sqlx::query_as::<_, ApiKey>(r#"
        SELECT * FROM youtube_api_keys
        WHERE is_active = 1
        ORDER BY used_quota DESC
        LIMIT ?
    "#)
        .bind(limit)
        .fetch_all(pool)
        .await?;
    Ok(api_keys)
}

/// 记录一次被选中：usage_count 原子自增并刷新 last_used (async)
pub async fn record_api_key_selection(pool: &SqlitePool, id: &str, now: DateTime<Utc>) -> Result<u64> {
    let res = sqlx::query(r#"
        UPDATE youtube_api_keys SET
            usage_count = usage_count + 1,
            last_used = ?
        WHERE id = ?
    "#)
        .bind(now)
        .bind(id)
        .execute(pool)
        .await?;
    Ok(res.rows_affected())
}

/// 原子累加已用配额 (async)
pub async fn increment_used_quota(pool: &SqlitePool, id: &str, cost: i64) -> Result<u64> {
    let res = sqlx::query("UPDATE youtube_api_keys SET used_quota = used_quota + ? WHERE id = ?")
        .bind(cost)
        .bind(id)
        .execute(pool)
        .await?;
    Ok(res.rows_affected())
}

/// 所有 key 的配额和使用次数清零，不区分启用状态 (async)
pub async fn reset_all_quotas(pool: &SqlitePool, now: DateTime<Utc>) -> Result<u64> {
    let res = sqlx::query(r#"
        UPDATE youtube_api_keys SET
            used_quota = 0,
            usage_count = 0,
            last_reset = ?
    "#)
        .bind(now)
        .execute(pool)
        .await?;
    Ok(res.rows_affected())
}

/// 批量启用并清零计数；只作用于当前仍处于停用状态的记录 (async)
pub async fn activate_api_keys(pool: &SqlitePool, ids: &[String]) -> Result<u64> {
    if ids.is_empty() {
        return Ok(0);
    }
    let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
        "UPDATE youtube_api_keys SET is_active = 1, used_quota = 0, usage_count = 0 WHERE is_active = 0 AND id IN (",
    );
    push_id_list(&mut builder, ids);
    let res = builder.build().execute(pool).await?;
    Ok(res.rows_affected())
}

/// 批量停用，配额与计数保持不变 (async)
pub async fn deactivate_api_keys(pool: &SqlitePool, ids: &[String]) -> Result<u64> {
    if ids.is_empty() {
        return Ok(0);
    }
    let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
        "UPDATE youtube_api_keys SET is_active = 0 WHERE is_active = 1 AND id IN (",
    );
    push_id_list(&mut builder, ids);
    let res = builder.build().execute(pool).await?;
    Ok(res.rows_affected())
}

fn push_id_list<'a>(builder: &mut QueryBuilder<'a, Sqlite>, ids: &'a [String]) {
    let mut separated = builder.separated(", ");
    for id in ids {
        separated.push_bind(id.as_str());
    }
    separated.push_unseparated(")");
}

/// Toggle active status of an api key entry (async)
pub async fn set_api_key_active(pool: &SqlitePool, id: &str, is_active: bool) -> Result<u64> {
    let res = sqlx::query("UPDATE youtube_api_keys SET is_active = ? WHERE id = ?")
        .bind(is_active)
        .bind(id)
        .execute(pool)
        .await?;
    Ok(res.rows_affected())
}

/// 池的汇总数据
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, sqlx::FromRow, Serialize)]
pub struct PoolStats {
    pub total: i64,
    pub active: i64,
    pub eligible: i64,
    pub total_used_quota: i64,
}

pub async fn get_pool_stats(pool: &SqlitePool, quota_threshold: i64) -> Result<PoolStats> {
    let stats = sqlx::query_as::<_, PoolStats>(r#"
        SELECT
            COUNT(*) AS total,
            COALESCE(SUM(CASE WHEN is_active = 1 THEN 1 ELSE 0 END), 0) AS active,
            COALESCE(SUM(CASE WHEN is_active = 1 AND used_quota < ? THEN 1 ELSE 0 END), 0) AS eligible,
            COALESCE(SUM(used_quota), 0) AS total_used_quota
        FROM youtube_api_keys
    "#)
        .bind(quota_threshold)
        .fetch_one(pool)
        .await?;
    Ok(stats)
}
