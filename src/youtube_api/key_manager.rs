//! # YouTube API Key 池管理
//!
//! 负责 key 的选择、配额记账、每日重置、轮换，以及带故障转移的下游调用封装。
//! 所有计数修改都是单条 SQL 语句内完成的原子自增，不在应用层读改写。

use chrono::Utc;
use sqlx::SqlitePool;
use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::config::PoolConfig;
use crate::dao::api_key::{
    ApiKey, ApiKeyCipher, PoolStats, activate_api_keys, create_api_key, deactivate_api_keys,
    get_pool_stats, increment_used_quota, list_api_keys, list_most_used_active_keys,
    list_selection_candidates, list_stalest_inactive_keys, record_api_key_selection,
    reset_all_quotas, set_api_key_active,
};
use crate::error::{CallError, PoolError, QuotaSignal};
use crate::youtube_api::client::{YouTubeClient, build_http_client, mask_api_key};
use crate::youtube_api::selector::pick_candidate;

/// 选中的 key：明文只在一次调用期间存在于内存中
#[derive(Clone)]
pub struct SelectedKey {
    pub id: String,
    pub api_key: String,
}

impl fmt::Debug for SelectedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SelectedKey")
            .field("id", &self.id)
            .field("api_key", &mask_api_key(&self.api_key))
            .finish()
    }
}

/// 一次轮换实际启用 / 停用的 key
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RotationReport {
    pub activated: Vec<String>,
    pub deactivated: Vec<String>,
}

#[derive(Clone)]
pub struct ApiKeyManager {
    pool: Arc<SqlitePool>,
    cipher: ApiKeyCipher,
    config: Arc<PoolConfig>,
    http: reqwest::Client,
    base_url: Arc<str>,
}

impl fmt::Debug for ApiKeyManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiKeyManager")
            .field("config", &self.config)
            .field("cipher", &self.cipher)
            .finish()
    }
}

impl ApiKeyManager {
    pub fn new(pool: Arc<SqlitePool>, cipher: ApiKeyCipher, config: PoolConfig) -> anyhow::Result<Self> {
        config.validate()?;
        let http = build_http_client(config.request_timeout)?;
        let base_url: Arc<str> = Arc::from(config.youtube_base_url.as_str());
        Ok(Self {
            pool,
            cipher,
            config: Arc::new(config),
            http,
            base_url,
        })
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    pub fn cipher(&self) -> &ApiKeyCipher {
        &self.cipher
    }

    /// 选取一个可用 key 并返回明文
    pub async fn select_credential(&self) -> Result<SelectedKey, PoolError> {
        self.select_credential_excluding(&HashSet::new()).await
    }

    /// 同 `select_credential`，但尽量避开 `exclude` 中的 key
    ///
    /// 存储层瞬时争用时按固定间隔重试整个选择过程，超过次数后返回底层错误。
    pub async fn select_credential_excluding(&self, exclude: &HashSet<String>) -> Result<SelectedKey, PoolError> {
        let mut attempt: u32 = 1;
        loop {
            match self.try_select(exclude).await {
                Err(e) if e.is_transient() && attempt < self.config.selection_attempts => {
                    warn!(
                        attempt,
                        max_attempts = self.config.selection_attempts,
                        error = %e,
                        "Store contention while selecting API key, retrying"
                    );
                    sleep(self.config.selection_retry_delay).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    async fn try_select(&self, exclude: &HashSet<String>) -> Result<SelectedKey, PoolError> {
        let candidates = list_selection_candidates(
            &self.pool,
            self.config.quota_threshold,
            self.config.candidate_window,
        )
        .await?;

        let chosen = match pick_candidate(&candidates, exclude) {
            Some(chosen) => chosen,
            None => {
                error!("No eligible YouTube API keys left in the pool");
                return Err(PoolError::PoolExhausted);
            }
        };

        let updated = record_api_key_selection(&self.pool, &chosen.id, Utc::now()).await?;
        if updated == 0 {
            return Err(PoolError::KeyNotFound(chosen.id.clone()));
        }

        let api_key = self.cipher.decrypt(&chosen.encrypted_key).await?;

        debug!(
            key_id = %chosen.id,
            candidates = candidates.len(),
            usage_count = chosen.usage_count + 1,
            used_quota = chosen.used_quota,
            "Selected YouTube API key"
        );

        Ok(SelectedKey {
            id: chosen.id.clone(),
            api_key,
        })
    }

    /// 按 resource method 的配额消耗记账
    pub async fn charge_quota(&self, key_id: &str, resource_method: &str) -> Result<(), PoolError> {
        let cost = self.config.quota_costs.cost_of(resource_method);
        let updated = increment_used_quota(&self.pool, key_id, cost).await?;
        if updated == 0 {
            return Err(PoolError::KeyNotFound(key_id.to_string()));
        }
        debug!(key_id, resource_method, cost, "Charged quota");
        Ok(())
    }

    /// 所有 key 的配额与使用次数清零
    ///
    /// 由外部按天调度，这里只提供操作本身。
    pub async fn reset_daily_quotas(&self) -> Result<u64, PoolError> {
        let reset = reset_all_quotas(&self.pool, Utc::now()).await?;
        info!(keys_reset = reset, "Reset daily quotas for all API keys");
        Ok(reset)
    }

    /// 轮换：启用停用最久的一批 key，停用消耗最多的一批 key
    ///
    /// 两次查询都在任何修改之前完成，两个集合按 is_active 天然不相交。
    pub async fn rotate_api_keys(&self) -> Result<RotationReport, PoolError> {
        let batch = self.config.rotation_batch;
        let stale = list_stalest_inactive_keys(&self.pool, batch).await?;
        let exhausted = list_most_used_active_keys(&self.pool, batch).await?;

        let activated: Vec<String> = stale.into_iter().map(|key| key.id).collect();
        let deactivated: Vec<String> = exhausted.into_iter().map(|key| key.id).collect();

        activate_api_keys(&self.pool, &activated).await?;
        deactivate_api_keys(&self.pool, &deactivated).await?;

        info!(
            activated = activated.len(),
            deactivated = deactivated.len(),
            "Rotated YouTube API keys"
        );

        Ok(RotationReport { activated, deactivated })
    }

    /// 登记新 key：立即加密后入库，返回记录 id
    pub async fn add_credential(
        &self,
        owner_id: Option<String>,
        api_key: &str,
        name: Option<String>,
    ) -> Result<String, PoolError> {
        let encrypted_key = self.cipher.encrypt(api_key).await?;
        let record = ApiKey::new(encrypted_key, owner_id, name);
        create_api_key(&self.pool, &record).await?;
        info!(key_id = %record.id, name = %record.name, "Registered YouTube API key");
        Ok(record.id)
    }

    pub async fn set_active(&self, key_id: &str, is_active: bool) -> Result<(), PoolError> {
        let updated = set_api_key_active(&self.pool, key_id, is_active).await?;
        if updated == 0 {
            return Err(PoolError::KeyNotFound(key_id.to_string()));
        }
        info!(key_id, is_active, "Changed API key state");
        Ok(())
    }

    pub async fn list_credentials(&self) -> Result<Vec<ApiKey>, PoolError> {
        Ok(list_api_keys(&self.pool).await?)
    }

    pub async fn pool_stats(&self) -> Result<PoolStats, PoolError> {
        Ok(get_pool_stats(&self.pool, self.config.quota_threshold).await?)
    }

    fn client_for(&self, selected: &SelectedKey) -> YouTubeClient {
        YouTubeClient::new(self.http.clone(), self.base_url.clone(), selected.api_key.clone())
    }

    /// 通过 key 池执行一次下游调用
    ///
    /// 每次尝试都重新选 key。下游返回配额耗尽、或选 key 时遇到存储争用，
    /// 在 `max_retries` 次以内换 key 重试；其他错误原样返回。
    /// 只有成功的调用会记账。
    pub async fn call_with_pool<T, E, F, Fut>(
        &self,
        resource_method: &str,
        mut downstream_call: F,
    ) -> Result<T, CallError<E>>
    where
        F: FnMut(YouTubeClient) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: QuotaSignal + fmt::Display,
    {
        let max_retries = self.config.max_retries;
        let mut retry_count: u32 = 0;
        let mut exhausted_keys: HashSet<String> = HashSet::new();

        loop {
            let selected = match self.select_credential_excluding(&exhausted_keys).await {
                Ok(selected) => selected,
                Err(e) => {
                    let err = CallError::Pool(e);
                    if err.is_retryable() && retry_count < max_retries {
                        retry_count += 1;
                        warn!(retry_count, max_retries, error = %err, "Key selection failed, retrying");
                        continue;
                    }
                    return Err(err);
                }
            };

            let client = self.client_for(&selected);
            match downstream_call(client).await {
                Ok(value) => {
                    // 调用已成功，记账失败不能丢掉结果
                    if let Err(e) = self.charge_quota(&selected.id, resource_method).await {
                        error!(
                            key_id = %selected.id,
                            resource_method,
                            error = %e,
                            "Failed to charge quota after successful call"
                        );
                    }
                    return Ok(value);
                }
                Err(e) => {
                    if e.is_quota_exceeded() {
                        exhausted_keys.insert(selected.id.clone());
                    }
                    let err = CallError::Downstream(e);
                    if err.is_retryable() && retry_count < max_retries {
                        retry_count += 1;
                        warn!(
                            key_id = %selected.id,
                            resource_method,
                            retry_count,
                            max_retries,
                            "API key quota exceeded, retrying with another key"
                        );
                        continue;
                    }
                    error!(key_id = %selected.id, resource_method, error = %err, "YouTube API call failed");
                    return Err(err);
                }
            }
        }
    }
}
