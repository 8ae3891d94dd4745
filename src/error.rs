//! # 错误类型
//!
//! 池内部只在两种情况下自行恢复：下游配额耗尽（换 key 重试）和存储层瞬时争用
//! （固定间隔重试选择）。其余错误原样向上传递。

use std::fmt;
use thiserror::Error;

use crate::dao::api_key::crypto::CryptoError;

/// SQLite 中表示锁争用的结果码（含扩展码）
const SQLITE_CONTENTION_CODES: &[&str] = &[
    "5",   // SQLITE_BUSY
    "6",   // SQLITE_LOCKED
    "261", // SQLITE_BUSY_RECOVERY
    "262", // SQLITE_LOCKED_SHAREDCACHE
    "517", // SQLITE_BUSY_SNAPSHOT
];

/// Key 池自身产生的错误
#[derive(Debug, Error)]
pub enum PoolError {
    /// 没有任何可用的 key（全部停用或配额已到阈值）
    #[error("no eligible API key available in the pool")]
    PoolExhausted,

    #[error("transient store contention: {0}")]
    TransientStoreContention(#[source] sqlx::Error),

    #[error("store error: {0}")]
    Store(#[source] sqlx::Error),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error("API key not found: {0}")]
    KeyNotFound(String),
}

impl PoolError {
    pub fn is_transient(&self) -> bool {
        matches!(self, PoolError::TransientStoreContention(_))
    }
}

impl From<sqlx::Error> for PoolError {
    fn from(err: sqlx::Error) -> Self {
        classify_store_error(err)
    }
}

/// 将存储层错误归类：锁争用 / 连接池超时视为瞬时错误，其余为普通存储错误
pub fn classify_store_error(err: sqlx::Error) -> PoolError {
    let transient = match &err {
        sqlx::Error::PoolTimedOut => true,
        sqlx::Error::Database(db_err) => db_err
            .code()
            .map(|code| SQLITE_CONTENTION_CODES.contains(&code.as_ref()))
            .unwrap_or(false),
        _ => false,
    };

    if transient {
        PoolError::TransientStoreContention(err)
    } else {
        PoolError::Store(err)
    }
}

/// 判断下游错误是否表示“当前 key 配额已耗尽”
///
/// 不同下游 API 的配额信号各不相同，由错误类型自行实现。
pub trait QuotaSignal {
    fn is_quota_exceeded(&self) -> bool;
}

impl QuotaSignal for anyhow::Error {
    fn is_quota_exceeded(&self) -> bool {
        self.chain().any(|cause| {
            cause
                .downcast_ref::<crate::youtube_api::client::YouTubeError>()
                .map(|e| e.is_quota_exceeded())
                .unwrap_or(false)
        })
    }
}

/// `call_with_pool` 的错误：要么来自池，要么是下游调用自身的错误（不做转换）
#[derive(Debug)]
pub enum CallError<E> {
    Pool(PoolError),
    Downstream(E),
}

impl<E: fmt::Display> fmt::Display for CallError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallError::Pool(e) => write!(f, "{}", e),
            CallError::Downstream(e) => write!(f, "{}", e),
        }
    }
}

impl<E: fmt::Debug + fmt::Display> std::error::Error for CallError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CallError::Pool(e) => Some(e),
            CallError::Downstream(_) => None,
        }
    }
}

impl<E> From<PoolError> for CallError<E> {
    fn from(err: PoolError) -> Self {
        CallError::Pool(err)
    }
}

impl<E: QuotaSignal> CallError<E> {
    /// 是否值得换一个 key 再试一次
    pub fn is_retryable(&self) -> bool {
        match self {
            CallError::Pool(e) => e.is_transient(),
            CallError::Downstream(e) => e.is_quota_exceeded(),
        }
    }
}

impl<E> CallError<E> {
    pub fn downstream(&self) -> Option<&E> {
        match self {
            CallError::Downstream(e) => Some(e),
            CallError::Pool(_) => None,
        }
    }

    pub fn into_downstream(self) -> Option<E> {
        match self {
            CallError::Downstream(e) => Some(e),
            CallError::Pool(_) => None,
        }
    }
}
