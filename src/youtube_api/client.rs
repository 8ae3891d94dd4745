//! # YouTube Data API 客户端
//!
//! 绑定单个 API Key 的轻量客户端。由 key 池在每次尝试时构造，
//! 调用方不直接接触 key 的选择与轮换。

use reqwest::{Client as HttpClient, Method, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::error::QuotaSignal;

pub const DEFAULT_BASE_URL: &str = "https://www.googleapis.com/youtube/v3";

/// 表示“该 key 今日配额已用尽”的错误原因
const QUOTA_EXHAUSTED_REASONS: &[&str] = &["quotaExceeded", "dailyLimitExceeded"];

#[derive(Debug, Error)]
pub enum YouTubeError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("YouTube API error {status} ({}): {message}", reason.as_deref().unwrap_or("unknown"))]
    Api {
        status: u16,
        reason: Option<String>,
        message: String,
    },

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl YouTubeError {
    pub fn api(status: u16, reason: Option<&str>, message: impl Into<String>) -> Self {
        YouTubeError::Api {
            status,
            reason: reason.map(str::to_string),
            message: message.into(),
        }
    }

    pub fn quota_exceeded() -> Self {
        Self::api(403, Some("quotaExceeded"), "The request cannot be completed because you have exceeded your quota.")
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            YouTubeError::Api { status, .. } => Some(*status),
            YouTubeError::Http(e) => e.status().map(|s| s.as_u16()),
            YouTubeError::InvalidResponse(_) => None,
        }
    }
}

impl QuotaSignal for YouTubeError {
    fn is_quota_exceeded(&self) -> bool {
        match self {
            YouTubeError::Api { status, reason: Some(reason), .. } => {
                *status == StatusCode::FORBIDDEN.as_u16()
                    && QUOTA_EXHAUSTED_REASONS.contains(&reason.as_str())
            }
            _ => false,
        }
    }
}

/// Google API 的标准错误包
#[derive(Debug, Deserialize)]
struct GoogleErrorEnvelope {
    error: GoogleErrorBody,
}

#[derive(Debug, Deserialize)]
struct GoogleErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    errors: Vec<GoogleErrorItem>,
}

#[derive(Debug, Deserialize)]
struct GoogleErrorItem {
    #[serde(default)]
    reason: Option<String>,
}

fn parse_api_error(status: StatusCode, body: &str) -> YouTubeError {
    match serde_json::from_str::<GoogleErrorEnvelope>(body) {
        Ok(envelope) => YouTubeError::Api {
            status: status.as_u16(),
            reason: envelope.error.errors.into_iter().find_map(|item| item.reason),
            message: envelope.error.message,
        },
        Err(_) => YouTubeError::Api {
            status: status.as_u16(),
            reason: None,
            message: body.chars().take(512).collect(),
        },
    }
}

/// 构造共享的 HTTP 客户端，各个 key 绑定的客户端复用同一个连接池
pub fn build_http_client(request_timeout: Duration) -> Result<HttpClient, reqwest::Error> {
    HttpClient::builder()
        .timeout(request_timeout)
        .user_agent(concat!("yt_key_pool/", env!("CARGO_PKG_VERSION")))
        .build()
}

/// 日志中只展示 key 的前 4 位
pub fn mask_api_key(api_key: &str) -> String {
    let prefix: String = api_key.chars().take(4).collect();
    format!("{}***", prefix)
}

/// 绑定到单个 API Key 的客户端
#[derive(Clone)]
pub struct YouTubeClient {
    http: HttpClient,
    base_url: Arc<str>,
    api_key: String,
}

impl fmt::Debug for YouTubeClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("YouTubeClient")
            .field("base_url", &self.base_url)
            .field("api_key", &mask_api_key(&self.api_key))
            .finish()
    }
}

impl YouTubeClient {
    pub fn new(http: HttpClient, base_url: Arc<str>, api_key: impl Into<String>) -> Self {
        Self {
            http,
            base_url,
            api_key: api_key.into(),
        }
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// GET 类调用，例如 `list("videos", &[("part", "snippet"), ("id", "abc")])`
    pub async fn list(&self, resource: &str, params: &[(&str, &str)]) -> Result<Value, YouTubeError> {
        self.request(Method::GET, resource, params, None).await
    }

    /// 通用请求入口；API Key 以 `key` 查询参数携带
    pub async fn request(
        &self,
        method: Method,
        resource: &str,
        params: &[(&str, &str)],
        body: Option<&Value>,
    ) -> Result<Value, YouTubeError> {
        let url = format!("{}/{}", self.base_url.trim_end_matches('/'), resource.trim_start_matches('/'));

        let mut request = self
            .http
            .request(method.clone(), &url)
            .query(params)
            .query(&[("key", self.api_key.as_str())]);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();
        debug!(%method, resource, status = status.as_u16(), "YouTube API responded");

        let text = response.text().await?;
        if !status.is_success() {
            return Err(parse_api_error(status, &text));
        }

        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|e| YouTubeError::InvalidResponse(e.to_string()))
    }
}
