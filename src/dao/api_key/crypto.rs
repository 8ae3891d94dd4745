use aes_gcm::{
    aead::{AeadInPlace, KeyInit},
    Aes256Gcm, Key, Nonce, Tag,
};
use base64::{Engine as _, engine::general_purpose};
use moka::future::Cache;
use rand::{RngCore, rngs::OsRng};
use sha2::Sha256;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// 读取加密主密钥的环境变量名
pub const ENCRYPTION_KEY_ENV: &str = "ENCRYPTION_KEY";

pub const SALT_LENGTH: usize = 16;
pub const NONCE_LENGTH: usize = 12;
pub const TAG_LENGTH: usize = 16;
pub const KEY_LENGTH: usize = 32;
pub const PBKDF2_ITERATIONS: u32 = 100_000;

const HEADER_LENGTH: usize = SALT_LENGTH + NONCE_LENGTH + TAG_LENGTH;

/// 派生密钥缓存上限（按 salt 计，每条记录一个 salt）
const DERIVED_KEY_CACHE_CAPACITY: u64 = 10_000;

/// 派生密钥闲置超过该时长即从内存中淘汰
const DERIVED_KEY_IDLE_TIMEOUT: Duration = Duration::from_secs(10 * 60);

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CryptoError {
    #[error("encryption secret is not configured (set ENCRYPTION_KEY)")]
    ConfigurationMissing,

    #[error("encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("decryption failed: {0}")]
    DecryptionFailed(String),
}

/// API Key 的对称加密器
///
/// 主密钥来自外部配置，每次加密都会生成新的 salt 与 nonce，
/// 通过 PBKDF2-HMAC-SHA256 派生 AES-256-GCM 密钥。
/// 存储格式为 base64(salt ‖ nonce ‖ tag ‖ ciphertext)，解密无需额外参数。
#[derive(Clone)]
pub struct ApiKeyCipher {
    secret: Option<Arc<str>>,
    derived_keys: Cache<[u8; SALT_LENGTH], [u8; KEY_LENGTH]>,
}

impl fmt::Debug for ApiKeyCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiKeyCipher")
            .field("secret_configured", &self.secret.is_some())
            .field("cached_keys", &self.derived_keys.entry_count())
            .finish()
    }
}

impl ApiKeyCipher {
    /// 使用显式给出的主密钥；空字符串视为未配置
    pub fn new(secret: impl Into<String>) -> Self {
        let secret: String = secret.into();
        Self::from_optional(if secret.is_empty() { None } else { Some(secret) })
    }

    /// 从 `ENCRYPTION_KEY` 环境变量读取主密钥
    ///
    /// 变量缺失时不会立即报错，而是在第一次加密/解密时返回 `ConfigurationMissing`。
    pub fn from_env() -> Self {
        let secret = std::env::var(ENCRYPTION_KEY_ENV)
            .ok()
            .filter(|s| !s.is_empty());
        Self::from_optional(secret)
    }

    fn from_optional(secret: Option<String>) -> Self {
        Self::with_idle_timeout(secret, DERIVED_KEY_IDLE_TIMEOUT)
    }

    fn with_idle_timeout(secret: Option<String>, idle_timeout: Duration) -> Self {
        Self {
            secret: secret.map(Arc::from),
            derived_keys: Cache::builder()
                .max_capacity(DERIVED_KEY_CACHE_CAPACITY)
                .time_to_idle(idle_timeout)
                .build(),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.secret.is_some()
    }

    fn secret(&self) -> Result<Arc<str>, CryptoError> {
        self.secret.clone().ok_or(CryptoError::ConfigurationMissing)
    }

    /// 加密原始 API Key
    pub async fn encrypt(&self, plaintext: &str) -> Result<String, CryptoError> {
        let secret = self.secret()?;

        let mut salt = [0u8; SALT_LENGTH];
        let mut nonce_bytes = [0u8; NONCE_LENGTH];
        OsRng.fill_bytes(&mut salt);
        OsRng.fill_bytes(&mut nonce_bytes);

        let key = derive_key_blocking(secret, salt)
            .await
            .map_err(CryptoError::EncryptionFailed)?;

        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key));
        let mut buffer = plaintext.as_bytes().to_vec();
        let tag = cipher
            .encrypt_in_place_detached(Nonce::from_slice(&nonce_bytes), b"", &mut buffer)
            .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

        // 新 salt 的派生结果放进缓存，首次选中该 key 时无需再跑 PBKDF2
        self.derived_keys.insert(salt, key).await;

        let mut blob = Vec::with_capacity(HEADER_LENGTH + buffer.len());
        blob.extend_from_slice(&salt);
        blob.extend_from_slice(&nonce_bytes);
        blob.extend_from_slice(tag.as_slice());
        blob.extend_from_slice(&buffer);

        Ok(general_purpose::STANDARD.encode(blob))
    }

    /// 解密存储的 API Key
    ///
    /// 格式错误、认证标签不匹配（篡改或主密钥错误）都返回 `DecryptionFailed`。
    pub async fn decrypt(&self, encoded: &str) -> Result<String, CryptoError> {
        let secret = self.secret()?;

        let blob = general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| CryptoError::DecryptionFailed(format!("base64 decode: {}", e)))?;

        if blob.len() < HEADER_LENGTH {
            return Err(CryptoError::DecryptionFailed("ciphertext too short".to_string()));
        }

        let (salt_bytes, rest) = blob.split_at(SALT_LENGTH);
        let (nonce_bytes, rest) = rest.split_at(NONCE_LENGTH);
        let (tag_bytes, ciphertext) = rest.split_at(TAG_LENGTH);

        let mut salt = [0u8; SALT_LENGTH];
        salt.copy_from_slice(salt_bytes);

        let key = self
            .derived_keys
            .try_get_with(salt, async move {
                derive_key_blocking(secret, salt)
                    .await
                    .map_err(CryptoError::DecryptionFailed)
            })
            .await
            .map_err(|e| (*e).clone())?;

        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key));
        let mut buffer = ciphertext.to_vec();
        cipher
            .decrypt_in_place_detached(
                Nonce::from_slice(nonce_bytes),
                b"",
                &mut buffer,
                Tag::from_slice(tag_bytes),
            )
            .map_err(|_| CryptoError::DecryptionFailed("authentication failed".to_string()))?;

        String::from_utf8(buffer)
            .map_err(|e| CryptoError::DecryptionFailed(format!("invalid utf-8: {}", e)))
    }
}

/// PBKDF2 是 CPU 密集操作，放到阻塞线程池执行
async fn derive_key_blocking(
    secret: Arc<str>,
    salt: [u8; SALT_LENGTH],
) -> Result<[u8; KEY_LENGTH], String> {
    tokio::task::spawn_blocking(move || {
        debug!("Deriving encryption key with PBKDF2");
        derive_key(&secret, &salt)
    })
    .await
    .map_err(|e| format!("key derivation task failed: {}", e))
}

fn derive_key(secret: &str, salt: &[u8]) -> [u8; KEY_LENGTH] {
    let mut key = [0u8; KEY_LENGTH];
    pbkdf2::pbkdf2_hmac::<Sha256>(secret.as_bytes(), salt, PBKDF2_ITERATIONS, &mut key);
    key
}
