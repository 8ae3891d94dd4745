mod api_key;
pub mod crypto;

pub use api_key::{
    ApiKey,
    PoolStats,
    DEFAULT_KEY_NAME,
    create_api_key,
    get_api_key_by_id,
    list_api_keys,
    list_selection_candidates,
    list_stalest_inactive_keys,
    list_most_used_active_keys,
    record_api_key_selection,
    increment_used_quota,
    reset_all_quotas,
    activate_api_keys,
    deactivate_api_keys,
    set_api_key_active,
    get_pool_stats
};

pub use crypto::{
    ApiKeyCipher,
    CryptoError,
    ENCRYPTION_KEY_ENV
};
