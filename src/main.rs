use tracing::{error, info, warn};
use yt_key_pool::config::PoolConfig;
use yt_key_pool::dao::api_key::ApiKeyCipher;
use yt_key_pool::dao::{INIT_SQL, init_db, init_db_from_file, init_sqlite_pool};
use yt_key_pool::logger::init_dev_logger;
use yt_key_pool::youtube_api::ApiKeyManager;

const ENV_DATABASE_URL: &str = "YT_POOL_DATABASE_URL";
const ENV_INIT_SQL: &str = "YT_POOL_INIT_SQL";
const ENV_SEED_KEYS: &str = "YT_POOL_SEED_KEYS";
const ENV_DEMO_VIDEO_ID: &str = "YT_POOL_DEMO_VIDEO_ID";

#[tokio::main]
async fn main() {
    //*
    //* Initialize logger
    //*
    let _log_guard = match init_dev_logger() {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logger: {}", e);
            std::process::exit(1);
        }
    };
    info!("Logger initialized successfully");

    if let Err(e) = run().await {
        error!("Key pool startup failed: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    //*
    //* Initialize database
    //*
    let db_url = std::env::var(ENV_DATABASE_URL).unwrap_or_else(|_| "sqlite://data/app.db".to_string());
    info!(db_url = %db_url, "Initializing database...");
    let pool = init_sqlite_pool(&db_url).await?;
    match std::env::var(ENV_INIT_SQL) {
        Ok(path) => init_db_from_file(&pool, &path).await?,
        Err(_) => init_db(&pool, INIT_SQL).await?,
    }
    info!("Database initialized successfully");

    //*
    //* Build the key pool
    //*
    let config = PoolConfig::from_env()?;
    let manager = ApiKeyManager::new(pool, ApiKeyCipher::from_env(), config)?;
    if !manager.cipher().is_configured() {
        warn!("ENCRYPTION_KEY is not set; key registration and selection will fail");
    }
    info!(
        quota_threshold = manager.config().quota_threshold,
        daily_quota_limit = manager.config().daily_quota_limit,
        max_retries = manager.config().max_retries,
        "Key pool configured"
    );

    // 逗号分隔的原始 key，启动时登记入库
    if let Ok(seed) = std::env::var(ENV_SEED_KEYS) {
        for raw_key in seed.split(',').map(str::trim).filter(|k| !k.is_empty()) {
            let id = manager.add_credential(None, raw_key, Some("seeded".to_string())).await?;
            info!(key_id = %id, "Seeded API key");
        }
    }

    let stats = manager.pool_stats().await?;
    info!(
        total = stats.total,
        active = stats.active,
        eligible = stats.eligible,
        total_used_quota = stats.total_used_quota,
        "Key pool status"
    );

    //*
    //* Optional demo call
    //*
    if let Ok(video_id) = std::env::var(ENV_DEMO_VIDEO_ID) {
        let response = manager
            .call_with_pool("videos.list", |client| {
                let video_id = video_id.clone();
                async move {
                    client
                        .list("videos", &[("part", "snippet,statistics"), ("id", video_id.as_str())])
                        .await
                }
            })
            .await?;
        info!(response = %response, "videos.list succeeded");
    }

    Ok(())
}
