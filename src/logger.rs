use tracing_subscriber::{
    fmt::{self, time::ChronoUtc},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer, Registry,
};
use tracing_appender::{non_blocking, non_blocking::WorkerGuard, rolling};
use anyhow::{Result, anyhow};

/// 日志级别枚举
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for &'static str {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

/// 日志配置结构体
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// 日志级别
    pub level: LogLevel,
    /// 日志文件目录
    pub log_dir: String,
    /// 日志文件名前缀
    pub file_prefix: String,
    /// 是否启用控制台输出
    pub console_output: bool,
    /// 是否启用JSON格式
    pub json_format: bool,
    /// 日志文件滚动策略 (daily, hourly)
    pub rotation: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            log_dir: "logs".to_string(),
            file_prefix: "yt_key_pool".to_string(),
            console_output: true,
            json_format: false,
            rotation: "daily".to_string(),
        }
    }
}

/// 未设置 RUST_LOG 时只输出本 crate 指定级别以上的日志
fn build_env_filter(level: LogLevel) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "{}={}",
            env!("CARGO_PKG_NAME").replace('-', "_"),
            <&str>::from(level)
        ))
    })
}

/// 初始化日志系统
///
/// 返回的 guard 需要在进程生命周期内持有，丢弃后文件日志停止刷新。
pub fn init_logger(config: LogConfig) -> Result<WorkerGuard> {
    // 确保日志目录存在
    std::fs::create_dir_all(&config.log_dir)?;

    // 创建文件appender
    let file_appender = match config.rotation.as_str() {
        "hourly" => rolling::hourly(&config.log_dir, &config.file_prefix),
        _ => rolling::daily(&config.log_dir, &config.file_prefix),
    };
    let (non_blocking_file, guard) = non_blocking(file_appender);

    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();

    let file_layer = fmt::layer()
        .with_writer(non_blocking_file)
        .with_timer(ChronoUtc::rfc_3339())
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);
    if config.json_format {
        layers.push(file_layer.json().boxed());
    } else {
        layers.push(file_layer.boxed());
    }

    // 如果启用控制台输出
    if config.console_output {
        let console_layer = fmt::layer()
            .with_timer(ChronoUtc::rfc_3339())
            .with_ansi(true)
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false);
        layers.push(console_layer.boxed());
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(build_env_filter(config.level))
        .try_init()
        .map_err(|e| anyhow!("Failed to install tracing subscriber: {}", e))?;

    Ok(guard)
}

/// 快速初始化开发环境日志
pub fn init_dev_logger() -> Result<WorkerGuard> {
    init_logger(LogConfig {
        level: LogLevel::Debug,
        file_prefix: "dev".to_string(),
        ..LogConfig::default()
    })
}

/// 快速初始化生产环境日志
pub fn init_prod_logger() -> Result<WorkerGuard> {
    init_logger(LogConfig {
        level: LogLevel::Info,
        log_dir: "/var/log/yt_key_pool".to_string(),
        file_prefix: "app".to_string(),
        console_output: false,
        json_format: true,
        rotation: "daily".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing::{debug, error, info, warn};

    #[test]
    fn test_level_names() {
        assert_eq!(<&str>::from(LogLevel::Warn), "warn");
        assert_eq!(<&str>::from(LogLevel::Trace), "trace");
    }

    #[tokio::test]
    async fn test_logging() {
        let dir = std::env::temp_dir().join(format!("yt_key_pool_logs_{}", uuid::Uuid::new_v4()));
        let guard = init_logger(LogConfig {
            level: LogLevel::Debug,
            log_dir: dir.to_string_lossy().to_string(),
            file_prefix: "test".to_string(),
            console_output: false,
            json_format: true,
            rotation: "hourly".to_string(),
        })
        .unwrap();

        error!("This is an error message");
        warn!("This is a warning message");
        info!("This is an info message");
        debug!("This is a debug message");

        // 结构化日志
        info!(key_id = "k-1", resource_method = "videos.list", cost = 1, "Charged quota");

        drop(guard);
        assert!(dir.exists());
    }
}
