use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

pub mod api_key;

/// 建表脚本，随二进制一起编译
pub const INIT_SQL: &str = include_str!("../../data/init.sql");

/// 按 `db_url` 建立连接池，每次调用都返回新连接的池
///
/// 写冲突时 SQLite 会先等待 `busy_timeout`，仍拿不到锁才返回 SQLITE_BUSY。
pub async fn init_sqlite_pool(db_url: &str) -> anyhow::Result<Arc<SqlitePool>> {
    let options = SqliteConnectOptions::from_str(db_url)?
        .create_if_missing(true)
        .busy_timeout(Duration::from_secs(5));
    let pool = SqlitePoolOptions::new().connect_with(options).await?;
    Ok(Arc::new(pool))
}

/// 执行 SQL 脚本，支持多条语句以分号分割
pub async fn init_db(pool: &SqlitePool, sql: &str) -> anyhow::Result<()> {
    for statement in sql.split(';') {
        let stmt = statement.trim();
        if !stmt.is_empty() {
            sqlx::query(stmt).execute(pool).await?;
        }
    }
    Ok(())
}

/// 从文件读取并执行 SQL 脚本
pub async fn init_db_from_file(pool: &SqlitePool, sql_path: &str) -> anyhow::Result<()> {
    let sql = tokio::fs::read_to_string(sql_path).await?;
    init_db(pool, &sql).await
}
