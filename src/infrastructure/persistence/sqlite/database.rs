//! SQLite Database - 数据库连接和建表

use sqlx::{sqlite::SqlitePoolOptions, Pool, Sqlite};
use std::path::Path;
use std::time::Duration;

use crate::infrastructure::persistence::PoolSettings;

/// 数据库配置
#[derive(Debug, Clone)]
pub struct SqliteDatabaseConfig {
    /// 数据库 URL
    pub database_url: String,
    /// 最大连接数
    pub max_connections: u32,
    /// 获取连接的超时时间
    pub acquire_timeout: Duration,
    /// 常驻连接数
    pub min_connections: u32,
    /// 空闲连接回收时间，`None` 表示不回收
    pub idle_timeout: Option<Duration>,
    /// 连接最长存活时间，`None` 表示不限
    pub max_lifetime: Option<Duration>,
}

impl SqliteDatabaseConfig {
    pub fn new(path: impl AsRef<Path>, settings: PoolSettings) -> Self {
        Self {
            database_url: format!("sqlite:{}?mode=rwc", path.as_ref().display()),
            max_connections: settings.max_connections,
            acquire_timeout: settings.acquire_timeout,
            min_connections: 0,
            idle_timeout: Some(Duration::from_secs(10 * 60)),
            max_lifetime: Some(Duration::from_secs(30 * 60)),
        }
    }

    /// 内存库只活在唯一的连接里，连接一旦关闭数据即丢失
    pub fn in_memory() -> Self {
        Self {
            database_url: "sqlite::memory:".to_string(),
            max_connections: 1,
            acquire_timeout: Duration::from_secs(30),
            min_connections: 1,
            idle_timeout: None,
            max_lifetime: None,
        }
    }
}

/// 数据库连接池
pub type DbPool = Pool<Sqlite>;

/// 创建数据库连接池
pub async fn create_pool(config: &SqliteDatabaseConfig) -> Result<DbPool, sqlx::Error> {
    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(config.acquire_timeout)
        .min_connections(config.min_connections)
        .idle_timeout(config.idle_timeout)
        .max_lifetime(config.max_lifetime)
        .connect(&config.database_url)
        .await?;

    // 启用 WAL 模式，允许并发读写
    sqlx::query("PRAGMA journal_mode=WAL")
        .execute(&pool)
        .await?;

    // 设置 busy_timeout=5000ms，遇到锁时等待而不是立即失败
    sqlx::query("PRAGMA busy_timeout=5000")
        .execute(&pool)
        .await?;

    tracing::info!(
        url = %config.database_url,
        "SQLite pool created with WAL mode and busy_timeout=5000ms"
    );

    Ok(pool)
}

/// 建表（幂等）
///
/// 不使用外键：章节可以先于书籍写入，级联删除由后端自行完成。
pub async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS books (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            data TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chapters (
            book_id TEXT NOT NULL,
            id TEXT NOT NULL,
            title TEXT NOT NULL,
            kind TEXT NOT NULL CHECK (kind IN ('volume', 'chapter')),
            parent_id TEXT,
            order_index INTEGER NOT NULL DEFAULT 0,
            data TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            PRIMARY KEY (book_id, id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS fragments (
            book_id TEXT NOT NULL,
            id TEXT NOT NULL,
            title TEXT NOT NULL,
            data TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            PRIMARY KEY (book_id, id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS ai_configs (
            provider TEXT PRIMARY KEY,
            config TEXT NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_chapters_book_order
        ON chapters(book_id, order_index)
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_fragments_book_created
        ON fragments(book_id, created_at)
        "#,
    )
    .execute(pool)
    .await?;

    tracing::info!("SQLite migrations completed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_in_memory_db() {
        let config = SqliteDatabaseConfig::in_memory();
        let pool = create_pool(&config).await.unwrap();
        run_migrations(&pool).await.unwrap();
        // 重复执行不报错
        run_migrations(&pool).await.unwrap();
    }

    #[tokio::test]
    async fn test_in_memory_pool_never_drops_its_connection() {
        let config = SqliteDatabaseConfig::in_memory();
        let pool = create_pool(&config).await.unwrap();

        let options = pool.options();
        assert_eq!(options.get_min_connections(), 1);
        assert_eq!(options.get_max_connections(), 1);
        assert!(options.get_idle_timeout().is_none());
        assert!(options.get_max_lifetime().is_none());
    }

    #[test]
    fn test_file_pool_recycles_idle_connections() {
        let config = SqliteDatabaseConfig::new("novels.db", PoolSettings::default());
        assert_eq!(config.min_connections, 0);
        assert!(config.idle_timeout.is_some());
    }
}
