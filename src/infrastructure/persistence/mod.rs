//! Persistence Layer - 数据持久化
//!
//! 五种存储后端实现：Sled（本地）、SQLite、MySQL、SQL Server、MongoDB

pub mod mongodb;
pub mod mysql;
pub(crate) mod row_codec;
pub mod sled;
pub mod sqlite;
pub mod sqlserver;

use std::time::Duration;

pub use self::mongodb::MongoBackend;
pub use self::mysql::MySqlBackend;
pub use self::sled::{LocalStoreConfig, SledLocalBackend};
pub use self::sqlite::SqliteBackend;
pub use self::sqlserver::SqlServerBackend;

/// 连接池设置（SQL 后端共用）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolSettings {
    /// 最大连接数
    pub max_connections: u32,
    /// 建立或获取连接的超时时间
    pub acquire_timeout: Duration,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_connections: 5,
            acquire_timeout: Duration::from_secs(30),
        }
    }
}
