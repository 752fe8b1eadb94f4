//! Application Ports - 出站端口定义
//!
//! 定义应用层与存储基础设施之间的抽象接口

mod backend_factory;
mod database_config;
pub mod snapshot_ops;
mod storage_backend;

#[cfg(test)]
pub(crate) mod contract;

pub use backend_factory::{BackendCapabilities, BackendFactory};
pub use database_config::{DatabaseConfig, MongoConfig, MySqlConfig, SqlServerConfig, SqliteConfig};
pub use storage_backend::{BackendKind, ConnectionTest, StorageBackend, StorageError};
