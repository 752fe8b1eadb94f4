//! 应用层 - 用例编排
//!
//! 包含：
//! - ports: 六边形架构端口定义（StorageBackend、BackendFactory、DatabaseConfig）
//! - migration: 后端之间的数据迁移

pub mod migration;
pub mod ports;

pub use migration::{
    migration_info, MigrationCoordinator, MigrationError, MigrationInfo, MigrationProgress,
    MigrationReport, MigrationStage, MigrationValidation,
};

pub use ports::{
    BackendCapabilities, BackendFactory, BackendKind, ConnectionTest, DatabaseConfig,
    StorageBackend, StorageError,
};
