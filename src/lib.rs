//! Quillbox - 小说写作数据的可插拔存储层
//!
//! 架构设计: DDD + Hexagonal Architecture
//!
//! 领域层 (domain/):
//! - Book / Chapter / Fragment / AiProviderConfig 记录
//! - Snapshot: 跨后端可移植的全量快照
//!
//! 应用层 (application/):
//! - Ports: StorageBackend、BackendFactory、DatabaseConfig
//! - Migration: 后端之间的数据迁移
//!
//! 基础设施层 (infrastructure/):
//! - Persistence: Sled（本地）、SQLite、MySQL、SQL Server、MongoDB
//! - Factory: 严格工厂与降级到本地存储的装饰器
//! - ConfigStore: 激活的数据库配置

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use config::{load_config, AppConfig};
