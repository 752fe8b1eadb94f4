//! Infrastructure Layer - 基础设施层
//!
//! 提供所有端口的具体实现

pub mod config_store;
pub mod factory;
pub mod persistence;

pub use config_store::{ConfigStore, ConfigStoreError};
pub use factory::{DriverFactory, FallbackFactory, SupportedBackend};
pub use persistence::{LocalStoreConfig, PoolSettings};
