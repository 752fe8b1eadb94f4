//! Backend Factory - 按 `DatabaseConfig` 构造存储后端
//!
//! - `DriverFactory`: 严格构造，失败即返回错误
//! - `FallbackFactory`: 降级装饰器，远程后端不可用时换成本地存储

mod driver_factory;
mod fallback_factory;

pub use driver_factory::{DriverFactory, SupportedBackend};
pub use fallback_factory::FallbackFactory;
