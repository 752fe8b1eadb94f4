//! Migration - 在两个存储后端之间整体搬迁数据
//!
//! 线性流程：开始 → 连接 → 导出 → 导入 → 断开 → 完成。
//! 不重试、不回滚；失败时目标库可能只导入了一部分。

mod coordinator;
mod error;
mod progress;
mod validation;

pub use coordinator::{MigrationCoordinator, MigrationReport};
pub use error::MigrationError;
pub use progress::{MigrationProgress, MigrationStage};
pub use validation::{migration_info, MigrationInfo, MigrationValidation};
