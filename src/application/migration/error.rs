//! 迁移错误

use thiserror::Error;

use super::MigrationStage;
use crate::application::ports::StorageError;

/// 迁移在某个阶段失败
///
/// 已写入目标库的记录不会被撤销。
#[derive(Debug, Error)]
#[error("Migration failed at stage '{stage}': {source}")]
pub struct MigrationError {
    pub stage: MigrationStage,
    #[source]
    pub source: StorageError,
}

impl MigrationError {
    pub fn new(stage: MigrationStage, source: StorageError) -> Self {
        Self { stage, source }
    }

    pub(crate) fn at(stage: MigrationStage) -> impl FnOnce(StorageError) -> Self {
        move |source| Self::new(stage, source)
    }
}
