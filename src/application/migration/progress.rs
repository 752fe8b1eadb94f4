//! 迁移进度

use serde::Serialize;
use std::fmt;

/// 迁移阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum MigrationStage {
    Start,
    Connect,
    Export,
    Import,
    Disconnect,
    Done,
}

impl MigrationStage {
    pub fn label(&self) -> &'static str {
        match self {
            MigrationStage::Start => "Starting migration",
            MigrationStage::Connect => "Connecting databases",
            MigrationStage::Export => "Exporting data",
            MigrationStage::Import => "Importing data",
            MigrationStage::Disconnect => "Disconnecting",
            MigrationStage::Done => "Migration complete",
        }
    }
}

impl fmt::Display for MigrationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// 一次进度回调
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationProgress {
    pub stage: MigrationStage,
    pub completed: u32,
    pub total: u32,
    pub message: String,
}

impl MigrationProgress {
    pub fn new(stage: MigrationStage, completed: u32, total: u32) -> Self {
        Self {
            stage,
            completed,
            total,
            message: format!("{} ({}/{})", stage.label(), completed, total),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.completed >= self.total
    }
}

/// 按固定总步数逐步上报：第 n 次上报的计数为 n（从 0 开始），不超过总数
pub(crate) struct ProgressReporter<P> {
    total: u32,
    next: u32,
    on_progress: P,
}

impl<P: FnMut(&MigrationProgress)> ProgressReporter<P> {
    pub(crate) fn new(total: u32, on_progress: P) -> Self {
        Self {
            total,
            next: 0,
            on_progress,
        }
    }

    pub(crate) fn report(&mut self, stage: MigrationStage) {
        let progress = MigrationProgress::new(stage, self.next, self.total);
        self.next = (self.next + 1).min(self.total);

        tracing::info!(
            stage = ?stage,
            completed = progress.completed,
            total = progress.total,
            "{}",
            progress.message
        );
        (self.on_progress)(&progress);
    }
}
