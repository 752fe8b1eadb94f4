//! Storage Backend Port - 出站端口
//!
//! 统一的持久化接口，五种存储引擎（Local / MongoDB / MySQL / SQL Server / SQLite）
//! 各自实现。所有写操作都是 upsert，`get_*` 在记录不存在时返回 `None`。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use super::snapshot_ops;
use crate::domain::{AiProviderConfig, Book, Chapter, Fragment, Snapshot};

/// 存储后端类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Local,
    Mongodb,
    Mysql,
    Sqlserver,
    Sqlite,
}

impl BackendKind {
    pub const ALL: [BackendKind; 5] = [
        BackendKind::Local,
        BackendKind::Mongodb,
        BackendKind::Mysql,
        BackendKind::Sqlserver,
        BackendKind::Sqlite,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Local => "local",
            BackendKind::Mongodb => "mongodb",
            BackendKind::Mysql => "mysql",
            BackendKind::Sqlserver => "sqlserver",
            BackendKind::Sqlite => "sqlite",
        }
    }

    /// 面向用户的名称
    pub fn display_name(&self) -> &'static str {
        match self {
            BackendKind::Local => "Local Storage",
            BackendKind::Mongodb => "MongoDB",
            BackendKind::Mysql => "MySQL",
            BackendKind::Sqlserver => "SQL Server",
            BackendKind::Sqlite => "SQLite",
        }
    }

    /// 是否需要原生驱动（受限环境下不可用）
    pub fn requires_native_driver(&self) -> bool {
        !matches!(self, BackendKind::Local)
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for BackendKind {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BackendKind::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| StorageError::InvalidConfig(format!("unknown backend type: {}", s)))
    }
}

/// 存储错误
///
/// `message` 面向用户，`code` 保留驱动的原始错误码（SQLSTATE、MongoDB code 等）。
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("{backend} connection failed: {message}")]
    Connection {
        backend: BackendKind,
        message: String,
        code: Option<String>,
    },

    #[error("{0} is not connected")]
    NotConnected(BackendKind),

    #[error("{backend} {operation} failed: {message}")]
    Operation {
        backend: BackendKind,
        operation: &'static str,
        message: String,
        code: Option<String>,
    },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("{0} is unavailable in this environment")]
    Unavailable(BackendKind),
}

impl StorageError {
    pub fn connection(backend: BackendKind, message: impl Into<String>) -> Self {
        Self::Connection {
            backend,
            message: message.into(),
            code: None,
        }
    }

    pub fn operation(
        backend: BackendKind,
        operation: &'static str,
        message: impl Into<String>,
    ) -> Self {
        Self::Operation {
            backend,
            operation,
            message: message.into(),
            code: None,
        }
    }

    /// 附加驱动错误码
    pub fn with_code(mut self, new_code: Option<String>) -> Self {
        match &mut self {
            Self::Connection { code, .. } | Self::Operation { code, .. } => *code = new_code,
            _ => {}
        }
        self
    }

    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Connection { code, .. } | Self::Operation { code, .. } => code.as_deref(),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// 连接测试结果（永不失败，错误体现在 `success = false`）
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionTest {
    pub success: bool,
    pub message: String,
}

impl ConnectionTest {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

/// Storage Backend Port
///
/// 级联删除与快照导入导出有基于基本 CRUD 的默认实现；
/// 支持事务的后端可以覆盖 `delete_book`。
#[async_trait]
pub trait StorageBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    // ------------------------------------------------------------------
    // 连接管理
    // ------------------------------------------------------------------

    /// 建立连接（幂等）
    async fn connect(&self) -> Result<(), StorageError>;

    /// 释放连接（未连接时也返回 Ok）
    async fn disconnect(&self) -> Result<(), StorageError>;

    async fn test_connection(&self) -> ConnectionTest;

    // ------------------------------------------------------------------
    // 书籍
    // ------------------------------------------------------------------

    async fn save_book(&self, book: &Book) -> Result<(), StorageError>;

    async fn get_book(&self, book_id: &str) -> Result<Option<Book>, StorageError>;

    async fn list_books(&self) -> Result<Vec<Book>, StorageError>;

    /// 只删除书籍记录本身，不处理章节和片段
    async fn remove_book_record(&self, book_id: &str) -> Result<(), StorageError>;

    /// 删除书籍及其全部章节和片段
    async fn delete_book(&self, book_id: &str) -> Result<(), StorageError> {
        snapshot_ops::cascade_delete_book(self, book_id).await
    }

    // ------------------------------------------------------------------
    // 章节
    // ------------------------------------------------------------------

    async fn save_chapter(&self, book_id: &str, chapter: &Chapter) -> Result<(), StorageError>;

    async fn get_chapter(
        &self,
        book_id: &str,
        chapter_id: &str,
    ) -> Result<Option<Chapter>, StorageError>;

    async fn list_chapters(&self, book_id: &str) -> Result<Vec<Chapter>, StorageError>;

    async fn delete_chapter(&self, book_id: &str, chapter_id: &str) -> Result<(), StorageError>;

    // ------------------------------------------------------------------
    // 片段
    // ------------------------------------------------------------------

    async fn save_fragment(&self, book_id: &str, fragment: &Fragment)
        -> Result<(), StorageError>;

    async fn get_fragment(
        &self,
        book_id: &str,
        fragment_id: &str,
    ) -> Result<Option<Fragment>, StorageError>;

    async fn list_fragments(&self, book_id: &str) -> Result<Vec<Fragment>, StorageError>;

    async fn delete_fragment(&self, book_id: &str, fragment_id: &str)
        -> Result<(), StorageError>;

    // ------------------------------------------------------------------
    // AI 配置
    // ------------------------------------------------------------------

    async fn save_ai_config(
        &self,
        provider: &str,
        config: &AiProviderConfig,
    ) -> Result<(), StorageError>;

    async fn get_ai_config(&self, provider: &str)
        -> Result<Option<AiProviderConfig>, StorageError>;

    /// 列出已保存配置的服务商名称
    async fn list_ai_configs(&self) -> Result<Vec<String>, StorageError>;

    async fn delete_ai_config(&self, provider: &str) -> Result<(), StorageError>;

    // ------------------------------------------------------------------
    // 导入导出
    // ------------------------------------------------------------------

    async fn export_data(&self) -> Result<Snapshot, StorageError> {
        snapshot_ops::collect_snapshot(self).await
    }

    async fn import_data(&self, snapshot: &Snapshot) -> Result<(), StorageError> {
        snapshot_ops::apply_snapshot(self, snapshot).await
    }

    async fn clear_all_data(&self) -> Result<(), StorageError>;
}
