//! Domain Layer - 领域层
//!
//! 写作数据的纯记录类型，以及跨后端的快照格式:
//! - Book: 书籍（层级结构的根）
//! - Chapter / Fragment: 归属于书籍，随书籍级联删除
//! - AiProviderConfig: 按服务商名称索引的 AI 配置

mod ai_config;
mod book;
mod chapter;
mod fragment;
mod serde_ext;
mod snapshot;

pub use ai_config::AiProviderConfig;
pub use book::{Book, BookMetadata, BookSettings, Theme};
pub use chapter::{Chapter, ChapterKind, ChapterMetadata};
pub use fragment::Fragment;
pub use snapshot::{BookEntry, Snapshot, SnapshotCounts};
