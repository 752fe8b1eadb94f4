//! Fragment - 灵感片段记录

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use uuid::Uuid;

use super::serde_ext::null_as_default;

/// 片段
///
/// 生成状态标志由 AI 写作流程维护；片段在独立编辑窗口中的打开状态不持久化。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Fragment {
    pub id: String,
    pub book_id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(deserialize_with = "null_as_default")]
    pub content: String,
    pub is_generating: bool,
    pub was_stopped: bool,
    pub has_last_generation_params: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Fragment {
    pub fn new(
        book_id: impl Into<String>,
        title: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            book_id: book_id.into(),
            title: title.into(),
            content: content.into(),
            created_at: now,
            updated_at: now,
            ..Default::default()
        }
    }

    /// 列表顺序：最新创建在前
    pub fn listing_order(a: &Fragment, b: &Fragment) -> Ordering {
        b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id))
    }

    /// 返回归属于指定书籍的副本
    pub fn scoped_to(&self, book_id: &str) -> Self {
        Self {
            book_id: book_id.to_string(),
            ..self.clone()
        }
    }
}
