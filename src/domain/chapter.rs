//! Chapter - 章节记录

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use uuid::Uuid;

use super::serde_ext::null_as_default;

/// 章节类型：卷或章
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChapterKind {
    Volume,
    #[default]
    Chapter,
}

impl ChapterKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChapterKind::Volume => "volume",
            ChapterKind::Chapter => "chapter",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChapterMetadata {
    pub reading_time: u32,
    pub tags: Vec<String>,
    pub is_draft: bool,
    pub is_completed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub word_goal: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deadline: Option<DateTime<Utc>>,
}

/// 章节
///
/// 不变量:
/// - `book_id` 指向已存在的书籍
/// - `parent_id` 只用于卷内嵌套，同级之间按 `order_index` 排序
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Chapter {
    pub id: String,
    pub book_id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(deserialize_with = "null_as_default")]
    pub content: String,
    #[serde(rename = "type")]
    pub kind: ChapterKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    pub order_index: i64,
    pub is_locked: bool,
    pub word_count: u64,
    /// 细纲（结构由前端决定）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail_outline: Option<serde_json::Value>,
    pub metadata: ChapterMetadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Chapter {
    pub fn new(book_id: impl Into<String>, title: impl Into<String>, kind: ChapterKind) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            book_id: book_id.into(),
            title: title.into(),
            kind,
            created_at: now,
            updated_at: now,
            ..Default::default()
        }
    }

    /// 列表顺序：同级按 `order_index` 升序
    pub fn listing_order(a: &Chapter, b: &Chapter) -> Ordering {
        a.order_index
            .cmp(&b.order_index)
            .then_with(|| a.created_at.cmp(&b.created_at))
            .then_with(|| a.id.cmp(&b.id))
    }

    /// 返回归属于指定书籍的副本
    pub fn scoped_to(&self, book_id: &str) -> Self {
        Self {
            book_id: book_id.to_string(),
            ..self.clone()
        }
    }
}
