//! Book - 书籍记录
//!
//! 包含层级结构的根：章节与片段都归属于某本书

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use uuid::Uuid;

use super::serde_ext::null_as_default;

/// 编辑器主题
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
    Auto,
}

/// 书籍编辑设置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BookSettings {
    pub auto_save: bool,
    /// 自动保存间隔（秒）
    pub auto_save_interval: u32,
    pub default_font_size: u32,
    pub theme: Theme,
    pub language: String,
    pub spell_check: bool,
    pub grammar_check: bool,
}

impl Default for BookSettings {
    fn default() -> Self {
        Self {
            auto_save: true,
            auto_save_interval: 30,
            default_font_size: 16,
            theme: Theme::default(),
            language: "zh-CN".to_string(),
            spell_check: false,
            grammar_check: false,
        }
    }
}

/// 书籍元数据
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BookMetadata {
    pub total_chapters: u32,
    pub total_words: u64,
    /// 预计阅读时间（分钟）
    pub reading_time: u32,
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cover_image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub isbn: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publisher: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publish_date: Option<DateTime<Utc>>,
}

/// 书籍
///
/// `chapter_ids` 保存章节的显示顺序，章节内容本身单独存储。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Book {
    pub id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(deserialize_with = "null_as_default")]
    pub author: String,
    #[serde(deserialize_with = "null_as_default")]
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub genre: Option<String>,
    /// 世界观设定
    #[serde(deserialize_with = "null_as_default")]
    pub setting: String,
    /// 情节大纲
    #[serde(deserialize_with = "null_as_default")]
    pub plot: String,
    pub word_count: u64,
    pub chapter_ids: Vec<String>,
    pub settings: BookSettings,
    pub metadata: BookMetadata,
    pub last_edited: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Book {
    pub fn new(title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            title: title.into(),
            last_edited: now,
            created_at: now,
            updated_at: now,
            ..Default::default()
        }
    }

    /// 列表顺序：最近更新在前，id 打破平局
    pub fn listing_order(a: &Book, b: &Book) -> Ordering {
        b.updated_at.cmp(&a.updated_at).then_with(|| a.id.cmp(&b.id))
    }

    /// 标记一次编辑
    pub fn touch(&mut self) {
        let now = Utc::now();
        self.last_edited = now;
        self.updated_at = now;
    }
}
