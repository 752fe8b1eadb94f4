//! Snapshot - 可移植的全量数据快照
//!
//! `export_data` / `import_data` 的交换格式，与具体存储引擎无关：
//!
//! ```json
//! {
//!   "books": { "<bookId>": { ...Book, "chapters": [...], "fragments": [...] } },
//!   "aiConfigs": { "<provider>": { ...AiProviderConfig } }
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{AiProviderConfig, Book, Chapter, Fragment};

/// 快照中的一本书，附带其全部章节和片段
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BookEntry {
    #[serde(flatten)]
    pub book: Book,
    #[serde(default)]
    pub chapters: Vec<Chapter>,
    #[serde(default)]
    pub fragments: Vec<Fragment>,
}

impl BookEntry {
    pub fn new(book: Book) -> Self {
        Self {
            book,
            chapters: Vec::new(),
            fragments: Vec::new(),
        }
    }
}

/// 全量快照
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Snapshot {
    pub books: BTreeMap<String, BookEntry>,
    pub ai_configs: BTreeMap<String, AiProviderConfig>,
}

/// 快照中各类记录的数量
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotCounts {
    pub books: usize,
    pub chapters: usize,
    pub fragments: usize,
    pub ai_configs: usize,
}

impl Snapshot {
    pub fn is_empty(&self) -> bool {
        self.books.is_empty() && self.ai_configs.is_empty()
    }

    pub fn counts(&self) -> SnapshotCounts {
        SnapshotCounts {
            books: self.books.len(),
            chapters: self.books.values().map(|e| e.chapters.len()).sum(),
            fragments: self.books.values().map(|e| e.fragments.len()).sum(),
            ai_configs: self.ai_configs.len(),
        }
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ChapterKind;

    fn sample() -> Snapshot {
        let book = Book::new("T");
        let mut entry = BookEntry::new(book.clone());
        entry
            .chapters
            .push(Chapter::new(&book.id, "C1", ChapterKind::Chapter));
        entry
            .chapters
            .push(Chapter::new(&book.id, "C2", ChapterKind::Chapter));
        entry.fragments.push(Fragment::new(&book.id, "F1", "..."));

        let mut snapshot = Snapshot::default();
        snapshot.books.insert(book.id.clone(), entry);
        snapshot
            .ai_configs
            .insert("openai".to_string(), AiProviderConfig::new("gpt-4o", "sk-test"));
        snapshot
    }

    #[test]
    fn test_counts_walk_nested_records() {
        let counts = sample().counts();
        assert_eq!(
            counts,
            SnapshotCounts {
                books: 1,
                chapters: 2,
                fragments: 1,
                ai_configs: 1,
            }
        );
    }

    #[test]
    fn test_book_entry_is_flattened() {
        let json = serde_json::to_value(sample()).unwrap();
        let (_, entry) = json["books"].as_object().unwrap().iter().next().unwrap();
        assert_eq!(entry["title"], "T");
        assert_eq!(entry["chapters"].as_array().unwrap().len(), 2);
        assert!(json.get("aiConfigs").is_some());
    }

    #[test]
    fn test_parses_snapshot_from_older_writer() {
        let json = r#"{
            "books": {
                "b1": {
                    "id": "b1",
                    "title": "Old",
                    "lastEdited": "2024-05-01T08:00:00Z",
                    "chapters": [{"id": "c1", "title": "C1", "type": "chapter"}]
                }
            }
        }"#;
        let snapshot = Snapshot::from_json(json).unwrap();
        let entry = &snapshot.books["b1"];
        assert_eq!(entry.book.title, "Old");
        assert_eq!(entry.chapters[0].id, "c1");
        assert!(entry.fragments.is_empty());
        assert!(snapshot.ai_configs.is_empty());
    }

    #[test]
    fn test_parses_ai_config_with_base_url_key() {
        let json = r#"{
            "aiConfigs": {
                "openai": {
                    "provider": "openai",
                    "model": "gpt-4o",
                    "apiKey": "sk-test",
                    "baseURL": "https://proxy.example",
                    "temperature": 0.5,
                    "topP": 1,
                    "maxTokens": 4000
                }
            }
        }"#;
        let snapshot = Snapshot::from_json(json).unwrap();
        let config = &snapshot.ai_configs["openai"];
        assert_eq!(config.base_url.as_deref(), Some("https://proxy.example"));
        assert_eq!(config.max_tokens, 4000);
    }

    #[test]
    fn test_null_text_columns_read_as_empty() {
        let json = r#"{
            "books": {
                "b1": {
                    "id": "b1",
                    "title": "T",
                    "description": null,
                    "setting": null,
                    "plot": null,
                    "chapters": [{"id": "c1", "title": "C1", "content": null}],
                    "fragments": [{"id": "f1", "title": null, "content": "x"}]
                }
            }
        }"#;
        let snapshot = Snapshot::from_json(json).unwrap();
        let entry = &snapshot.books["b1"];
        assert_eq!(entry.book.description, "");
        assert_eq!(entry.book.setting, "");
        assert_eq!(entry.book.plot, "");
        assert_eq!(entry.chapters[0].content, "");
        assert_eq!(entry.fragments[0].title, "");
    }
}
