//! Sled-based Local Storage Backend
//!
//! 键布局:
//! - `book:<id>`
//! - `chapter:<bookId>:<id>`
//! - `fragment:<bookId>:<id>`
//! - `aiConfig:<provider>`
//!
//! 值为 JSON 序列化的记录。

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::Db;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::application::ports::{BackendKind, ConnectionTest, StorageBackend, StorageError};
use crate::domain::{AiProviderConfig, Book, Chapter, Fragment};

const BOOK_PREFIX: &str = "book:";
const CHAPTER_PREFIX: &str = "chapter:";
const FRAGMENT_PREFIX: &str = "fragment:";
const AI_CONFIG_PREFIX: &str = "aiConfig:";
const PROBE_KEY: &str = "connection_probe";

/// 本地存储配置
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalStoreConfig {
    /// 持久化到目录
    Path(PathBuf),
    /// 进程退出即丢弃（测试和受限环境）
    Temporary,
}

impl Default for LocalStoreConfig {
    fn default() -> Self {
        Self::Path(PathBuf::from("data/local.sled"))
    }
}

/// Sled 本地存储后端
pub struct SledLocalBackend {
    db: Db,
    connected: AtomicBool,
}

impl SledLocalBackend {
    pub fn open(config: &LocalStoreConfig) -> Result<Self, StorageError> {
        let sled_config = match config {
            LocalStoreConfig::Path(path) => sled::Config::new().path(path),
            LocalStoreConfig::Temporary => sled::Config::new().temporary(true),
        };
        let db = sled_config
            .open()
            .map_err(|e| StorageError::connection(BackendKind::Local, e.to_string()))?;

        tracing::info!(
            config = ?config,
            entries = db.len(),
            "SledLocalBackend opened"
        );

        Ok(Self {
            db,
            connected: AtomicBool::new(false),
        })
    }

    pub fn temporary() -> Result<Self, StorageError> {
        Self::open(&LocalStoreConfig::Temporary)
    }

    fn put<T: Serialize>(&self, key: String, value: &T, op: &'static str) -> Result<(), StorageError> {
        let bytes = serde_json::to_vec(value)?;
        self.db.insert(key, bytes).map_err(|e| sled_error(op, e))?;
        Ok(())
    }

    fn fetch<T: DeserializeOwned>(&self, key: String, op: &'static str) -> Result<Option<T>, StorageError> {
        match self.db.get(key).map_err(|e| sled_error(op, e))? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn scan<T: DeserializeOwned>(&self, prefix: &str, op: &'static str) -> Result<Vec<T>, StorageError> {
        let mut records = Vec::new();
        for item in self.db.scan_prefix(prefix) {
            let (_, value) = item.map_err(|e| sled_error(op, e))?;
            records.push(serde_json::from_slice(&value)?);
        }
        Ok(records)
    }

    fn remove(&self, key: String, op: &'static str) -> Result<(), StorageError> {
        self.db.remove(key).map_err(|e| sled_error(op, e))?;
        Ok(())
    }
}

fn sled_error(op: &'static str, err: sled::Error) -> StorageError {
    StorageError::operation(BackendKind::Local, op, err.to_string())
}

fn book_key(book_id: &str) -> String {
    format!("{}{}", BOOK_PREFIX, book_id)
}

fn chapter_key(book_id: &str, chapter_id: &str) -> String {
    format!("{}{}:{}", CHAPTER_PREFIX, book_id, chapter_id)
}

fn fragment_key(book_id: &str, fragment_id: &str) -> String {
    format!("{}{}:{}", FRAGMENT_PREFIX, book_id, fragment_id)
}

fn ai_config_key(provider: &str) -> String {
    format!("{}{}", AI_CONFIG_PREFIX, provider)
}

#[async_trait]
impl StorageBackend for SledLocalBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Local
    }

    async fn connect(&self) -> Result<(), StorageError> {
        self.connected.store(true, Ordering::Relaxed);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), StorageError> {
        if self.connected.swap(false, Ordering::Relaxed) {
            self.db
                .flush_async()
                .await
                .map_err(|e| sled_error("flush", e))?;
        }
        Ok(())
    }

    async fn test_connection(&self) -> ConnectionTest {
        let probe = || -> Result<bool, sled::Error> {
            self.db.insert(PROBE_KEY, b"test".to_vec())?;
            let value = self.db.get(PROBE_KEY)?;
            self.db.remove(PROBE_KEY)?;
            Ok(value.as_deref() == Some(b"test".as_slice()))
        };

        match probe() {
            Ok(true) => ConnectionTest::ok("Local storage is available"),
            Ok(false) => ConnectionTest::failed("Local storage is unavailable"),
            Err(e) => ConnectionTest::failed(format!("Local storage test failed: {}", e)),
        }
    }

    async fn save_book(&self, book: &Book) -> Result<(), StorageError> {
        self.put(book_key(&book.id), book, "save book")
    }

    async fn get_book(&self, book_id: &str) -> Result<Option<Book>, StorageError> {
        self.fetch(book_key(book_id), "get book")
    }

    async fn list_books(&self) -> Result<Vec<Book>, StorageError> {
        let mut books: Vec<Book> = self.scan(BOOK_PREFIX, "list books")?;
        books.sort_by(Book::listing_order);
        Ok(books)
    }

    async fn remove_book_record(&self, book_id: &str) -> Result<(), StorageError> {
        self.remove(book_key(book_id), "delete book")
    }

    async fn save_chapter(&self, book_id: &str, chapter: &Chapter) -> Result<(), StorageError> {
        self.put(
            chapter_key(book_id, &chapter.id),
            &chapter.scoped_to(book_id),
            "save chapter",
        )
    }

    async fn get_chapter(
        &self,
        book_id: &str,
        chapter_id: &str,
    ) -> Result<Option<Chapter>, StorageError> {
        self.fetch(chapter_key(book_id, chapter_id), "get chapter")
    }

    async fn list_chapters(&self, book_id: &str) -> Result<Vec<Chapter>, StorageError> {
        let prefix = format!("{}{}:", CHAPTER_PREFIX, book_id);
        let mut chapters: Vec<Chapter> = self.scan(&prefix, "list chapters")?;
        // 前缀会命中 id 以 "<bookId>:" 开头的其他书籍
        chapters.retain(|chapter| chapter.book_id == book_id);
        chapters.sort_by(Chapter::listing_order);
        Ok(chapters)
    }

    async fn delete_chapter(&self, book_id: &str, chapter_id: &str) -> Result<(), StorageError> {
        self.remove(chapter_key(book_id, chapter_id), "delete chapter")
    }

    async fn save_fragment(&self, book_id: &str, fragment: &Fragment) -> Result<(), StorageError> {
        self.put(
            fragment_key(book_id, &fragment.id),
            &fragment.scoped_to(book_id),
            "save fragment",
        )
    }

    async fn get_fragment(
        &self,
        book_id: &str,
        fragment_id: &str,
    ) -> Result<Option<Fragment>, StorageError> {
        self.fetch(fragment_key(book_id, fragment_id), "get fragment")
    }

    async fn list_fragments(&self, book_id: &str) -> Result<Vec<Fragment>, StorageError> {
        let prefix = format!("{}{}:", FRAGMENT_PREFIX, book_id);
        let mut fragments: Vec<Fragment> = self.scan(&prefix, "list fragments")?;
        fragments.retain(|fragment| fragment.book_id == book_id);
        fragments.sort_by(Fragment::listing_order);
        Ok(fragments)
    }

    async fn delete_fragment(&self, book_id: &str, fragment_id: &str) -> Result<(), StorageError> {
        self.remove(fragment_key(book_id, fragment_id), "delete fragment")
    }

    async fn save_ai_config(
        &self,
        provider: &str,
        config: &AiProviderConfig,
    ) -> Result<(), StorageError> {
        self.put(ai_config_key(provider), config, "save AI config")
    }

    async fn get_ai_config(&self, provider: &str) -> Result<Option<AiProviderConfig>, StorageError> {
        self.fetch(ai_config_key(provider), "get AI config")
    }

    async fn list_ai_configs(&self) -> Result<Vec<String>, StorageError> {
        let mut providers = Vec::new();
        for item in self.db.scan_prefix(AI_CONFIG_PREFIX) {
            let (key, _) = item.map_err(|e| sled_error("list AI configs", e))?;
            let key = String::from_utf8(key.to_vec())
                .map_err(|e| StorageError::Serialization(e.to_string()))?;
            if let Some(provider) = key.strip_prefix(AI_CONFIG_PREFIX) {
                providers.push(provider.to_string());
            }
        }
        Ok(providers)
    }

    async fn delete_ai_config(&self, provider: &str) -> Result<(), StorageError> {
        self.remove(ai_config_key(provider), "delete AI config")
    }

    async fn clear_all_data(&self) -> Result<(), StorageError> {
        let mut batch = sled::Batch::default();
        let mut removed = 0usize;
        for prefix in [BOOK_PREFIX, CHAPTER_PREFIX, FRAGMENT_PREFIX, AI_CONFIG_PREFIX] {
            for key in self.db.scan_prefix(prefix).keys() {
                batch.remove(key.map_err(|e| sled_error("clear data", e))?);
                removed += 1;
            }
        }
        self.db
            .apply_batch(batch)
            .map_err(|e| sled_error("clear data", e))?;

        tracing::info!(removed = removed, "Local storage cleared");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::contract;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_local_backend_contract() {
        let backend = SledLocalBackend::temporary().unwrap();
        contract::run_all(&backend).await;
    }

    #[tokio::test]
    async fn test_key_layout() {
        let backend = SledLocalBackend::temporary().unwrap();
        let book = Book::new("T");
        let chapter = Chapter::new(&book.id, "C1", crate::domain::ChapterKind::Chapter);
        backend.save_book(&book).await.unwrap();
        backend.save_chapter(&book.id, &chapter).await.unwrap();
        backend
            .save_ai_config("openai", &AiProviderConfig::default())
            .await
            .unwrap();

        let keys: Vec<String> = backend
            .db
            .iter()
            .keys()
            .map(|k| String::from_utf8(k.unwrap().to_vec()).unwrap())
            .collect();
        assert!(keys.contains(&format!("book:{}", book.id)));
        assert!(keys.contains(&format!("chapter:{}:{}", book.id, chapter.id)));
        assert!(keys.contains(&"aiConfig:openai".to_string()));

        // 值是 JSON 记录
        let raw = backend.db.get(format!("book:{}", book.id)).unwrap().unwrap();
        let json: serde_json::Value = serde_json::from_slice(&raw).unwrap();
        assert_eq!(json["title"], "T");
    }

    #[tokio::test]
    async fn test_data_survives_reopen() {
        let dir = tempdir().unwrap();
        let config = LocalStoreConfig::Path(dir.path().join("local.sled"));
        let book = Book::new("Persistent");

        {
            let backend = SledLocalBackend::open(&config).unwrap();
            backend.connect().await.unwrap();
            backend.save_book(&book).await.unwrap();
            backend.disconnect().await.unwrap();
        }

        let backend = SledLocalBackend::open(&config).unwrap();
        assert_eq!(backend.get_book(&book.id).await.unwrap(), Some(book));
    }

    #[tokio::test]
    async fn test_chapter_saved_under_requested_book() {
        let backend = SledLocalBackend::temporary().unwrap();
        let chapter = Chapter::new("elsewhere", "C1", crate::domain::ChapterKind::Chapter);
        backend.save_chapter("b1", &chapter).await.unwrap();

        let stored = backend.get_chapter("b1", &chapter.id).await.unwrap().unwrap();
        assert_eq!(stored.book_id, "b1");
        assert!(backend.list_chapters("elsewhere").await.unwrap().is_empty());
    }
}
