//! MongoDB Storage Backend
//!
//! 集合: `books`、`chapters`、`fragments`、`ai_configs`。
//! 文档按记录自身的 `id`（以及 `bookId`）寻址，`_id` 由服务端生成、读取时忽略。

use async_trait::async_trait;
use futures_util::TryStreamExt;
use mongodb::bson::{doc, Document};
use mongodb::error::ErrorKind;
use mongodb::options::ClientOptions;
use mongodb::{Client, Collection, Database};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::application::ports::{
    BackendKind, ConnectionTest, MongoConfig, StorageBackend, StorageError,
};
use crate::domain::{AiProviderConfig, Book, Chapter, Fragment};
use crate::infrastructure::persistence::PoolSettings;

const KIND: BackendKind = BackendKind::Mongodb;

const BOOKS: &str = "books";
const CHAPTERS: &str = "chapters";
const FRAGMENTS: &str = "fragments";
const AI_CONFIGS: &str = "ai_configs";

/// `ai_configs` 集合中的文档
#[derive(Debug, Clone, Serialize, Deserialize)]
struct AiConfigDocument {
    provider: String,
    config: AiProviderConfig,
}

fn mongo_code(err: &mongodb::error::Error) -> Option<String> {
    match err.kind.as_ref() {
        ErrorKind::Command(command) => Some(command.code.to_string()),
        ErrorKind::Write(mongodb::error::WriteFailure::WriteError(write)) => {
            Some(write.code.to_string())
        }
        _ => None,
    }
}

fn mongo_error(op: &'static str) -> impl Fn(mongodb::error::Error) -> StorageError {
    move |e| {
        let code = mongo_code(&e);
        StorageError::operation(KIND, op, e.to_string()).with_code(code)
    }
}

fn mongo_connection_error(e: mongodb::error::Error) -> StorageError {
    let code = mongo_code(&e);
    StorageError::connection(KIND, e.to_string()).with_code(code)
}

/// MongoDB 存储后端
pub struct MongoBackend {
    config: MongoConfig,
    settings: PoolSettings,
    database: RwLock<Option<Database>>,
}

impl MongoBackend {
    pub fn new(config: MongoConfig, settings: PoolSettings) -> Result<Self, StorageError> {
        config.validate()?;
        Ok(Self {
            config,
            settings,
            database: RwLock::new(None),
        })
    }

    async fn client_options(&self) -> Result<ClientOptions, StorageError> {
        let mut options = ClientOptions::parse(&self.config.connection_string)
            .await
            .map_err(mongo_connection_error)?;
        options.app_name = Some("quillbox".to_string());
        options.max_pool_size = Some(self.settings.max_connections);
        if options.server_selection_timeout.is_none() {
            options.server_selection_timeout = Some(self.settings.acquire_timeout);
        }
        if options.connect_timeout.is_none() {
            options.connect_timeout = Some(self.settings.acquire_timeout);
        }
        Ok(options)
    }

    async fn database(&self) -> Result<Database, StorageError> {
        self.database
            .read()
            .await
            .clone()
            .ok_or(StorageError::NotConnected(KIND))
    }

    async fn collection<T: Send + Sync>(&self, name: &str) -> Result<Collection<T>, StorageError> {
        Ok(self.database().await?.collection::<T>(name))
    }

    async fn find_all<T>(
        &self,
        name: &str,
        filter: Document,
        op: &'static str,
    ) -> Result<Vec<T>, StorageError>
    where
        T: DeserializeOwned + Send + Sync + Unpin,
    {
        let cursor = self
            .collection::<T>(name)
            .await?
            .find(filter)
            .await
            .map_err(mongo_error(op))?;
        cursor.try_collect().await.map_err(mongo_error(op))
    }
}

#[async_trait]
impl StorageBackend for MongoBackend {
    fn kind(&self) -> BackendKind {
        KIND
    }

    async fn connect(&self) -> Result<(), StorageError> {
        let mut guard = self.database.write().await;
        if guard.is_some() {
            return Ok(());
        }

        let options = self.client_options().await?;
        let client = Client::with_options(options).map_err(mongo_connection_error)?;
        let database = client.database(&self.config.database_name);

        // 客户端是惰性的，ping 一次确认服务器可达
        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(mongo_connection_error)?;

        tracing::info!(
            database = %self.config.database_name,
            atlas = self.config.is_atlas.unwrap_or(false),
            "MongoDB connected"
        );
        *guard = Some(database);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), StorageError> {
        if let Some(database) = self.database.write().await.take() {
            database.client().clone().shutdown().await;
            tracing::info!(database = %self.config.database_name, "MongoDB disconnected");
        }
        Ok(())
    }

    async fn test_connection(&self) -> ConnectionTest {
        if let Err(e) = self.connect().await {
            return ConnectionTest::failed(format!("MongoDB connection test failed: {}", e));
        }
        let database = match self.database().await {
            Ok(database) => database,
            Err(e) => return ConnectionTest::failed(e.to_string()),
        };
        match database.run_command(doc! { "ping": 1 }).await {
            Ok(_) => ConnectionTest::ok("MongoDB connection is healthy"),
            Err(e) => ConnectionTest::failed(format!("MongoDB connection test failed: {}", e)),
        }
    }

    async fn save_book(&self, book: &Book) -> Result<(), StorageError> {
        self.collection::<Book>(BOOKS)
            .await?
            .replace_one(doc! { "id": &book.id }, book)
            .upsert(true)
            .await
            .map_err(mongo_error("save book"))?;
        Ok(())
    }

    async fn get_book(&self, book_id: &str) -> Result<Option<Book>, StorageError> {
        self.collection::<Book>(BOOKS)
            .await?
            .find_one(doc! { "id": book_id })
            .await
            .map_err(mongo_error("get book"))
    }

    async fn list_books(&self) -> Result<Vec<Book>, StorageError> {
        let mut books: Vec<Book> = self.find_all(BOOKS, doc! {}, "list books").await?;
        // 时间戳以文本存储，在内存中排序
        books.sort_by(Book::listing_order);
        Ok(books)
    }

    async fn remove_book_record(&self, book_id: &str) -> Result<(), StorageError> {
        self.collection::<Book>(BOOKS)
            .await?
            .delete_one(doc! { "id": book_id })
            .await
            .map_err(mongo_error("delete book"))?;
        Ok(())
    }

    async fn delete_book(&self, book_id: &str) -> Result<(), StorageError> {
        self.collection::<Chapter>(CHAPTERS)
            .await?
            .delete_many(doc! { "bookId": book_id })
            .await
            .map_err(mongo_error("delete book"))?;
        self.collection::<Fragment>(FRAGMENTS)
            .await?
            .delete_many(doc! { "bookId": book_id })
            .await
            .map_err(mongo_error("delete book"))?;
        self.remove_book_record(book_id).await
    }

    async fn save_chapter(&self, book_id: &str, chapter: &Chapter) -> Result<(), StorageError> {
        let chapter = chapter.scoped_to(book_id);
        self.collection::<Chapter>(CHAPTERS)
            .await?
            .replace_one(doc! { "bookId": book_id, "id": &chapter.id }, &chapter)
            .upsert(true)
            .await
            .map_err(mongo_error("save chapter"))?;
        Ok(())
    }

    async fn get_chapter(
        &self,
        book_id: &str,
        chapter_id: &str,
    ) -> Result<Option<Chapter>, StorageError> {
        self.collection::<Chapter>(CHAPTERS)
            .await?
            .find_one(doc! { "bookId": book_id, "id": chapter_id })
            .await
            .map_err(mongo_error("get chapter"))
    }

    async fn list_chapters(&self, book_id: &str) -> Result<Vec<Chapter>, StorageError> {
        let mut chapters: Vec<Chapter> = self
            .find_all(CHAPTERS, doc! { "bookId": book_id }, "list chapters")
            .await?;
        chapters.sort_by(Chapter::listing_order);
        Ok(chapters)
    }

    async fn delete_chapter(&self, book_id: &str, chapter_id: &str) -> Result<(), StorageError> {
        self.collection::<Chapter>(CHAPTERS)
            .await?
            .delete_one(doc! { "bookId": book_id, "id": chapter_id })
            .await
            .map_err(mongo_error("delete chapter"))?;
        Ok(())
    }

    async fn save_fragment(&self, book_id: &str, fragment: &Fragment) -> Result<(), StorageError> {
        let fragment = fragment.scoped_to(book_id);
        self.collection::<Fragment>(FRAGMENTS)
            .await?
            .replace_one(doc! { "bookId": book_id, "id": &fragment.id }, &fragment)
            .upsert(true)
            .await
            .map_err(mongo_error("save fragment"))?;
        Ok(())
    }

    async fn get_fragment(
        &self,
        book_id: &str,
        fragment_id: &str,
    ) -> Result<Option<Fragment>, StorageError> {
        self.collection::<Fragment>(FRAGMENTS)
            .await?
            .find_one(doc! { "bookId": book_id, "id": fragment_id })
            .await
            .map_err(mongo_error("get fragment"))
    }

    async fn list_fragments(&self, book_id: &str) -> Result<Vec<Fragment>, StorageError> {
        let mut fragments: Vec<Fragment> = self
            .find_all(FRAGMENTS, doc! { "bookId": book_id }, "list fragments")
            .await?;
        fragments.sort_by(Fragment::listing_order);
        Ok(fragments)
    }

    async fn delete_fragment(&self, book_id: &str, fragment_id: &str) -> Result<(), StorageError> {
        self.collection::<Fragment>(FRAGMENTS)
            .await?
            .delete_one(doc! { "bookId": book_id, "id": fragment_id })
            .await
            .map_err(mongo_error("delete fragment"))?;
        Ok(())
    }

    async fn save_ai_config(
        &self,
        provider: &str,
        config: &AiProviderConfig,
    ) -> Result<(), StorageError> {
        let document = AiConfigDocument {
            provider: provider.to_string(),
            config: config.clone(),
        };
        self.collection::<AiConfigDocument>(AI_CONFIGS)
            .await?
            .replace_one(doc! { "provider": provider }, &document)
            .upsert(true)
            .await
            .map_err(mongo_error("save AI config"))?;
        Ok(())
    }

    async fn get_ai_config(&self, provider: &str) -> Result<Option<AiProviderConfig>, StorageError> {
        let document = self
            .collection::<AiConfigDocument>(AI_CONFIGS)
            .await?
            .find_one(doc! { "provider": provider })
            .await
            .map_err(mongo_error("get AI config"))?;
        Ok(document.map(|d| d.config))
    }

    async fn list_ai_configs(&self) -> Result<Vec<String>, StorageError> {
        let documents: Vec<AiConfigDocument> = self
            .find_all(AI_CONFIGS, doc! {}, "list AI configs")
            .await?;
        let mut providers: Vec<String> = documents.into_iter().map(|d| d.provider).collect();
        providers.sort();
        Ok(providers)
    }

    async fn delete_ai_config(&self, provider: &str) -> Result<(), StorageError> {
        self.collection::<AiConfigDocument>(AI_CONFIGS)
            .await?
            .delete_one(doc! { "provider": provider })
            .await
            .map_err(mongo_error("delete AI config"))?;
        Ok(())
    }

    async fn clear_all_data(&self) -> Result<(), StorageError> {
        let database = self.database().await?;
        for name in [CHAPTERS, FRAGMENTS, BOOKS, AI_CONFIGS] {
            database
                .collection::<Document>(name)
                .delete_many(doc! {})
                .await
                .map_err(mongo_error("clear data"))?;
        }
        tracing::info!(database = %self.config.database_name, "MongoDB data cleared");
        Ok(())
    }
}
