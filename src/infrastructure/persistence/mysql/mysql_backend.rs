//! MySQL Storage Backend

use async_trait::async_trait;
use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions, MySqlSslMode};
use tokio::sync::RwLock;

use crate::application::ports::{
    BackendKind, ConnectionTest, MySqlConfig, StorageBackend, StorageError,
};
use crate::domain::{AiProviderConfig, Book, Chapter, Fragment};
use crate::infrastructure::persistence::row_codec::{self, decode, decode_all, encode, sort_key};
use crate::infrastructure::persistence::PoolSettings;

const KIND: BackendKind = BackendKind::Mysql;

fn db_error(op: &'static str) -> impl FnOnce(sqlx::Error) -> StorageError {
    move |e| row_codec::sqlx_error(KIND, op, e)
}

const CREATE_TABLES: [&str; 4] = [
    r#"
    CREATE TABLE IF NOT EXISTS books (
        id VARCHAR(255) NOT NULL PRIMARY KEY,
        title VARCHAR(500) NOT NULL,
        data LONGTEXT NOT NULL,
        created_at BIGINT NOT NULL,
        updated_at BIGINT NOT NULL
    ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4 COLLATE=utf8mb4_bin
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS chapters (
        book_id VARCHAR(255) NOT NULL,
        id VARCHAR(255) NOT NULL,
        title VARCHAR(500) NOT NULL,
        kind ENUM('volume', 'chapter') NOT NULL,
        parent_id VARCHAR(255) NULL,
        order_index BIGINT NOT NULL DEFAULT 0,
        data LONGTEXT NOT NULL,
        created_at BIGINT NOT NULL,
        updated_at BIGINT NOT NULL,
        PRIMARY KEY (book_id, id),
        INDEX idx_chapters_book_order (book_id, order_index)
    ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4 COLLATE=utf8mb4_bin
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS fragments (
        book_id VARCHAR(255) NOT NULL,
        id VARCHAR(255) NOT NULL,
        title VARCHAR(500) NOT NULL,
        data LONGTEXT NOT NULL,
        created_at BIGINT NOT NULL,
        updated_at BIGINT NOT NULL,
        PRIMARY KEY (book_id, id),
        INDEX idx_fragments_book_created (book_id, created_at)
    ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4 COLLATE=utf8mb4_bin
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS ai_configs (
        provider VARCHAR(255) NOT NULL PRIMARY KEY,
        config LONGTEXT NOT NULL,
        updated_at BIGINT NOT NULL
    ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4 COLLATE=utf8mb4_bin
    "#,
];

/// MySQL 存储后端
pub struct MySqlBackend {
    config: MySqlConfig,
    settings: PoolSettings,
    pool: RwLock<Option<MySqlPool>>,
}

impl MySqlBackend {
    pub fn new(config: MySqlConfig, settings: PoolSettings) -> Result<Self, StorageError> {
        config.validate()?;
        Ok(Self {
            config,
            settings,
            pool: RwLock::new(None),
        })
    }

    fn connect_options(&self) -> MySqlConnectOptions {
        let ssl_mode = match self.config.ssl {
            Some(true) => MySqlSslMode::Required,
            Some(false) => MySqlSslMode::Disabled,
            None => MySqlSslMode::Preferred,
        };

        MySqlConnectOptions::new()
            .host(&self.config.host)
            .port(self.config.port)
            .username(&self.config.username)
            .password(&self.config.password)
            .database(&self.config.database)
            .charset("utf8mb4")
            .ssl_mode(ssl_mode)
    }

    async fn pool(&self) -> Result<MySqlPool, StorageError> {
        self.pool
            .read()
            .await
            .clone()
            .ok_or(StorageError::NotConnected(KIND))
    }

    fn endpoint(&self) -> String {
        format!("{}:{}/{}", self.config.host, self.config.port, self.config.database)
    }
}

#[async_trait]
impl StorageBackend for MySqlBackend {
    fn kind(&self) -> BackendKind {
        KIND
    }

    async fn connect(&self) -> Result<(), StorageError> {
        let mut guard = self.pool.write().await;
        if guard.is_some() {
            return Ok(());
        }

        let pool = MySqlPoolOptions::new()
            .max_connections(self.settings.max_connections)
            .acquire_timeout(self.settings.acquire_timeout)
            .connect_with(self.connect_options())
            .await
            .map_err(|e| row_codec::sqlx_connection_error(KIND, e))?;

        for ddl in CREATE_TABLES {
            sqlx::query(ddl)
                .execute(&pool)
                .await
                .map_err(db_error("create tables"))?;
        }

        tracing::info!(endpoint = %self.endpoint(), "MySQL connected");
        *guard = Some(pool);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), StorageError> {
        if let Some(pool) = self.pool.write().await.take() {
            pool.close().await;
            tracing::info!(endpoint = %self.endpoint(), "MySQL disconnected");
        }
        Ok(())
    }

    async fn test_connection(&self) -> ConnectionTest {
        if let Err(e) = self.connect().await {
            return ConnectionTest::failed(format!("MySQL connection test failed: {}", e));
        }
        let pool = match self.pool().await {
            Ok(pool) => pool,
            Err(e) => return ConnectionTest::failed(e.to_string()),
        };
        match sqlx::query("SELECT 1").execute(&pool).await {
            Ok(_) => ConnectionTest::ok("MySQL connection is healthy"),
            Err(e) => ConnectionTest::failed(format!("MySQL connection test failed: {}", e)),
        }
    }

    async fn save_book(&self, book: &Book) -> Result<(), StorageError> {
        let pool = self.pool().await?;
        sqlx::query(
            r#"
            INSERT INTO books (id, title, data, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON DUPLICATE KEY UPDATE
                title = VALUES(title),
                data = VALUES(data),
                created_at = VALUES(created_at),
                updated_at = VALUES(updated_at)
            "#,
        )
        .bind(&book.id)
        .bind(&book.title)
        .bind(encode(book)?)
        .bind(sort_key(&book.created_at))
        .bind(sort_key(&book.updated_at))
        .execute(&pool)
        .await
        .map_err(db_error("save book"))?;

        Ok(())
    }

    async fn get_book(&self, book_id: &str) -> Result<Option<Book>, StorageError> {
        let pool = self.pool().await?;
        let data: Option<String> = sqlx::query_scalar("SELECT data FROM books WHERE id = ?")
            .bind(book_id)
            .fetch_optional(&pool)
            .await
            .map_err(db_error("get book"))?;

        data.as_deref().map(decode).transpose()
    }

    async fn list_books(&self) -> Result<Vec<Book>, StorageError> {
        let pool = self.pool().await?;
        let rows: Vec<String> =
            sqlx::query_scalar("SELECT data FROM books ORDER BY updated_at DESC, id")
                .fetch_all(&pool)
                .await
                .map_err(db_error("list books"))?;

        decode_all(rows)
    }

    async fn remove_book_record(&self, book_id: &str) -> Result<(), StorageError> {
        let pool = self.pool().await?;
        sqlx::query("DELETE FROM books WHERE id = ?")
            .bind(book_id)
            .execute(&pool)
            .await
            .map_err(db_error("delete book"))?;
        Ok(())
    }

    async fn delete_book(&self, book_id: &str) -> Result<(), StorageError> {
        let pool = self.pool().await?;
        let mut tx = pool.begin().await.map_err(db_error("delete book"))?;

        for sql in [
            "DELETE FROM chapters WHERE book_id = ?",
            "DELETE FROM fragments WHERE book_id = ?",
            "DELETE FROM books WHERE id = ?",
        ] {
            sqlx::query(sql)
                .bind(book_id)
                .execute(&mut *tx)
                .await
                .map_err(db_error("delete book"))?;
        }

        tx.commit().await.map_err(db_error("delete book"))?;
        Ok(())
    }

    async fn save_chapter(&self, book_id: &str, chapter: &Chapter) -> Result<(), StorageError> {
        let pool = self.pool().await?;
        let chapter = chapter.scoped_to(book_id);
        sqlx::query(
            r#"
            INSERT INTO chapters (book_id, id, title, kind, parent_id, order_index, data, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON DUPLICATE KEY UPDATE
                title = VALUES(title),
                kind = VALUES(kind),
                parent_id = VALUES(parent_id),
                order_index = VALUES(order_index),
                data = VALUES(data),
                created_at = VALUES(created_at),
                updated_at = VALUES(updated_at)
            "#,
        )
        .bind(&chapter.book_id)
        .bind(&chapter.id)
        .bind(&chapter.title)
        .bind(chapter.kind.as_str())
        .bind(&chapter.parent_id)
        .bind(chapter.order_index)
        .bind(encode(&chapter)?)
        .bind(sort_key(&chapter.created_at))
        .bind(sort_key(&chapter.updated_at))
        .execute(&pool)
        .await
        .map_err(db_error("save chapter"))?;

        Ok(())
    }

    async fn get_chapter(
        &self,
        book_id: &str,
        chapter_id: &str,
    ) -> Result<Option<Chapter>, StorageError> {
        let pool = self.pool().await?;
        let data: Option<String> =
            sqlx::query_scalar("SELECT data FROM chapters WHERE book_id = ? AND id = ?")
                .bind(book_id)
                .bind(chapter_id)
                .fetch_optional(&pool)
                .await
                .map_err(db_error("get chapter"))?;

        data.as_deref().map(decode).transpose()
    }

    async fn list_chapters(&self, book_id: &str) -> Result<Vec<Chapter>, StorageError> {
        let pool = self.pool().await?;
        let rows: Vec<String> = sqlx::query_scalar(
            "SELECT data FROM chapters WHERE book_id = ? ORDER BY order_index, created_at, id",
        )
        .bind(book_id)
        .fetch_all(&pool)
        .await
        .map_err(db_error("list chapters"))?;

        decode_all(rows)
    }

    async fn delete_chapter(&self, book_id: &str, chapter_id: &str) -> Result<(), StorageError> {
        let pool = self.pool().await?;
        sqlx::query("DELETE FROM chapters WHERE book_id = ? AND id = ?")
            .bind(book_id)
            .bind(chapter_id)
            .execute(&pool)
            .await
            .map_err(db_error("delete chapter"))?;
        Ok(())
    }

    async fn save_fragment(&self, book_id: &str, fragment: &Fragment) -> Result<(), StorageError> {
        let pool = self.pool().await?;
        let fragment = fragment.scoped_to(book_id);
        sqlx::query(
            r#"
            INSERT INTO fragments (book_id, id, title, data, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON DUPLICATE KEY UPDATE
                title = VALUES(title),
                data = VALUES(data),
                created_at = VALUES(created_at),
                updated_at = VALUES(updated_at)
            "#,
        )
        .bind(&fragment.book_id)
        .bind(&fragment.id)
        .bind(&fragment.title)
        .bind(encode(&fragment)?)
        .bind(sort_key(&fragment.created_at))
        .bind(sort_key(&fragment.updated_at))
        .execute(&pool)
        .await
        .map_err(db_error("save fragment"))?;

        Ok(())
    }

    async fn get_fragment(
        &self,
        book_id: &str,
        fragment_id: &str,
    ) -> Result<Option<Fragment>, StorageError> {
        let pool = self.pool().await?;
        let data: Option<String> =
            sqlx::query_scalar("SELECT data FROM fragments WHERE book_id = ? AND id = ?")
                .bind(book_id)
                .bind(fragment_id)
                .fetch_optional(&pool)
                .await
                .map_err(db_error("get fragment"))?;

        data.as_deref().map(decode).transpose()
    }

    async fn list_fragments(&self, book_id: &str) -> Result<Vec<Fragment>, StorageError> {
        let pool = self.pool().await?;
        let rows: Vec<String> = sqlx::query_scalar(
            "SELECT data FROM fragments WHERE book_id = ? ORDER BY created_at DESC, id",
        )
        .bind(book_id)
        .fetch_all(&pool)
        .await
        .map_err(db_error("list fragments"))?;

        decode_all(rows)
    }

    async fn delete_fragment(&self, book_id: &str, fragment_id: &str) -> Result<(), StorageError> {
        let pool = self.pool().await?;
        sqlx::query("DELETE FROM fragments WHERE book_id = ? AND id = ?")
            .bind(book_id)
            .bind(fragment_id)
            .execute(&pool)
            .await
            .map_err(db_error("delete fragment"))?;
        Ok(())
    }

    async fn save_ai_config(
        &self,
        provider: &str,
        config: &AiProviderConfig,
    ) -> Result<(), StorageError> {
        let pool = self.pool().await?;
        sqlx::query(
            r#"
            INSERT INTO ai_configs (provider, config, updated_at)
            VALUES (?, ?, ?)
            ON DUPLICATE KEY UPDATE
                config = VALUES(config),
                updated_at = VALUES(updated_at)
            "#,
        )
        .bind(provider)
        .bind(encode(config)?)
        .bind(sort_key(&chrono::Utc::now()))
        .execute(&pool)
        .await
        .map_err(db_error("save AI config"))?;

        Ok(())
    }

    async fn get_ai_config(&self, provider: &str) -> Result<Option<AiProviderConfig>, StorageError> {
        let pool = self.pool().await?;
        let data: Option<String> =
            sqlx::query_scalar("SELECT config FROM ai_configs WHERE provider = ?")
                .bind(provider)
                .fetch_optional(&pool)
                .await
                .map_err(db_error("get AI config"))?;

        data.as_deref().map(decode).transpose()
    }

    async fn list_ai_configs(&self) -> Result<Vec<String>, StorageError> {
        let pool = self.pool().await?;
        sqlx::query_scalar("SELECT provider FROM ai_configs ORDER BY provider")
            .fetch_all(&pool)
            .await
            .map_err(db_error("list AI configs"))
    }

    async fn delete_ai_config(&self, provider: &str) -> Result<(), StorageError> {
        let pool = self.pool().await?;
        sqlx::query("DELETE FROM ai_configs WHERE provider = ?")
            .bind(provider)
            .execute(&pool)
            .await
            .map_err(db_error("delete AI config"))?;
        Ok(())
    }

    async fn clear_all_data(&self) -> Result<(), StorageError> {
        let pool = self.pool().await?;
        let mut tx = pool.begin().await.map_err(db_error("clear data"))?;

        for sql in [
            "DELETE FROM chapters",
            "DELETE FROM fragments",
            "DELETE FROM books",
            "DELETE FROM ai_configs",
        ] {
            sqlx::query(sql)
                .execute(&mut *tx)
                .await
                .map_err(db_error("clear data"))?;
        }

        tx.commit().await.map_err(db_error("clear data"))?;
        tracing::info!(endpoint = %self.endpoint(), "MySQL data cleared");
        Ok(())
    }
}
