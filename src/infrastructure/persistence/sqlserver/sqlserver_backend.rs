//! SQL Server Storage Backend
//!
//! 单连接（tiberius `Client`）放在互斥锁后面，所有语句串行执行。
//! Upsert 使用 `MERGE ... WITH (HOLDLOCK)`，级联删除在一个批次内用事务完成。

use async_trait::async_trait;
use tiberius::{AuthMethod, Client, Config, EncryptionLevel, ToSql};
use tokio::net::TcpStream;
use tokio::sync::{MappedMutexGuard, Mutex, MutexGuard};
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};

use crate::application::ports::{
    BackendKind, ConnectionTest, SqlServerConfig, StorageBackend, StorageError,
};
use crate::domain::{AiProviderConfig, Book, Chapter, Fragment};
use crate::infrastructure::persistence::row_codec::{decode, decode_all, encode, sort_key};
use crate::infrastructure::persistence::PoolSettings;

const KIND: BackendKind = BackendKind::Sqlserver;

type TdsClient = Client<Compat<TcpStream>>;

const CREATE_TABLES: &str = r#"
IF NOT EXISTS (SELECT * FROM sysobjects WHERE name = 'books' AND xtype = 'U')
CREATE TABLE books (
    id NVARCHAR(255) COLLATE Latin1_General_BIN2 NOT NULL PRIMARY KEY,
    title NVARCHAR(500) NOT NULL,
    data NVARCHAR(MAX) NOT NULL,
    created_at BIGINT NOT NULL,
    updated_at BIGINT NOT NULL
);

IF NOT EXISTS (SELECT * FROM sysobjects WHERE name = 'chapters' AND xtype = 'U')
CREATE TABLE chapters (
    book_id NVARCHAR(255) COLLATE Latin1_General_BIN2 NOT NULL,
    id NVARCHAR(255) COLLATE Latin1_General_BIN2 NOT NULL,
    title NVARCHAR(500) NOT NULL,
    kind NVARCHAR(20) NOT NULL CHECK (kind IN ('volume', 'chapter')),
    parent_id NVARCHAR(255) NULL,
    order_index BIGINT NOT NULL DEFAULT 0,
    data NVARCHAR(MAX) NOT NULL,
    created_at BIGINT NOT NULL,
    updated_at BIGINT NOT NULL,
    PRIMARY KEY (book_id, id)
);

IF NOT EXISTS (SELECT * FROM sysobjects WHERE name = 'fragments' AND xtype = 'U')
CREATE TABLE fragments (
    book_id NVARCHAR(255) COLLATE Latin1_General_BIN2 NOT NULL,
    id NVARCHAR(255) COLLATE Latin1_General_BIN2 NOT NULL,
    title NVARCHAR(500) NOT NULL,
    data NVARCHAR(MAX) NOT NULL,
    created_at BIGINT NOT NULL,
    updated_at BIGINT NOT NULL,
    PRIMARY KEY (book_id, id)
);

IF NOT EXISTS (SELECT * FROM sysobjects WHERE name = 'ai_configs' AND xtype = 'U')
CREATE TABLE ai_configs (
    provider NVARCHAR(255) COLLATE Latin1_General_BIN2 NOT NULL PRIMARY KEY,
    config NVARCHAR(MAX) NOT NULL,
    updated_at BIGINT NOT NULL
);
"#;

fn tds_code(err: &tiberius::error::Error) -> Option<String> {
    match err {
        tiberius::error::Error::Server(token) => Some(token.code().to_string()),
        _ => None,
    }
}

fn tds_error(op: &'static str) -> impl Fn(tiberius::error::Error) -> StorageError {
    move |e| {
        let code = tds_code(&e);
        StorageError::operation(KIND, op, e.to_string()).with_code(code)
    }
}

fn tds_connection_error(e: tiberius::error::Error) -> StorageError {
    let code = tds_code(&e);
    StorageError::connection(KIND, e.to_string()).with_code(code)
}

/// SQL Server 存储后端
pub struct SqlServerBackend {
    config: SqlServerConfig,
    settings: PoolSettings,
    client: Mutex<Option<TdsClient>>,
}

impl SqlServerBackend {
    pub fn new(config: SqlServerConfig, settings: PoolSettings) -> Result<Self, StorageError> {
        config.validate()?;
        Ok(Self {
            config,
            settings,
            client: Mutex::new(None),
        })
    }

    fn tds_config(&self) -> Config {
        let mut config = Config::new();
        config.host(&self.config.server);
        config.port(self.config.port);
        config.authentication(AuthMethod::sql_server(
            &self.config.username,
            &self.config.password,
        ));
        config.database(&self.config.database);
        config.encryption(match self.config.encrypt {
            Some(false) => EncryptionLevel::NotSupported,
            _ => EncryptionLevel::Required,
        });
        if self.config.trust_server_certificate.unwrap_or(false) {
            config.trust_cert();
        }
        config
    }

    fn endpoint(&self) -> String {
        format!(
            "{}:{}/{}",
            self.config.server, self.config.port, self.config.database
        )
    }

    async fn open_client(&self) -> Result<TdsClient, StorageError> {
        let config = self.tds_config();

        let tcp = tokio::time::timeout(
            self.settings.acquire_timeout,
            TcpStream::connect(config.get_addr()),
        )
        .await
        .map_err(|_| StorageError::connection(KIND, "timed out opening TCP connection"))?
        .map_err(|e| StorageError::connection(KIND, e.to_string()))?;
        tcp.set_nodelay(true)
            .map_err(|e| StorageError::connection(KIND, e.to_string()))?;

        let mut client = tokio::time::timeout(
            self.settings.acquire_timeout,
            Client::connect(config, tcp.compat_write()),
        )
        .await
        .map_err(|_| StorageError::connection(KIND, "timed out during login"))?
        .map_err(tds_connection_error)?;

        client
            .simple_query(CREATE_TABLES)
            .await
            .map_err(tds_error("create tables"))?
            .into_results()
            .await
            .map_err(tds_error("create tables"))?;

        Ok(client)
    }

    async fn client(&self) -> Result<MappedMutexGuard<'_, TdsClient>, StorageError> {
        MutexGuard::try_map(self.client.lock().await, |slot| slot.as_mut())
            .map_err(|_| StorageError::NotConnected(KIND))
    }

    /// 执行查询并取第一列字符串
    async fn query_strings(
        &self,
        op: &'static str,
        sql: &str,
        params: &[&dyn ToSql],
    ) -> Result<Vec<String>, StorageError> {
        let mut client = self.client().await?;
        let rows = client
            .query(sql, params)
            .await
            .map_err(tds_error(op))?
            .into_first_result()
            .await
            .map_err(tds_error(op))?;

        rows.iter()
            .map(|row| {
                row.try_get::<&str, _>(0)
                    .map_err(tds_error(op))?
                    .map(str::to_owned)
                    .ok_or_else(|| StorageError::operation(KIND, op, "unexpected NULL column"))
            })
            .collect()
    }

    async fn query_optional(
        &self,
        op: &'static str,
        sql: &str,
        params: &[&dyn ToSql],
    ) -> Result<Option<String>, StorageError> {
        Ok(self.query_strings(op, sql, params).await?.into_iter().next())
    }

    async fn execute(
        &self,
        op: &'static str,
        sql: &str,
        params: &[&dyn ToSql],
    ) -> Result<(), StorageError> {
        let mut client = self.client().await?;
        client.execute(sql, params).await.map_err(tds_error(op))?;
        Ok(())
    }
}

#[async_trait]
impl StorageBackend for SqlServerBackend {
    fn kind(&self) -> BackendKind {
        KIND
    }

    async fn connect(&self) -> Result<(), StorageError> {
        let mut guard = self.client.lock().await;
        if guard.is_some() {
            return Ok(());
        }

        let client = self.open_client().await?;
        tracing::info!(endpoint = %self.endpoint(), "SQL Server connected");
        *guard = Some(client);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), StorageError> {
        if let Some(client) = self.client.lock().await.take() {
            client
                .close()
                .await
                .map_err(|e| StorageError::connection(KIND, e.to_string()))?;
            tracing::info!(endpoint = %self.endpoint(), "SQL Server disconnected");
        }
        Ok(())
    }

    async fn test_connection(&self) -> ConnectionTest {
        if let Err(e) = self.connect().await {
            return ConnectionTest::failed(format!("SQL Server connection test failed: {}", e));
        }
        match self.query_strings("ping", "SELECT 'ok'", &[]).await {
            Ok(_) => ConnectionTest::ok("SQL Server connection is healthy"),
            Err(e) => ConnectionTest::failed(format!("SQL Server connection test failed: {}", e)),
        }
    }

    async fn save_book(&self, book: &Book) -> Result<(), StorageError> {
        let data = encode(book)?;
        let created_at = sort_key(&book.created_at);
        let updated_at = sort_key(&book.updated_at);
        self.execute(
            "save book",
            r#"
            MERGE books WITH (HOLDLOCK) AS target
            USING (SELECT @P1 AS id) AS source ON target.id = source.id
            WHEN MATCHED THEN
                UPDATE SET title = @P2, data = @P3, created_at = @P4, updated_at = @P5
            WHEN NOT MATCHED THEN
                INSERT (id, title, data, created_at, updated_at)
                VALUES (@P1, @P2, @P3, @P4, @P5);
            "#,
            &[&book.id, &book.title, &data, &created_at, &updated_at],
        )
        .await
    }

    async fn get_book(&self, book_id: &str) -> Result<Option<Book>, StorageError> {
        self.query_optional("get book", "SELECT data FROM books WHERE id = @P1", &[&book_id])
            .await?
            .as_deref()
            .map(decode)
            .transpose()
    }

    async fn list_books(&self) -> Result<Vec<Book>, StorageError> {
        let rows = self
            .query_strings(
                "list books",
                "SELECT data FROM books ORDER BY updated_at DESC, id",
                &[],
            )
            .await?;
        decode_all(rows)
    }

    async fn remove_book_record(&self, book_id: &str) -> Result<(), StorageError> {
        self.execute("delete book", "DELETE FROM books WHERE id = @P1", &[&book_id])
            .await
    }

    async fn delete_book(&self, book_id: &str) -> Result<(), StorageError> {
        self.execute(
            "delete book",
            r#"
            SET XACT_ABORT ON;
            BEGIN TRANSACTION;
            DELETE FROM chapters WHERE book_id = @P1;
            DELETE FROM fragments WHERE book_id = @P1;
            DELETE FROM books WHERE id = @P1;
            COMMIT TRANSACTION;
            "#,
            &[&book_id],
        )
        .await
    }

    async fn save_chapter(&self, book_id: &str, chapter: &Chapter) -> Result<(), StorageError> {
        let chapter = chapter.scoped_to(book_id);
        let data = encode(&chapter)?;
        let kind = chapter.kind.as_str();
        let created_at = sort_key(&chapter.created_at);
        let updated_at = sort_key(&chapter.updated_at);
        self.execute(
            "save chapter",
            r#"
            MERGE chapters WITH (HOLDLOCK) AS target
            USING (SELECT @P1 AS book_id, @P2 AS id) AS source
                ON target.book_id = source.book_id AND target.id = source.id
            WHEN MATCHED THEN
                UPDATE SET title = @P3, kind = @P4, parent_id = @P5, order_index = @P6,
                           data = @P7, created_at = @P8, updated_at = @P9
            WHEN NOT MATCHED THEN
                INSERT (book_id, id, title, kind, parent_id, order_index, data, created_at, updated_at)
                VALUES (@P1, @P2, @P3, @P4, @P5, @P6, @P7, @P8, @P9);
            "#,
            &[
                &chapter.book_id,
                &chapter.id,
                &chapter.title,
                &kind,
                &chapter.parent_id,
                &chapter.order_index,
                &data,
                &created_at,
                &updated_at,
            ],
        )
        .await
    }

    async fn get_chapter(
        &self,
        book_id: &str,
        chapter_id: &str,
    ) -> Result<Option<Chapter>, StorageError> {
        self.query_optional(
            "get chapter",
            "SELECT data FROM chapters WHERE book_id = @P1 AND id = @P2",
            &[&book_id, &chapter_id],
        )
        .await?
        .as_deref()
        .map(decode)
        .transpose()
    }

    async fn list_chapters(&self, book_id: &str) -> Result<Vec<Chapter>, StorageError> {
        let rows = self
            .query_strings(
                "list chapters",
                "SELECT data FROM chapters WHERE book_id = @P1 ORDER BY order_index, created_at, id",
                &[&book_id],
            )
            .await?;
        decode_all(rows)
    }

    async fn delete_chapter(&self, book_id: &str, chapter_id: &str) -> Result<(), StorageError> {
        self.execute(
            "delete chapter",
            "DELETE FROM chapters WHERE book_id = @P1 AND id = @P2",
            &[&book_id, &chapter_id],
        )
        .await
    }

    async fn save_fragment(&self, book_id: &str, fragment: &Fragment) -> Result<(), StorageError> {
        let fragment = fragment.scoped_to(book_id);
        let data = encode(&fragment)?;
        let created_at = sort_key(&fragment.created_at);
        let updated_at = sort_key(&fragment.updated_at);
        self.execute(
            "save fragment",
            r#"
            MERGE fragments WITH (HOLDLOCK) AS target
            USING (SELECT @P1 AS book_id, @P2 AS id) AS source
                ON target.book_id = source.book_id AND target.id = source.id
            WHEN MATCHED THEN
                UPDATE SET title = @P3, data = @P4, created_at = @P5, updated_at = @P6
            WHEN NOT MATCHED THEN
                INSERT (book_id, id, title, data, created_at, updated_at)
                VALUES (@P1, @P2, @P3, @P4, @P5, @P6);
            "#,
            &[
                &fragment.book_id,
                &fragment.id,
                &fragment.title,
                &data,
                &created_at,
                &updated_at,
            ],
        )
        .await
    }

    async fn get_fragment(
        &self,
        book_id: &str,
        fragment_id: &str,
    ) -> Result<Option<Fragment>, StorageError> {
        self.query_optional(
            "get fragment",
            "SELECT data FROM fragments WHERE book_id = @P1 AND id = @P2",
            &[&book_id, &fragment_id],
        )
        .await?
        .as_deref()
        .map(decode)
        .transpose()
    }

    async fn list_fragments(&self, book_id: &str) -> Result<Vec<Fragment>, StorageError> {
        let rows = self
            .query_strings(
                "list fragments",
                "SELECT data FROM fragments WHERE book_id = @P1 ORDER BY created_at DESC, id",
                &[&book_id],
            )
            .await?;
        decode_all(rows)
    }

    async fn delete_fragment(&self, book_id: &str, fragment_id: &str) -> Result<(), StorageError> {
        self.execute(
            "delete fragment",
            "DELETE FROM fragments WHERE book_id = @P1 AND id = @P2",
            &[&book_id, &fragment_id],
        )
        .await
    }

    async fn save_ai_config(
        &self,
        provider: &str,
        config: &AiProviderConfig,
    ) -> Result<(), StorageError> {
        let data = encode(config)?;
        let updated_at = sort_key(&chrono::Utc::now());
        self.execute(
            "save AI config",
            r#"
            MERGE ai_configs WITH (HOLDLOCK) AS target
            USING (SELECT @P1 AS provider) AS source ON target.provider = source.provider
            WHEN MATCHED THEN
                UPDATE SET config = @P2, updated_at = @P3
            WHEN NOT MATCHED THEN
                INSERT (provider, config, updated_at) VALUES (@P1, @P2, @P3);
            "#,
            &[&provider, &data, &updated_at],
        )
        .await
    }

    async fn get_ai_config(&self, provider: &str) -> Result<Option<AiProviderConfig>, StorageError> {
        self.query_optional(
            "get AI config",
            "SELECT config FROM ai_configs WHERE provider = @P1",
            &[&provider],
        )
        .await?
        .as_deref()
        .map(decode)
        .transpose()
    }

    async fn list_ai_configs(&self) -> Result<Vec<String>, StorageError> {
        self.query_strings(
            "list AI configs",
            "SELECT provider FROM ai_configs ORDER BY provider",
            &[],
        )
        .await
    }

    async fn delete_ai_config(&self, provider: &str) -> Result<(), StorageError> {
        self.execute(
            "delete AI config",
            "DELETE FROM ai_configs WHERE provider = @P1",
            &[&provider],
        )
        .await
    }

    async fn clear_all_data(&self) -> Result<(), StorageError> {
        self.execute(
            "clear data",
            r#"
            SET XACT_ABORT ON;
            BEGIN TRANSACTION;
            DELETE FROM chapters;
            DELETE FROM fragments;
            DELETE FROM books;
            DELETE FROM ai_configs;
            COMMIT TRANSACTION;
            "#,
            &[],
        )
        .await?;
        tracing::info!(endpoint = %self.endpoint(), "SQL Server data cleared");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn unreachable_config() -> SqlServerConfig {
        SqlServerConfig {
            server: "127.0.0.1".to_string(),
            port: 1,
            username: "sa".to_string(),
            password: "secret".to_string(),
            database: "novels".to_string(),
            encrypt: Some(false),
            trust_server_certificate: Some(true),
        }
    }

    fn quick_settings() -> PoolSettings {
        PoolSettings {
            max_connections: 1,
            acquire_timeout: Duration::from_secs(2),
        }
    }

    #[test]
    fn test_key_columns_use_binary_collation() {
        for column in ["id NVARCHAR", "book_id NVARCHAR", "provider NVARCHAR"] {
            for line in CREATE_TABLES.lines().filter(|l| l.trim_start().starts_with(column)) {
                assert!(line.contains("COLLATE Latin1_General_BIN2"), "{}", line);
            }
        }
    }

    #[test]
    fn test_rejects_missing_database() {
        let mut config = unreachable_config();
        config.database = String::new();
        assert!(matches!(
            SqlServerBackend::new(config, PoolSettings::default()),
            Err(StorageError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_tds_config_targets_configured_endpoint() {
        let backend = SqlServerBackend::new(unreachable_config(), quick_settings()).unwrap();
        assert_eq!(backend.tds_config().get_addr(), "127.0.0.1:1");
    }

    #[tokio::test]
    async fn test_unreachable_host_reports_failure() {
        let backend = SqlServerBackend::new(unreachable_config(), quick_settings()).unwrap();
        let result = backend.test_connection().await;
        assert!(!result.success);
        assert!(result.message.contains("SQL Server"));
    }

    #[tokio::test]
    async fn test_operations_before_connect_fail() {
        let backend = SqlServerBackend::new(unreachable_config(), quick_settings()).unwrap();
        assert!(matches!(
            backend.get_book("b1").await,
            Err(StorageError::NotConnected(BackendKind::Sqlserver))
        ));
        backend.disconnect().await.unwrap();
    }
}
