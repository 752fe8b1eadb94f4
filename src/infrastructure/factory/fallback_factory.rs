//! Fallback Factory - 降级模式
//!
//! 包装一个严格工厂：非本地后端构造失败（或可选的连接探测失败）时记录警告，
//! 改用本地存储。调用方永远拿到一个可用的后端。

use async_trait::async_trait;
use std::sync::Arc;

use crate::application::ports::{
    BackendCapabilities, BackendFactory, BackendKind, DatabaseConfig, StorageBackend,
    StorageError,
};

pub struct FallbackFactory<F> {
    inner: F,
    connect_probe: bool,
}

impl<F: BackendFactory> FallbackFactory<F> {
    pub fn new(inner: F) -> Self {
        Self {
            inner,
            connect_probe: false,
        }
    }

    /// 构造后立即连接一次，连接失败同样降级
    pub fn with_connect_probe(mut self, enabled: bool) -> Self {
        self.connect_probe = enabled;
        self
    }

    pub fn inner(&self) -> &F {
        &self.inner
    }

    async fn try_create(
        &self,
        config: &DatabaseConfig,
    ) -> Result<Arc<dyn StorageBackend>, StorageError> {
        let backend = self.inner.create(config).await?;
        if self.connect_probe && config.kind() != BackendKind::Local {
            backend.connect().await?;
        }
        Ok(backend)
    }
}

#[async_trait]
impl<F: BackendFactory> BackendFactory for FallbackFactory<F> {
    async fn create(
        &self,
        config: &DatabaseConfig,
    ) -> Result<Arc<dyn StorageBackend>, StorageError> {
        if config.kind() == BackendKind::Local {
            return self.inner.create(config).await;
        }

        match self.try_create(config).await {
            Ok(backend) => Ok(backend),
            Err(e) => {
                tracing::warn!(
                    requested = %config.kind(),
                    error = %e,
                    "Storage backend unavailable, falling back to local storage"
                );
                self.inner.create(&DatabaseConfig::Local).await
            }
        }
    }

    fn capabilities(&self) -> &BackendCapabilities {
        self.inner.capabilities()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::{MongoConfig, MySqlConfig, SqliteConfig};
    use crate::infrastructure::factory::DriverFactory;
    use crate::infrastructure::persistence::{LocalStoreConfig, PoolSettings};
    use std::time::Duration;
    use tempfile::TempDir;

    fn unreachable_mongo() -> DatabaseConfig {
        DatabaseConfig::Mongodb(MongoConfig {
            connection_string: "mongodb://127.0.0.1:1/?serverSelectionTimeoutMS=500".to_string(),
            database_name: "novels".to_string(),
            is_atlas: None,
        })
    }

    fn factory(capabilities: BackendCapabilities) -> FallbackFactory<DriverFactory> {
        FallbackFactory::new(
            DriverFactory::new(capabilities, LocalStoreConfig::Temporary).with_pool_settings(
                PoolSettings {
                    max_connections: 1,
                    acquire_timeout: Duration::from_secs(2),
                },
            ),
        )
    }

    #[tokio::test]
    async fn test_unreachable_mongo_is_returned_without_probe() {
        let factory = factory(BackendCapabilities::all());
        let backend = factory.create(&unreachable_mongo()).await.unwrap();
        assert_eq!(backend.kind(), BackendKind::Mongodb);

        let result = backend.test_connection().await;
        assert!(!result.success);
    }

    #[tokio::test]
    async fn test_restricted_environment_degrades_to_local() {
        let factory = factory(BackendCapabilities::local_only());
        let backend = factory.create(&unreachable_mongo()).await.unwrap();
        assert_eq!(backend.kind(), BackendKind::Local);

        let result = backend.test_connection().await;
        assert!(result.success, "{}", result.message);
    }

    #[tokio::test]
    async fn test_invalid_config_degrades_to_local() {
        let factory = factory(BackendCapabilities::all());
        let config = DatabaseConfig::Mysql(MySqlConfig {
            host: String::new(),
            port: 3306,
            username: "writer".to_string(),
            password: String::new(),
            database: "novels".to_string(),
            ssl: None,
        });
        let backend = factory.create(&config).await.unwrap();
        assert_eq!(backend.kind(), BackendKind::Local);
    }

    #[tokio::test]
    async fn test_connect_probe_degrades_unreachable_backend() {
        let factory = factory(BackendCapabilities::all()).with_connect_probe(true);
        let backend = factory.create(&unreachable_mongo()).await.unwrap();
        assert_eq!(backend.kind(), BackendKind::Local);
    }

    #[tokio::test]
    async fn test_reachable_backend_passes_probe() {
        let dir = TempDir::new().unwrap();
        let factory = factory(BackendCapabilities::all()).with_connect_probe(true);
        let config = DatabaseConfig::Sqlite(SqliteConfig {
            file_path: dir.path().join("probe.db"),
        });
        let backend = factory.create(&config).await.unwrap();
        assert_eq!(backend.kind(), BackendKind::Sqlite);
        assert!(backend.list_books().await.unwrap().is_empty());
    }
}
