//! Driver Factory

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::OnceCell;

use crate::application::ports::{
    BackendCapabilities, BackendFactory, BackendKind, DatabaseConfig, StorageBackend,
    StorageError,
};
use crate::infrastructure::persistence::{
    LocalStoreConfig, MongoBackend, MySqlBackend, PoolSettings, SledLocalBackend, SqlServerBackend,
    SqliteBackend,
};

/// 可选后端的说明
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SupportedBackend {
    pub kind: BackendKind,
    pub name: &'static str,
    pub description: &'static str,
}

fn describe(kind: BackendKind) -> &'static str {
    match kind {
        BackendKind::Local => "Embedded local store, suited to a single user",
        BackendKind::Mongodb => "MongoDB, including the Atlas free tier",
        BackendKind::Mysql => "MySQL server",
        BackendKind::Sqlserver => "Microsoft SQL Server",
        BackendKind::Sqlite => "Lightweight single-file database",
    }
}

/// 严格工厂：能力描述之外的类型返回 `Unavailable`，配置不完整返回 `InvalidConfig`
///
/// 本地存储在同一个工厂内只打开一次（sled 目录带文件锁）。
pub struct DriverFactory {
    capabilities: BackendCapabilities,
    local: LocalStoreConfig,
    pool: PoolSettings,
    local_backend: OnceCell<Arc<SledLocalBackend>>,
}

impl DriverFactory {
    pub fn new(capabilities: BackendCapabilities, local: LocalStoreConfig) -> Self {
        Self {
            capabilities,
            local,
            pool: PoolSettings::default(),
            local_backend: OnceCell::new(),
        }
    }

    pub fn with_pool_settings(mut self, pool: PoolSettings) -> Self {
        self.pool = pool;
        self
    }

    /// 当前环境可选的后端
    pub fn supported_backends(&self) -> Vec<SupportedBackend> {
        self.capabilities
            .kinds()
            .map(|kind| SupportedBackend {
                kind,
                name: kind.display_name(),
                description: describe(kind),
            })
            .collect()
    }

    /// 共享的本地存储后端
    pub async fn local(&self) -> Result<Arc<SledLocalBackend>, StorageError> {
        self.local_backend
            .get_or_try_init(|| async { SledLocalBackend::open(&self.local).map(Arc::new) })
            .await
            .cloned()
    }
}

#[async_trait]
impl BackendFactory for DriverFactory {
    async fn create(
        &self,
        config: &DatabaseConfig,
    ) -> Result<Arc<dyn StorageBackend>, StorageError> {
        let kind = config.kind();
        if !self.capabilities.supports(kind) {
            return Err(StorageError::Unavailable(kind));
        }

        let backend: Arc<dyn StorageBackend> = match config {
            DatabaseConfig::Local => self.local().await?,
            DatabaseConfig::Mongodb(c) => Arc::new(MongoBackend::new(c.clone(), self.pool)?),
            DatabaseConfig::Mysql(c) => Arc::new(MySqlBackend::new(c.clone(), self.pool)?),
            DatabaseConfig::Sqlserver(c) => {
                Arc::new(SqlServerBackend::new(c.clone(), self.pool)?)
            }
            DatabaseConfig::Sqlite(c) => Arc::new(SqliteBackend::new(c.clone(), self.pool)?),
        };

        tracing::debug!(backend = %kind, "Storage backend created");
        Ok(backend)
    }

    fn capabilities(&self) -> &BackendCapabilities {
        &self.capabilities
    }
}
