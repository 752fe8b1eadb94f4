//! Config Store - 持久化当前激活的 `DatabaseConfig`
//!
//! 数据库配置不能存放在它所描述的后端里，因此单独写入一个 TOML 文件。

use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::application::ports::{BackendFactory, ConnectionTest, DatabaseConfig};

#[derive(Debug, Error)]
pub enum ConfigStoreError {
    #[error("Failed to write database config {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to remove database config {path}: {source}")]
    Remove {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to encode database config: {0}")]
    Encode(#[from] toml::ser::Error),
}

/// 数据库配置存储
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn save(&self, config: &DatabaseConfig) -> Result<(), ConfigStoreError> {
        let content = toml::to_string_pretty(config)?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| ConfigStoreError::Write {
                    path: self.path.clone(),
                    source,
                })?;
        }
        tokio::fs::write(&self.path, content)
            .await
            .map_err(|source| ConfigStoreError::Write {
                path: self.path.clone(),
                source,
            })?;

        tracing::info!(path = %self.path.display(), backend = %config.kind(), "Database config saved");
        Ok(())
    }

    /// 读取配置；文件缺失或损坏时回到本地存储
    pub async fn load(&self) -> DatabaseConfig {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return DatabaseConfig::Local,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Failed to read database config, using local storage");
                return DatabaseConfig::Local;
            }
        };

        match toml::from_str(&content) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Invalid database config, using local storage");
                DatabaseConfig::Local
            }
        }
    }

    pub async fn clear(&self) -> Result<(), ConfigStoreError> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {
                tracing::info!(path = %self.path.display(), "Database config cleared");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(ConfigStoreError::Remove {
                path: self.path.clone(),
                source,
            }),
        }
    }

    /// 用工厂构造后端并测试连接，不返回错误
    pub async fn test_connection(
        &self,
        config: &DatabaseConfig,
        factory: &dyn BackendFactory,
    ) -> ConnectionTest {
        match factory.create(config).await {
            Ok(backend) => backend.test_connection().await,
            Err(e) => ConnectionTest::failed(format!("Connection test failed: {}", e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::{BackendCapabilities, BackendKind, MySqlConfig, SqliteConfig};
    use crate::infrastructure::factory::DriverFactory;
    use crate::infrastructure::persistence::LocalStoreConfig;
    use tempfile::TempDir;

    fn mysql_config() -> DatabaseConfig {
        DatabaseConfig::Mysql(MySqlConfig {
            host: "db.local".to_string(),
            port: 3307,
            username: "writer".to_string(),
            password: "secret".to_string(),
            database: "novels".to_string(),
            ssl: Some(true),
        })
    }

    #[tokio::test]
    async fn test_missing_file_loads_local() {
        let dir = TempDir::new().unwrap();
        let store = ConfigStore::new(dir.path().join("database.toml"));
        assert_eq!(store.load().await, DatabaseConfig::Local);
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let store = ConfigStore::new(dir.path().join("nested").join("database.toml"));

        store.save(&mysql_config()).await.unwrap();
        assert_eq!(store.load().await, mysql_config());

        let written = std::fs::read_to_string(store.path()).unwrap();
        assert!(written.contains("type = \"mysql\""));
    }

    #[tokio::test]
    async fn test_corrupt_file_loads_local() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("database.toml");
        std::fs::write(&path, "type = \"oracle\"").unwrap();

        let store = ConfigStore::new(path);
        assert_eq!(store.load().await, DatabaseConfig::Local);
    }

    #[tokio::test]
    async fn test_clear_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let store = ConfigStore::new(dir.path().join("database.toml"));

        store.save(&DatabaseConfig::Local).await.unwrap();
        store.clear().await.unwrap();
        store.clear().await.unwrap();
        assert!(!store.path().exists());
    }

    #[tokio::test]
    async fn test_connection_through_factory() {
        let dir = TempDir::new().unwrap();
        let store = ConfigStore::new(dir.path().join("database.toml"));
        let factory = DriverFactory::new(
            BackendCapabilities::only([BackendKind::Sqlite]),
            LocalStoreConfig::Temporary,
        );

        let sqlite = DatabaseConfig::Sqlite(SqliteConfig {
            file_path: dir.path().join("novels.db"),
        });
        assert!(store.test_connection(&sqlite, &factory).await.success);

        // MySQL 不在能力范围内，得到失败结果而不是错误
        let result = store.test_connection(&mysql_config(), &factory).await;
        assert!(!result.success);
        assert!(result.message.contains("unavailable"));
    }
}
