//! Database Config - 后端连接参数
//!
//! 按 `type` 标记的联合类型，同一时刻只有一个处于激活状态。
//! 它由 ConfigStore 独立于存储后端持久化。

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::{BackendKind, StorageError};

/// MongoDB 连接参数
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MongoConfig {
    pub connection_string: String,
    pub database_name: String,
    /// MongoDB Atlas 托管实例
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_atlas: Option<bool>,
}

/// MySQL 连接参数
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MySqlConfig {
    pub host: String,
    #[serde(default = "default_mysql_port")]
    pub port: u16,
    pub username: String,
    #[serde(default)]
    pub password: String,
    pub database: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssl: Option<bool>,
}

fn default_mysql_port() -> u16 {
    3306
}

/// SQL Server 连接参数
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SqlServerConfig {
    pub server: String,
    #[serde(default = "default_sqlserver_port")]
    pub port: u16,
    pub username: String,
    #[serde(default)]
    pub password: String,
    pub database: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encrypt: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trust_server_certificate: Option<bool>,
}

fn default_sqlserver_port() -> u16 {
    1433
}

/// SQLite 连接参数
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SqliteConfig {
    pub file_path: PathBuf,
}

/// 数据库配置
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DatabaseConfig {
    #[default]
    Local,
    Mongodb(MongoConfig),
    Mysql(MySqlConfig),
    Sqlserver(SqlServerConfig),
    Sqlite(SqliteConfig),
}

impl DatabaseConfig {
    pub fn kind(&self) -> BackendKind {
        match self {
            DatabaseConfig::Local => BackendKind::Local,
            DatabaseConfig::Mongodb(_) => BackendKind::Mongodb,
            DatabaseConfig::Mysql(_) => BackendKind::Mysql,
            DatabaseConfig::Sqlserver(_) => BackendKind::Sqlserver,
            DatabaseConfig::Sqlite(_) => BackendKind::Sqlite,
        }
    }

    /// 检查必填连接参数
    pub fn validate(&self) -> Result<(), StorageError> {
        match self {
            DatabaseConfig::Local => Ok(()),
            DatabaseConfig::Mongodb(c) => c.validate(),
            DatabaseConfig::Mysql(c) => c.validate(),
            DatabaseConfig::Sqlserver(c) => c.validate(),
            DatabaseConfig::Sqlite(c) => c.validate(),
        }
    }
}

fn require(value: &str, field: &str, kind: BackendKind) -> Result<(), StorageError> {
    if value.trim().is_empty() {
        return Err(StorageError::InvalidConfig(format!(
            "{} requires a non-empty {}",
            kind, field
        )));
    }
    Ok(())
}

impl MongoConfig {
    pub fn validate(&self) -> Result<(), StorageError> {
        require(&self.connection_string, "connectionString", BackendKind::Mongodb)?;
        require(&self.database_name, "databaseName", BackendKind::Mongodb)
    }
}

impl MySqlConfig {
    pub fn validate(&self) -> Result<(), StorageError> {
        require(&self.host, "host", BackendKind::Mysql)?;
        require(&self.username, "username", BackendKind::Mysql)?;
        require(&self.database, "database", BackendKind::Mysql)
    }
}

impl SqlServerConfig {
    pub fn validate(&self) -> Result<(), StorageError> {
        require(&self.server, "server", BackendKind::Sqlserver)?;
        require(&self.username, "username", BackendKind::Sqlserver)?;
        require(&self.database, "database", BackendKind::Sqlserver)
    }
}

impl SqliteConfig {
    pub fn validate(&self) -> Result<(), StorageError> {
        require(&self.file_path.to_string_lossy(), "filePath", BackendKind::Sqlite)
    }
}
