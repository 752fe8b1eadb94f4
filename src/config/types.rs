//! Configuration Types
//!
//! 定义所有配置结构体

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::application::ports::BackendCapabilities;
use crate::infrastructure::persistence::{LocalStoreConfig, PoolSettings};

/// 应用主配置
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    /// 数据库配置文件位置
    #[serde(default)]
    pub store: StoreConfig,

    /// 本地存储配置
    #[serde(default)]
    pub local: LocalStorageConfig,

    /// 运行环境
    #[serde(default)]
    pub environment: EnvironmentConfig,

    /// 连接池配置
    #[serde(default)]
    pub pool: PoolConfig,

    /// 日志配置
    #[serde(default)]
    pub log: LogConfig,
}

/// 激活的数据库配置保存在哪里
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// `DatabaseConfig` 的 TOML 文件
    #[serde(default = "default_config_path")]
    pub config_path: PathBuf,
}

fn default_config_path() -> PathBuf {
    PathBuf::from("data/database.toml")
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            config_path: default_config_path(),
        }
    }
}

/// 本地存储配置
#[derive(Debug, Clone, Deserialize)]
pub struct LocalStorageConfig {
    /// sled 数据目录
    #[serde(default = "default_local_path")]
    pub path: PathBuf,

    /// 使用临时存储（进程退出即丢弃）
    #[serde(default)]
    pub temporary: bool,
}

fn default_local_path() -> PathBuf {
    PathBuf::from("data/local.sled")
}

impl Default for LocalStorageConfig {
    fn default() -> Self {
        Self {
            path: default_local_path(),
            temporary: false,
        }
    }
}

impl LocalStorageConfig {
    pub fn store_config(&self) -> LocalStoreConfig {
        if self.temporary {
            LocalStoreConfig::Temporary
        } else {
            LocalStoreConfig::Path(self.path.clone())
        }
    }
}

/// 运行环境配置
#[derive(Debug, Clone, Deserialize)]
pub struct EnvironmentConfig {
    /// 受限环境（无原生驱动），只能使用本地存储
    #[serde(default)]
    pub restricted: bool,

    /// 远程后端不可用时降级到本地存储
    #[serde(default = "default_fallback")]
    pub fallback: bool,

    /// 降级判断时是否先尝试连接
    #[serde(default)]
    pub connect_probe: bool,
}

fn default_fallback() -> bool {
    true
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            restricted: false,
            fallback: default_fallback(),
            connect_probe: false,
        }
    }
}

impl EnvironmentConfig {
    /// 当前环境可用的后端
    pub fn capabilities(&self) -> BackendCapabilities {
        if self.restricted {
            BackendCapabilities::local_only()
        } else {
            BackendCapabilities::all()
        }
    }
}

/// 连接池配置
#[derive(Debug, Clone, Deserialize)]
pub struct PoolConfig {
    /// 最大连接数
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// 建立连接超时（秒）
    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout_secs: u64,
}

fn default_max_connections() -> u32 {
    5
}

fn default_acquire_timeout() -> u64 {
    30
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
            acquire_timeout_secs: default_acquire_timeout(),
        }
    }
}

impl PoolConfig {
    pub fn settings(&self) -> PoolSettings {
        PoolSettings {
            max_connections: self.max_connections,
            acquire_timeout: Duration::from_secs(self.acquire_timeout_secs),
        }
    }
}

/// 日志配置
#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    /// 日志级别
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}
