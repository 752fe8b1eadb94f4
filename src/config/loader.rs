//! Configuration Loader
//!
//! 实现多源配置加载与合并逻辑
//!
//! 优先级（从高到低）：
//! 1. 环境变量
//! 2. 配置文件（config.toml）
//! 3. 默认值

use config::{Config, ConfigError as ConfigCrateError, Environment, File};
use std::path::Path;
use thiserror::Error;

use super::types::AppConfig;

/// 配置加载错误
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(String),

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

impl From<ConfigCrateError> for ConfigError {
    fn from(err: ConfigCrateError) -> Self {
        ConfigError::LoadError(err.to_string())
    }
}

/// 配置文件搜索路径
const CONFIG_FILE_NAMES: &[&str] = &["config", "config.local"];

/// 加载应用配置
///
/// 按优先级从高到低合并配置：
/// 1. 环境变量（前缀 `QUILLBOX_`，层级分隔符 `__`）
/// 2. 配置文件（config.toml 或 config.local.toml）
/// 3. 默认值
///
/// # 环境变量示例
/// - `QUILLBOX_STORE__CONFIG_PATH=/etc/quillbox/database.toml`
/// - `QUILLBOX_LOCAL__PATH=/data/local.sled`
/// - `QUILLBOX_ENVIRONMENT__RESTRICTED=true`
/// - `QUILLBOX_POOL__MAX_CONNECTIONS=10`
pub fn load_config() -> Result<AppConfig, ConfigError> {
    load_config_from_path(None)
}

/// 从指定路径加载配置
///
/// # 参数
/// - `config_path` - 可选的配置文件路径，如果为 None 则使用默认搜索路径
pub fn load_config_from_path(config_path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    let mut builder = Config::builder();

    // 1. 默认值（最低优先级）
    builder = builder
        .set_default("store.config_path", "data/database.toml")?
        .set_default("local.path", "data/local.sled")?
        .set_default("local.temporary", false)?
        .set_default("environment.restricted", false)?
        .set_default("environment.fallback", true)?
        .set_default("environment.connect_probe", false)?
        .set_default("pool.max_connections", 5)?
        .set_default("pool.acquire_timeout_secs", 30)?
        .set_default("log.level", "info")?;

    // 2. 配置文件
    if let Some(path) = config_path {
        builder = builder.add_source(File::from(path).required(true));
    } else {
        for name in CONFIG_FILE_NAMES {
            builder = builder.add_source(File::with_name(name).required(false));
        }
    }

    // 3. 环境变量（最高优先级），例如 QUILLBOX_POOL__MAX_CONNECTIONS=10
    builder = builder.add_source(
        Environment::with_prefix("QUILLBOX")
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder.build()?;

    let app_config: AppConfig = config.try_deserialize().map_err(|e| {
        ConfigError::ParseError(format!("Failed to deserialize config: {}", e))
    })?;

    validate_config(&app_config)?;

    Ok(app_config)
}

/// 验证配置有效性
fn validate_config(config: &AppConfig) -> Result<(), ConfigError> {
    if config.store.config_path.as_os_str().is_empty() {
        return Err(ConfigError::ValidationError(
            "Database config path cannot be empty".to_string(),
        ));
    }

    if !config.local.temporary && config.local.path.as_os_str().is_empty() {
        return Err(ConfigError::ValidationError(
            "Local storage path cannot be empty".to_string(),
        ));
    }

    if config.pool.max_connections == 0 {
        return Err(ConfigError::ValidationError(
            "Pool max_connections cannot be 0".to_string(),
        ));
    }

    if config.pool.acquire_timeout_secs == 0 {
        return Err(ConfigError::ValidationError(
            "Pool acquire_timeout_secs cannot be 0".to_string(),
        ));
    }

    if config.log.level.trim().is_empty() {
        return Err(ConfigError::ValidationError(
            "Log level cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// 打印配置信息（用于启动时日志）
pub fn print_config(config: &AppConfig) {
    tracing::info!("=== Application Configuration ===");
    tracing::info!("Database Config File: {:?}", config.store.config_path);
    if config.local.temporary {
        tracing::info!("Local Storage: temporary");
    } else {
        tracing::info!("Local Storage: {:?}", config.local.path);
    }
    tracing::info!("Restricted Environment: {}", config.environment.restricted);
    tracing::info!("Fallback To Local: {}", config.environment.fallback);
    if config.environment.fallback {
        tracing::info!("Connect Probe: {}", config.environment.connect_probe);
    }
    tracing::info!("Pool Max Connections: {}", config.pool.max_connections);
    tracing::info!("Pool Acquire Timeout: {}s", config.pool.acquire_timeout_secs);
    tracing::info!("Log Level: {}", config.log.level);
    tracing::info!("=================================");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    #[test]
    fn test_validation_passes_for_valid_config() {
        let config = AppConfig::default();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validation_error_for_zero_pool() {
        let mut config = AppConfig::default();
        config.pool.max_connections = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validation_error_for_zero_timeout() {
        let mut config = AppConfig::default();
        config.pool.acquire_timeout_secs = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_temporary_local_needs_no_path() {
        let mut config = AppConfig::default();
        config.local.path = PathBuf::new();
        assert!(validate_config(&config).is_err());

        config.local.temporary = true;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_load_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("quillbox.toml");
        std::fs::write(
            &path,
            r#"
[environment]
restricted = true

[pool]
max_connections = 2

[log]
level = "debug"
"#,
        )
        .unwrap();

        let config = load_config_from_path(Some(&path)).unwrap();
        assert!(config.environment.restricted);
        assert_eq!(config.pool.max_connections, 2);
        assert_eq!(config.pool.acquire_timeout_secs, 30);
        assert_eq!(config.log.level, "debug");
        assert_eq!(config.local.path, PathBuf::from("data/local.sled"));
    }
}
