//! SQL 行编码
//!
//! 关系型后端把完整记录以 JSON 存在 `data` 列，另存少量索引列用于过滤和排序。

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::application::ports::{BackendKind, StorageError};

pub fn encode<T: Serialize>(record: &T) -> Result<String, StorageError> {
    Ok(serde_json::to_string(record)?)
}

pub fn decode<T: DeserializeOwned>(data: &str) -> Result<T, StorageError> {
    Ok(serde_json::from_str(data)?)
}

pub fn decode_all<T: DeserializeOwned>(rows: Vec<String>) -> Result<Vec<T>, StorageError> {
    rows.iter().map(|data| decode(data)).collect()
}

/// 排序列使用微秒时间戳，避免 RFC3339 文本按字典序比较出错
pub fn sort_key(timestamp: &DateTime<Utc>) -> i64 {
    timestamp.timestamp_micros()
}

fn sqlx_code(err: &sqlx::Error) -> Option<String> {
    err.as_database_error()
        .and_then(|db| db.code())
        .map(|code| code.into_owned())
}

/// 映射 sqlx 错误，保留 SQLSTATE
pub fn sqlx_error(backend: BackendKind, op: &'static str, err: sqlx::Error) -> StorageError {
    let code = sqlx_code(&err);
    StorageError::operation(backend, op, err.to_string()).with_code(code)
}

pub fn sqlx_connection_error(backend: BackendKind, err: sqlx::Error) -> StorageError {
    let code = sqlx_code(&err);
    StorageError::connection(backend, err.to_string()).with_code(code)
}
