//! 记录反序列化辅助

use serde::{Deserialize, Deserializer};

/// 显式 `null` 按缺省值处理
///
/// 其他后端导出的快照会把可空文本列写成 `null`。
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    let value: Option<T> = Deserialize::deserialize(deserializer)?;
    Ok(value.unwrap_or_default())
}
