//! Backend Factory Port - 按配置构造存储后端

use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::Arc;

use super::{BackendKind, DatabaseConfig, StorageBackend, StorageError};

/// 运行环境能力描述：当前可用的后端类型
///
/// 受限环境（Web 构建）没有原生驱动，只能使用本地存储。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendCapabilities {
    available: BTreeSet<BackendKind>,
}

impl BackendCapabilities {
    pub fn all() -> Self {
        Self {
            available: BackendKind::ALL.into_iter().collect(),
        }
    }

    pub fn local_only() -> Self {
        Self::only([BackendKind::Local])
    }

    /// 本地存储总是可用
    pub fn only(kinds: impl IntoIterator<Item = BackendKind>) -> Self {
        let mut available: BTreeSet<BackendKind> = kinds.into_iter().collect();
        available.insert(BackendKind::Local);
        Self { available }
    }

    pub fn supports(&self, kind: BackendKind) -> bool {
        self.available.contains(&kind)
    }

    pub fn kinds(&self) -> impl Iterator<Item = BackendKind> + '_ {
        self.available.iter().copied()
    }
}

impl Default for BackendCapabilities {
    fn default() -> Self {
        Self::all()
    }
}

/// Backend Factory Port
///
/// 返回的后端尚未连接，由调用方负责 `connect()`。
#[async_trait]
pub trait BackendFactory: Send + Sync {
    async fn create(&self, config: &DatabaseConfig)
        -> Result<Arc<dyn StorageBackend>, StorageError>;

    fn capabilities(&self) -> &BackendCapabilities;
}

#[async_trait]
impl<F: BackendFactory + ?Sized> BackendFactory for Arc<F> {
    async fn create(
        &self,
        config: &DatabaseConfig,
    ) -> Result<Arc<dyn StorageBackend>, StorageError> {
        (**self).create(config).await
    }

    fn capabilities(&self) -> &BackendCapabilities {
        (**self).capabilities()
    }
}
