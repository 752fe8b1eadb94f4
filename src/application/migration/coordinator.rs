//! Migration Coordinator

use serde::Serialize;
use std::sync::Arc;

use super::progress::ProgressReporter;
use super::validation::MigrationValidation;
use super::{MigrationError, MigrationProgress, MigrationStage};
use crate::application::ports::{
    BackendFactory, BackendKind, DatabaseConfig, StorageBackend, StorageError,
};
use crate::domain::SnapshotCounts;

/// 后端之间迁移的总步数
const BETWEEN_BACKENDS_TOTAL: u32 = 5;
/// 与本地存储互迁的总步数
const LOCAL_TRANSFER_TOTAL: u32 = 4;

/// 迁移结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationReport {
    pub source: BackendKind,
    pub target: BackendKind,
    /// 按导出快照统计的迁移数量
    pub migrated: SnapshotCounts,
}

/// 迁移协调器
///
/// 通过工厂按配置构造后端；也可以直接对两个已有后端调用 [`MigrationCoordinator::migrate`]。
pub struct MigrationCoordinator {
    factory: Arc<dyn BackendFactory>,
}

impl MigrationCoordinator {
    pub fn new(factory: Arc<dyn BackendFactory>) -> Self {
        Self { factory }
    }

    /// 从 `source` 全量导出并导入 `target`
    pub async fn migrate<P>(
        &self,
        source: &dyn StorageBackend,
        target: &dyn StorageBackend,
        on_progress: P,
    ) -> Result<MigrationReport, MigrationError>
    where
        P: FnMut(&MigrationProgress) + Send,
    {
        let mut progress = ProgressReporter::new(BETWEEN_BACKENDS_TOTAL, on_progress);
        progress.report(MigrationStage::Start);

        progress.report(MigrationStage::Connect);
        source
            .connect()
            .await
            .map_err(MigrationError::at(MigrationStage::Connect))?;
        if let Err(e) = target.connect().await {
            release(&[source]).await;
            return Err(MigrationError::new(MigrationStage::Connect, e));
        }

        let report = match transfer(source, target, &mut progress).await {
            Ok(report) => report,
            Err(e) => {
                release(&[source, target]).await;
                return Err(e);
            }
        };

        progress.report(MigrationStage::Disconnect);
        disconnect_both(source, target).await?;

        progress.report(MigrationStage::Done);
        Ok(report)
    }

    /// 按两份配置构造后端后迁移
    pub async fn migrate_configs<P>(
        &self,
        source: &DatabaseConfig,
        target: &DatabaseConfig,
        on_progress: P,
    ) -> Result<MigrationReport, MigrationError>
    where
        P: FnMut(&MigrationProgress) + Send,
    {
        let source = self.backend_for(source).await?;
        let target = self.backend_for(target).await?;
        self.migrate(source.as_ref(), target.as_ref(), on_progress)
            .await
    }

    /// 从本地存储迁移到 `target`
    pub async fn migrate_from_local<P>(
        &self,
        target: &DatabaseConfig,
        on_progress: P,
    ) -> Result<MigrationReport, MigrationError>
    where
        P: FnMut(&MigrationProgress) + Send,
    {
        let local = self.backend_for(&DatabaseConfig::Local).await?;
        let target = self.backend_for(target).await?;
        self.transfer_with_local(local.as_ref(), target.as_ref(), target.as_ref(), on_progress)
            .await
    }

    /// 从 `source` 迁移到本地存储
    pub async fn migrate_to_local<P>(
        &self,
        source: &DatabaseConfig,
        on_progress: P,
    ) -> Result<MigrationReport, MigrationError>
    where
        P: FnMut(&MigrationProgress) + Send,
    {
        let source = self.backend_for(source).await?;
        let local = self.backend_for(&DatabaseConfig::Local).await?;
        self.transfer_with_local(source.as_ref(), local.as_ref(), source.as_ref(), on_progress)
            .await
    }

    /// 迁移前检查：两端都能连通，且不是同一种后端
    ///
    /// 问题以文字形式收集，不返回错误。
    pub async fn validate(
        &self,
        source: &dyn StorageBackend,
        target: &dyn StorageBackend,
    ) -> MigrationValidation {
        let mut issues = Vec::new();

        if let Some(issue) = probe("Source", source).await {
            issues.push(issue);
        }
        if let Some(issue) = probe("Target", target).await {
            issues.push(issue);
        }
        if source.kind() == target.kind() {
            issues.push(format!(
                "Source and target are both {}; migration may be unnecessary",
                source.kind()
            ));
        }

        MigrationValidation::from_issues(issues)
    }

    /// 按配置构造后端后做迁移前检查
    pub async fn validate_configs(
        &self,
        source: &DatabaseConfig,
        target: &DatabaseConfig,
    ) -> MigrationValidation {
        let source = match self.backend_for(source).await {
            Ok(backend) => backend,
            Err(e) => return MigrationValidation::from_issues(vec![format!("Source: {}", e.source)]),
        };
        let target = match self.backend_for(target).await {
            Ok(backend) => backend,
            Err(e) => return MigrationValidation::from_issues(vec![format!("Target: {}", e.source)]),
        };
        self.validate(source.as_ref(), target.as_ref()).await
    }

    /// 工厂可能做了降级替换，类型不符时视为不可用，避免迁移到错误的库
    async fn backend_for(
        &self,
        config: &DatabaseConfig,
    ) -> Result<Arc<dyn StorageBackend>, MigrationError> {
        let backend = self
            .factory
            .create(config)
            .await
            .map_err(MigrationError::at(MigrationStage::Start))?;
        if backend.kind() != config.kind() {
            return Err(MigrationError::new(
                MigrationStage::Start,
                StorageError::Unavailable(config.kind()),
            ));
        }
        Ok(backend)
    }

    /// 与本地存储互迁：本地端无需连接，只连接 `remote`
    async fn transfer_with_local<P>(
        &self,
        source: &dyn StorageBackend,
        target: &dyn StorageBackend,
        remote: &dyn StorageBackend,
        on_progress: P,
    ) -> Result<MigrationReport, MigrationError>
    where
        P: FnMut(&MigrationProgress) + Send,
    {
        let mut progress = ProgressReporter::new(LOCAL_TRANSFER_TOTAL, on_progress);
        progress.report(MigrationStage::Start);

        progress.report(MigrationStage::Connect);
        remote
            .connect()
            .await
            .map_err(MigrationError::at(MigrationStage::Connect))?;

        let report = match transfer(source, target, &mut progress).await {
            Ok(report) => report,
            Err(e) => {
                release(&[remote]).await;
                return Err(e);
            }
        };

        remote
            .disconnect()
            .await
            .map_err(MigrationError::at(MigrationStage::Disconnect))?;

        progress.report(MigrationStage::Done);
        Ok(report)
    }
}

/// 导出并导入，上报 Export / Import 两步
async fn transfer<P>(
    source: &dyn StorageBackend,
    target: &dyn StorageBackend,
    progress: &mut ProgressReporter<P>,
) -> Result<MigrationReport, MigrationError>
where
    P: FnMut(&MigrationProgress) + Send,
{
    progress.report(MigrationStage::Export);
    let snapshot = source
        .export_data()
        .await
        .map_err(MigrationError::at(MigrationStage::Export))?;

    progress.report(MigrationStage::Import);
    target
        .import_data(&snapshot)
        .await
        .map_err(MigrationError::at(MigrationStage::Import))?;

    let report = MigrationReport {
        source: source.kind(),
        target: target.kind(),
        migrated: snapshot.counts(),
    };
    tracing::info!(
        source = %report.source,
        target = %report.target,
        books = report.migrated.books,
        chapters = report.migrated.chapters,
        fragments = report.migrated.fragments,
        ai_configs = report.migrated.ai_configs,
        "Data transferred"
    );
    Ok(report)
}

async fn disconnect_both(
    source: &dyn StorageBackend,
    target: &dyn StorageBackend,
) -> Result<(), MigrationError> {
    source
        .disconnect()
        .await
        .map_err(MigrationError::at(MigrationStage::Disconnect))?;
    target
        .disconnect()
        .await
        .map_err(MigrationError::at(MigrationStage::Disconnect))
}

/// 出错后尽力断开，断开失败只记录日志
async fn release(backends: &[&dyn StorageBackend]) {
    for backend in backends {
        if let Err(e) = backend.disconnect().await {
            tracing::warn!(backend = %backend.kind(), error = %e, "Disconnect after failed migration failed");
        }
    }
}

/// 连接、测试并断开，失败时返回问题描述
async fn probe(side: &str, backend: &dyn StorageBackend) -> Option<String> {
    let result = backend.test_connection().await;
    if let Err(e) = backend.disconnect().await {
        tracing::warn!(backend = %backend.kind(), error = %e, "Disconnect after validation failed");
    }
    (!result.success).then(|| format!("{} connection failed: {}", side, result.message))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::contract::seed_book;
    use crate::application::ports::{BackendCapabilities, MySqlConfig, SqliteConfig};
    use crate::domain::AiProviderConfig;
    use crate::infrastructure::factory::{DriverFactory, FallbackFactory};
    use crate::infrastructure::persistence::{
        LocalStoreConfig, PoolSettings, SledLocalBackend, SqliteBackend,
    };
    use std::time::Duration;
    use tempfile::TempDir;

    fn coordinator() -> MigrationCoordinator {
        MigrationCoordinator::new(Arc::new(DriverFactory::new(
            BackendCapabilities::all(),
            LocalStoreConfig::Temporary,
        )))
    }

    fn sqlite_config(dir: &TempDir, name: &str) -> DatabaseConfig {
        DatabaseConfig::Sqlite(SqliteConfig {
            file_path: dir.path().join(name),
        })
    }

    #[tokio::test]
    async fn test_migrate_reports_monotonic_progress() {
        let dir = TempDir::new().unwrap();
        let source = SledLocalBackend::temporary().unwrap();
        let target = SqliteBackend::new(
            SqliteConfig {
                file_path: dir.path().join("target.db"),
            },
            PoolSettings::default(),
        )
        .unwrap();
        let book = seed_book(&source, "Only Book", 2, 1).await;
        source
            .save_ai_config("openai", &AiProviderConfig::new("gpt-4o", "sk-1"))
            .await
            .unwrap();

        let mut seen: Vec<MigrationProgress> = Vec::new();
        let report = coordinator()
            .migrate(&source, &target, |p| seen.push(p.clone()))
            .await
            .unwrap();

        let numerators: Vec<u32> = seen.iter().map(|p| p.completed).collect();
        assert_eq!(numerators, vec![0, 1, 2, 3, 4, 5]);
        assert!(seen.iter().all(|p| p.total == 5));
        assert_eq!(seen.last().unwrap().stage, MigrationStage::Done);
        assert_eq!(seen.last().unwrap().message, "Migration complete (5/5)");

        assert_eq!(report.source, BackendKind::Local);
        assert_eq!(report.target, BackendKind::Sqlite);
        assert_eq!(report.migrated.books, 1);
        assert_eq!(report.migrated.chapters, 2);
        assert_eq!(report.migrated.fragments, 1);
        assert_eq!(report.migrated.ai_configs, 1);

        // 迁移结束时目标已断开，重新连接后检查
        target.connect().await.unwrap();
        let books = target.list_books().await.unwrap();
        assert_eq!(books.len(), 1);
        assert_eq!(books[0], book);
    }

    #[tokio::test]
    async fn test_migrate_configs_between_sqlite_files() {
        let dir = TempDir::new().unwrap();
        let coordinator = coordinator();
        let source_config = sqlite_config(&dir, "source.db");
        let target_config = sqlite_config(&dir, "target.db");

        let source = SqliteBackend::new(
            SqliteConfig {
                file_path: dir.path().join("source.db"),
            },
            PoolSettings::default(),
        )
        .unwrap();
        source.connect().await.unwrap();
        let book = seed_book(&source, "File Book", 3, 0).await;
        source.disconnect().await.unwrap();

        let report = coordinator
            .migrate_configs(&source_config, &target_config, |_| {})
            .await
            .unwrap();
        assert_eq!(report.migrated.books, 1);
        assert_eq!(report.migrated.chapters, 3);

        let target = SqliteBackend::new(
            SqliteConfig {
                file_path: dir.path().join("target.db"),
            },
            PoolSettings::default(),
        )
        .unwrap();
        target.connect().await.unwrap();
        assert_eq!(target.list_chapters(&book.id).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_local_round_trip_uses_four_steps() {
        let dir = TempDir::new().unwrap();
        let factory = Arc::new(DriverFactory::new(
            BackendCapabilities::all(),
            LocalStoreConfig::Temporary,
        ));
        let coordinator = MigrationCoordinator::new(factory.clone());

        let local = factory.local().await.unwrap();
        let book = seed_book(local.as_ref(), "Local Book", 1, 1).await;

        let mut totals = Vec::new();
        let mut numerators = Vec::new();
        let report = coordinator
            .migrate_from_local(&sqlite_config(&dir, "remote.db"), |p| {
                totals.push(p.total);
                numerators.push(p.completed);
            })
            .await
            .unwrap();
        assert_eq!(report.source, BackendKind::Local);
        assert_eq!(report.migrated.books, 1);
        assert_eq!(numerators, vec![0, 1, 2, 3, 4]);
        assert!(totals.iter().all(|t| *t == 4));

        local.clear_all_data().await.unwrap();
        let report = coordinator
            .migrate_to_local(&sqlite_config(&dir, "remote.db"), |_| {})
            .await
            .unwrap();
        assert_eq!(report.target, BackendKind::Local);
        assert_eq!(local.get_book(&book.id).await.unwrap(), Some(book));
    }

    #[tokio::test]
    async fn test_failed_connect_names_the_stage() {
        let coordinator = coordinator();
        let source = SledLocalBackend::temporary().unwrap();
        let target = crate::infrastructure::persistence::MySqlBackend::new(
            MySqlConfig {
                host: "127.0.0.1".to_string(),
                port: 1,
                username: "writer".to_string(),
                password: String::new(),
                database: "novels".to_string(),
                ssl: None,
            },
            PoolSettings {
                max_connections: 1,
                acquire_timeout: Duration::from_secs(2),
            },
        )
        .unwrap();

        let mut last = None;
        let err = coordinator
            .migrate(&source, &target, |p| last = Some(p.stage))
            .await
            .unwrap_err();
        assert_eq!(err.stage, MigrationStage::Connect);
        assert_eq!(last, Some(MigrationStage::Connect));
    }

    #[tokio::test]
    async fn test_failed_import_disconnects_both_sides() {
        let dir = TempDir::new().unwrap();
        let open = |name: &str| {
            SqliteBackend::new(
                SqliteConfig {
                    file_path: dir.path().join(name),
                },
                PoolSettings::default(),
            )
            .unwrap()
        };

        let source = open("source.db");
        source.connect().await.unwrap();
        seed_book(&source, "Doomed Import", 1, 1).await;
        source.disconnect().await.unwrap();

        // 目标库中预先存在的 fragments 表多一个必填列，导入片段时会失败
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .connect(&format!(
                "sqlite:{}?mode=rwc",
                dir.path().join("target.db").display()
            ))
            .await
            .unwrap();
        sqlx::query(
            "CREATE TABLE fragments (book_id TEXT NOT NULL, id TEXT NOT NULL, title TEXT NOT NULL, \
             data TEXT NOT NULL, created_at INTEGER NOT NULL, updated_at INTEGER NOT NULL, \
             pinned INTEGER NOT NULL, PRIMARY KEY (book_id, id))",
        )
        .execute(&pool)
        .await
        .unwrap();
        pool.close().await;

        let target = open("target.db");
        let err = coordinator()
            .migrate(&source, &target, |_| {})
            .await
            .unwrap_err();
        assert_eq!(err.stage, MigrationStage::Import);
        assert!(matches!(
            source.list_books().await,
            Err(StorageError::NotConnected(BackendKind::Sqlite))
        ));
        assert!(matches!(
            target.list_books().await,
            Err(StorageError::NotConnected(BackendKind::Sqlite))
        ));
    }

    #[tokio::test]
    async fn test_degraded_backend_is_not_used_as_target() {
        let coordinator = MigrationCoordinator::new(Arc::new(FallbackFactory::new(
            DriverFactory::new(BackendCapabilities::local_only(), LocalStoreConfig::Temporary),
        )));
        let dir = TempDir::new().unwrap();

        let err = coordinator
            .migrate_from_local(&sqlite_config(&dir, "web.db"), |_| {})
            .await
            .unwrap_err();
        assert_eq!(err.stage, MigrationStage::Start);
        assert!(matches!(
            err.source,
            StorageError::Unavailable(BackendKind::Sqlite)
        ));
    }

    #[tokio::test]
    async fn test_validate_flags_same_kind_and_unreachable() {
        let coordinator = coordinator();
        let a = SledLocalBackend::temporary().unwrap();
        let b = SledLocalBackend::temporary().unwrap();

        let validation = coordinator.validate(&a, &b).await;
        assert!(!validation.valid);
        assert_eq!(validation.issues.len(), 1);
        assert!(validation.issues[0].contains("both"));

        let dir = TempDir::new().unwrap();
        let ok = coordinator
            .validate_configs(&DatabaseConfig::Local, &sqlite_config(&dir, "v.db"))
            .await;
        assert!(ok.valid, "{:?}", ok.issues);

        let unreachable = DatabaseConfig::Mongodb(crate::application::ports::MongoConfig {
            connection_string: "mongodb://127.0.0.1:1/?serverSelectionTimeoutMS=500".to_string(),
            database_name: "novels".to_string(),
            is_atlas: None,
        });
        let bad = coordinator
            .validate_configs(&DatabaseConfig::Local, &unreachable)
            .await;
        assert!(!bad.valid);
        assert!(bad.issues[0].starts_with("Target connection failed"));
    }
}
