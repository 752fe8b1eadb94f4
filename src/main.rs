//! Quillbox - 小说写作数据的存储后端管理工具

mod cli;

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::Parser;

use quillbox::application::{
    migration_info, BackendFactory, DatabaseConfig, MigrationCoordinator, StorageBackend,
};
use quillbox::config::{load_config, load_config_from_path, print_config, AppConfig};
use quillbox::domain::Snapshot;
use quillbox::infrastructure::{ConfigStore, DriverFactory, FallbackFactory};

use crate::cli::{Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // 加载配置（优先级：环境变量 > 配置文件 > 默认值）
    let config = match &cli.config {
        Some(path) => load_config_from_path(Some(path)),
        None => load_config(),
    }
    .map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;

    // 初始化日志
    let log_filter = format!("{},quillbox={}", config.log.level, config.log.level);
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_filter)),
        )
        .init();

    print_config(&config);

    let app = App::new(&config);
    app.run(cli.command).await
}

struct App {
    drivers: Arc<DriverFactory>,
    factory: Arc<dyn BackendFactory>,
    store: ConfigStore,
}

impl App {
    fn new(config: &AppConfig) -> Self {
        let drivers = Arc::new(
            DriverFactory::new(
                config.environment.capabilities(),
                config.local.store_config(),
            )
            .with_pool_settings(config.pool.settings()),
        );

        // 本地存储只能打开一次，两个工厂共享同一个 DriverFactory
        let factory: Arc<dyn BackendFactory> = if config.environment.fallback {
            Arc::new(
                FallbackFactory::new(drivers.clone())
                    .with_connect_probe(config.environment.connect_probe),
            )
        } else {
            drivers.clone()
        };

        Self {
            drivers,
            factory,
            store: ConfigStore::new(&config.store.config_path),
        }
    }

    async fn run(&self, command: Commands) -> anyhow::Result<()> {
        match command {
            Commands::Status => self.status().await,
            Commands::Test { file } => {
                let config = match file {
                    Some(path) => read_database_config(&path).await?,
                    None => self.store.load().await,
                };
                let result = self.store.test_connection(&config, self.factory.as_ref()).await;
                println!(
                    "{}: {} ({})",
                    config.kind(),
                    if result.success { "ok" } else { "failed" },
                    result.message
                );
                if !result.success {
                    bail!("connection test failed");
                }
                Ok(())
            }
            Commands::Use { file } => {
                let config = read_database_config(&file).await?;
                let result = self
                    .store
                    .test_connection(&config, self.drivers.as_ref())
                    .await;
                if !result.success {
                    bail!("Refusing to switch to {}: {}", config.kind(), result.message);
                }
                self.store.save(&config).await?;
                println!("Active backend: {}", config.kind());
                Ok(())
            }
            Commands::Export { file } => {
                let backend = self.active_backend().await?;
                let snapshot = backend.export_data().await?;
                backend.disconnect().await?;

                tokio::fs::write(&file, snapshot.to_json_pretty()?)
                    .await
                    .with_context(|| format!("Failed to write {}", file.display()))?;
                print_counts("Exported", &snapshot);
                Ok(())
            }
            Commands::Import { file } => {
                let content = tokio::fs::read_to_string(&file)
                    .await
                    .with_context(|| format!("Failed to read {}", file.display()))?;
                let snapshot = Snapshot::from_json(&content)
                    .with_context(|| format!("Invalid snapshot {}", file.display()))?;

                let backend = self.active_backend().await?;
                backend.import_data(&snapshot).await?;
                backend.disconnect().await?;
                print_counts("Imported", &snapshot);
                Ok(())
            }
            Commands::Migrate {
                file,
                validate_only,
            } => self.migrate(&file, validate_only).await,
            Commands::Clear { yes } => {
                if !yes {
                    bail!("Refusing to delete all data without --yes");
                }
                let backend = self.active_backend().await?;
                backend.clear_all_data().await?;
                backend.disconnect().await?;
                println!("All data cleared from {}", backend.kind());
                Ok(())
            }
            Commands::Backends => {
                for backend in self.drivers.supported_backends() {
                    println!(
                        "{:<10} {:<14} {}",
                        backend.kind.as_str(),
                        backend.name,
                        backend.description
                    );
                }
                Ok(())
            }
        }
    }

    async fn active_backend(&self) -> anyhow::Result<Arc<dyn StorageBackend>> {
        let config = self.store.load().await;
        let backend = self.factory.create(&config).await?;
        if backend.kind() != config.kind() {
            tracing::warn!(
                configured = %config.kind(),
                active = %backend.kind(),
                "Using fallback backend"
            );
        }
        backend.connect().await?;
        Ok(backend)
    }

    async fn status(&self) -> anyhow::Result<()> {
        let config = self.store.load().await;
        println!("Config file: {}", self.store.path().display());
        println!("Configured backend: {}", config.kind());

        let backend = self.active_backend().await?;
        let test = backend.test_connection().await;
        println!("Active backend: {}", backend.kind());
        println!("Connection: {}", test.message);

        let snapshot = backend.export_data().await?;
        backend.disconnect().await?;
        print_counts("Stored", &snapshot);
        Ok(())
    }

    async fn migrate(&self, file: &Path, validate_only: bool) -> anyhow::Result<()> {
        let source = self.store.load().await;
        let target = read_database_config(file).await?;
        let coordinator = MigrationCoordinator::new(self.drivers.clone());

        let info = migration_info(source.kind(), target.kind());
        println!("{} (estimated {})", info.description, info.estimated_time);
        for consideration in &info.considerations {
            println!("  - {}", consideration);
        }

        let validation = coordinator.validate_configs(&source, &target).await;
        for issue in &validation.issues {
            println!("  ! {}", issue);
        }
        if validate_only {
            if !validation.valid {
                bail!("Migration pre-flight checks reported issues");
            }
            return Ok(());
        }

        let report = match (&source, &target) {
            (DatabaseConfig::Local, _) => {
                coordinator
                    .migrate_from_local(&target, |p| println!("{}", p.message))
                    .await?
            }
            (_, DatabaseConfig::Local) => {
                coordinator
                    .migrate_to_local(&source, |p| println!("{}", p.message))
                    .await?
            }
            _ => {
                coordinator
                    .migrate_configs(&source, &target, |p| println!("{}", p.message))
                    .await?
            }
        };

        self.store.save(&target).await?;
        println!(
            "Migrated {} books, {} chapters, {} fragments, {} AI configs from {} to {}",
            report.migrated.books,
            report.migrated.chapters,
            report.migrated.fragments,
            report.migrated.ai_configs,
            report.source,
            report.target
        );
        Ok(())
    }
}

async fn read_database_config(path: &Path) -> anyhow::Result<DatabaseConfig> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let config: DatabaseConfig = toml::from_str(&content)
        .with_context(|| format!("Invalid database config {}", path.display()))?;
    Ok(config)
}

fn print_counts(action: &str, snapshot: &Snapshot) {
    let counts = snapshot.counts();
    println!(
        "{} {} books, {} chapters, {} fragments, {} AI configs",
        action, counts.books, counts.chapters, counts.fragments, counts.ai_configs
    );
}
