//! 迁移前检查与说明

use serde::Serialize;

use crate::application::ports::BackendKind;

/// 迁移前检查结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationValidation {
    pub valid: bool,
    pub issues: Vec<String>,
}

impl MigrationValidation {
    pub fn from_issues(issues: Vec<String>) -> Self {
        Self {
            valid: issues.is_empty(),
            issues,
        }
    }
}

/// 迁移说明：描述、注意事项、预计耗时
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationInfo {
    pub description: String,
    pub considerations: Vec<&'static str>,
    pub estimated_time: &'static str,
}

fn storage_name(kind: BackendKind) -> &'static str {
    match kind {
        BackendKind::Local => "local storage",
        BackendKind::Mongodb => "a MongoDB database",
        BackendKind::Mysql => "a MySQL database",
        BackendKind::Sqlserver => "a SQL Server database",
        BackendKind::Sqlite => "an SQLite file database",
    }
}

pub fn migration_info(source: BackendKind, target: BackendKind) -> MigrationInfo {
    let mut considerations = vec![
        "Back up all important data before migrating",
        "Keep the application running until the migration finishes",
        "Verify data integrity once the migration completes",
    ];

    if source == BackendKind::Local {
        considerations.push("Moving off local storage lifts its capacity limits");
        considerations.push("Migrated data can be shared across devices");
    }

    match target {
        BackendKind::Local => {
            considerations.push("Local storage capacity is limited");
            considerations.push("Data will only be reachable from this machine");
        }
        BackendKind::Mongodb => {
            considerations.push("MongoDB suits large volumes of loosely structured data");
            considerations.push("The MongoDB Atlas free tier needs no local server");
        }
        BackendKind::Mysql | BackendKind::Sqlserver => {
            considerations.push("Relational databases suit structured data");
            considerations.push("A separate database server or cloud service is required");
        }
        BackendKind::Sqlite => {
            considerations.push("SQLite is a lightweight file database with no server");
            considerations.push("Suited to personal use and small projects");
        }
    }

    let estimated_time = if source == BackendKind::Local || target == BackendKind::Local {
        "1-3 minutes"
    } else {
        "3-10 minutes"
    };

    MigrationInfo {
        description: format!(
            "Migrate from {} to {}",
            storage_name(source),
            storage_name(target)
        ),
        considerations,
        estimated_time,
    }
}
