//! SQL Server Persistence - 基于 tiberius 的 SQL Server 持久化实现

mod sqlserver_backend;

pub use sqlserver_backend::*;
