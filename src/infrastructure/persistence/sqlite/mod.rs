//! SQLite Persistence - SQLite 数据库持久化实现

mod database;
mod sqlite_backend;

pub use database::*;
pub use sqlite_backend::*;
