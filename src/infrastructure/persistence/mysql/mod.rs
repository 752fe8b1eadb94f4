//! MySQL Persistence - MySQL 数据库持久化实现

mod mysql_backend;

pub use mysql_backend::*;
