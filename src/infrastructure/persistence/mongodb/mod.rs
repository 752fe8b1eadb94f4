//! MongoDB Persistence - 文档数据库持久化实现

mod mongo_backend;

pub use mongo_backend::*;
