//! Sled Persistence - 本地嵌入式存储

mod local_backend;

pub use local_backend::{LocalStoreConfig, SledLocalBackend};
