//! Persistence layer for the layout store

pub mod storage;

pub use storage::{LayoutStorage, StorageError, StorageResult, StoreSummary};
