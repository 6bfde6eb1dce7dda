#![allow(dead_code)]

use quarry_store::{MergePolicy, Store, StoreConfig};
use quarry_types::RecordId;
use std::path::PathBuf;

/// Installs the test log subscriber once; `RUST_LOG` controls verbosity.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A uniquely named in-memory store configuration.
pub fn memory_config() -> StoreConfig {
    StoreConfig::in_memory(format!("test-{}", RecordId::new()))
}

pub fn open_memory_store() -> Store {
    Store::open(memory_config()).unwrap()
}

pub fn open_memory_store_with(policy: MergePolicy) -> Store {
    Store::open(memory_config().merge_policy(policy)).unwrap()
}

pub fn db_path(dir: &tempfile::TempDir) -> PathBuf {
    dir.path().join("quarry.db")
}

pub fn open_file_store(dir: &tempfile::TempDir) -> Store {
    Store::open(StoreConfig::file(db_path(dir))).unwrap()
}

pub fn open_file_store_with(dir: &tempfile::TempDir, policy: MergePolicy) -> Store {
    Store::open(StoreConfig::file(db_path(dir)).merge_policy(policy)).unwrap()
}
