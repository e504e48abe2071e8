use serde::Deserialize;

use crate::error::Result;
use crate::storage::StorageType;

#[derive(Debug, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
}

#[derive(Debug, PartialEq, Deserialize)]
pub struct Config {
    pub log_level: LogLevel,
    pub storage_type: StorageType,
    /// Path of the backing database file, only used by the file storage.
    pub path: String,
    /// Number of page frames in the buffer pool.
    pub pool_size: usize,
    /// The K parameter of the LRU-K replacement policy.
    pub replacer_k: usize,
}

impl Config {
    pub fn new(file: &str) -> Result<Config> {
        let mut cfg = config::Config::builder()
            .set_default("log_level", "debug")?
            .set_default("storage_type", "memory")?
            .set_default("path", "bufdb.db")?
            .set_default("pool_size", 64i64)?
            .set_default("replacer_k", 2i64)?;
        if !file.is_empty() {
            cfg = cfg.add_source(config::File::with_name(file))
        }
        cfg = cfg.add_source(config::Environment::with_prefix("BUFDB"));
        Ok(cfg.build()?.try_deserialize()?)
    }
}
