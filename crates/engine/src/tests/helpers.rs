use crate::Engine;
use anyhow::Result;
use config::LsmConfig;
use std::fs;
use std::path::Path;

pub fn count_sst_files(dir: &Path) -> usize {
    fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| {
            e.path()
                .extension()
                .and_then(|s| s.to_str())
                .map(|ext| ext == "sst")
                .unwrap_or(false)
        })
        .count()
}

/// Small blocks and a threshold high enough that nothing flushes on its own.
pub fn small_config() -> LsmConfig {
    LsmConfig::default()
        .with_block_size(128)
        .with_memtable_flush_threshold(1024 * 1024)
}

pub fn open_engine(dir: &Path) -> Result<Engine> {
    Engine::open(dir, small_config())
}

pub fn key(i: usize) -> Vec<u8> {
    format!("key{:05}", i).into_bytes()
}

pub fn value(i: usize) -> Vec<u8> {
    format!("value{}", i).into_bytes()
}
