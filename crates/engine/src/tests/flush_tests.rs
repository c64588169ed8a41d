use super::helpers::{count_sst_files, key, open_engine, value};
use crate::*;
use anyhow::Result;
use tempfile::tempdir;

#[test]
fn flush_empty_memtable_is_noop() -> Result<()> {
    let dir = tempdir()?;
    let engine = open_engine(dir.path())?;

    engine.flush()?;
    assert_eq!(engine.sst_count(), 0);
    assert!(engine.l0_sst_ids().is_empty());
    assert_eq!(count_sst_files(dir.path()), 0);
    Ok(())
}

#[test]
fn read_after_flush() -> Result<()> {
    let dir = tempdir()?;
    let engine = open_engine(dir.path())?;

    for i in 0..100 {
        engine.put(key(i), value(i))?;
    }
    engine.flush()?;

    assert_eq!(engine.memtable_size(), 0);
    assert_eq!(engine.l0_sst_ids(), vec![0]);
    assert!(engine.get_sst_path(0).exists());
    for i in 0..100 {
        assert_eq!(engine.get(&key(i))?, Some(value(i)));
    }
    assert!(engine.get(b"key99999")?.is_none());
    Ok(())
}

#[test]
fn flush_assigns_increasing_ids_newest_first() -> Result<()> {
    let dir = tempdir()?;
    let engine = open_engine(dir.path())?;

    for round in 0..3 {
        engine.put(key(round), value(round))?;
        engine.flush()?;
    }
    assert_eq!(engine.l0_sst_ids(), vec![2, 1, 0]);
    assert_eq!(engine.sst_count(), 3);
    assert_eq!(count_sst_files(dir.path()), 3);
    Ok(())
}

#[test]
fn newest_table_wins() -> Result<()> {
    let dir = tempdir()?;
    let engine = open_engine(dir.path())?;

    engine.put(b"k".to_vec(), b"old".to_vec())?;
    engine.put(b"other".to_vec(), b"x".to_vec())?;
    engine.flush()?;
    engine.put(b"k".to_vec(), b"new".to_vec())?;
    engine.flush()?;

    assert_eq!(engine.get(b"k")?, Some(b"new".to_vec()));
    assert_eq!(engine.get(b"other")?, Some(b"x".to_vec()));
    Ok(())
}

#[test]
fn memtable_shadows_tables() -> Result<()> {
    let dir = tempdir()?;
    let engine = open_engine(dir.path())?;

    engine.put(b"k".to_vec(), b"flushed".to_vec())?;
    engine.flush()?;
    engine.put(b"k".to_vec(), b"fresh".to_vec())?;
    assert_eq!(engine.get(b"k")?, Some(b"fresh".to_vec()));
    Ok(())
}

#[test]
fn tombstone_in_memtable_shadows_flushed_value() -> Result<()> {
    let dir = tempdir()?;
    let engine = open_engine(dir.path())?;

    engine.put(b"k".to_vec(), b"v".to_vec())?;
    engine.flush()?;
    engine.remove(b"k".to_vec())?;
    assert!(engine.get(b"k")?.is_none());
    Ok(())
}

#[test]
fn flushed_tombstone_shadows_older_table() -> Result<()> {
    let dir = tempdir()?;
    let engine = open_engine(dir.path())?;

    engine.put(b"k".to_vec(), b"v".to_vec())?;
    engine.flush()?;
    engine.remove(b"k".to_vec())?;
    engine.flush()?;

    assert_eq!(engine.memtable_size(), 0);
    assert!(engine.get(b"k")?.is_none());

    // the tombstone itself is stored in the newest table
    let levels = engine.levels.read();
    let newest = &levels.ssts[&levels.l0_sst_ids[0]];
    assert_eq!(newest.get(b"k")?, Some(Vec::new()));
    Ok(())
}

#[test]
fn key_outside_every_table_range() -> Result<()> {
    let dir = tempdir()?;
    let engine = open_engine(dir.path())?;

    engine.put(b"m".to_vec(), b"1".to_vec())?;
    engine.put(b"n".to_vec(), b"2".to_vec())?;
    engine.flush()?;
    assert!(engine.get(b"a")?.is_none());
    assert!(engine.get(b"z")?.is_none());
    assert!(engine.get(b"mm")?.is_none());
    Ok(())
}

#[test]
fn failed_flush_restores_memtable() -> Result<()> {
    let dir = tempdir()?;
    let engine = open_engine(dir.path())?;

    engine.put(b"a".to_vec(), b"1".to_vec())?;
    engine.put(b"b".to_vec(), b"2".to_vec())?;
    let size = engine.memtable_size();

    // a directory where the table file should go makes the rename fail
    std::fs::create_dir(engine.get_sst_path(0))?;
    assert!(engine.flush().is_err());

    assert_eq!(engine.memtable_size(), size);
    assert_eq!(engine.get(b"a")?, Some(b"1".to_vec()));
    assert_eq!(engine.get(b"b")?, Some(b"2".to_vec()));
    assert!(engine.l0_sst_ids().is_empty());
    assert!(!sstable::tmp_path(&engine.get_sst_path(0)).exists());

    // the id was not consumed
    std::fs::remove_dir(engine.get_sst_path(0))?;
    engine.flush()?;
    assert_eq!(engine.l0_sst_ids(), vec![0]);
    assert_eq!(engine.get(b"a")?, Some(b"1".to_vec()));
    Ok(())
}

#[test]
fn flushed_reads_use_block_cache() -> Result<()> {
    let dir = tempdir()?;
    let engine = open_engine(dir.path())?;

    engine.put(b"k".to_vec(), b"v".to_vec())?;
    engine.flush()?;
    engine.get(b"k")?;
    engine.get(b"k")?;

    let (hits, misses) = engine.block_cache().stats();
    assert_eq!(misses, 1);
    assert_eq!(hits, 1);
    Ok(())
}
