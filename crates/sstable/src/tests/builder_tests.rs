use super::{build_table, ten_pairs, TWO_BLOCK_SIZE};
use crate::*;
use anyhow::Result;
use tempfile::tempdir;

// -------------------- Block splitting --------------------

#[test]
fn ten_pairs_split_into_two_blocks() -> Result<()> {
    let dir = tempdir()?;
    let table = build_table(
        &dir.path().join("1.sst"),
        1,
        TWO_BLOCK_SIZE,
        &ten_pairs(),
        None,
    )?;

    assert_eq!(table.num_blocks(), 2);
    let metas = table.block_metas();
    assert_eq!(metas[0].first_key, b"key0");
    assert_eq!(metas[0].last_key, b"key4");
    assert_eq!(metas[1].first_key, b"key5");
    assert_eq!(metas[1].last_key, b"key9");
    assert_eq!(table.first_key(), b"key0");
    assert_eq!(table.last_key(), b"key9");
    Ok(())
}

#[test]
fn block_boundaries_are_deterministic() -> Result<()> {
    let dir = tempdir()?;
    let pairs: Vec<(Vec<u8>, Vec<u8>)> = (0..300)
        .map(|i| (format!("k{:05}", i).into_bytes(), vec![b'v'; i % 17]))
        .collect();

    let a = build_table(&dir.path().join("a.sst"), 1, 256, &pairs, None)?;
    let b = build_table(&dir.path().join("b.sst"), 1, 256, &pairs, None)?;
    assert_eq!(a.block_metas(), b.block_metas());
    assert_eq!(std::fs::read(a.path())?, std::fs::read(b.path())?);
    Ok(())
}

#[test]
fn blocks_stay_within_block_size() -> Result<()> {
    let dir = tempdir()?;
    let pairs: Vec<(Vec<u8>, Vec<u8>)> = (0..500)
        .map(|i| (format!("key{:04}", i).into_bytes(), b"some value".to_vec()))
        .collect();
    let table = build_table(&dir.path().join("t.sst"), 3, 512, &pairs, None)?;

    assert!(table.num_blocks() > 1);
    for meta in table.block_metas() {
        assert!(meta.len as usize <= 512);
    }
    // blocks are contiguous and in key order
    for pair in table.block_metas().windows(2) {
        assert_eq!(pair[0].offset + pair[0].len as u64, pair[1].offset);
        assert!(pair[0].last_key < pair[1].first_key);
    }
    Ok(())
}

#[test]
fn oversized_pair_gets_its_own_block() -> Result<()> {
    let dir = tempdir()?;
    let pairs = vec![
        (b"a".to_vec(), b"1".to_vec()),
        (b"b".to_vec(), vec![0u8; 1000]),
        (b"c".to_vec(), b"3".to_vec()),
    ];
    let table = build_table(&dir.path().join("big.sst"), 1, 64, &pairs, None)?;
    assert_eq!(table.num_blocks(), 3);
    assert_eq!(table.get(b"b")?, Some(vec![0u8; 1000]));
    Ok(())
}

// -------------------- Entry limits --------------------

#[test]
fn add_rejects_key_over_limit() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("big_key.sst");
    let mut builder = SsTableBuilder::new(4096);
    let key = vec![b'k'; MAX_KEY_BYTES + 1];

    match builder.add(&key, b"v") {
        Err(SstError::EntryTooLarge { key_len, value_len }) => {
            assert_eq!(key_len, MAX_KEY_BYTES + 1);
            assert_eq!(value_len, 1);
        }
        other => panic!("unexpected result: {:?}", other),
    }
    assert!(builder.is_empty());
    assert!(matches!(builder.build(1, &path, None), Err(SstError::EmptyTable)));
    assert!(!path.exists());
    Ok(())
}

#[test]
fn add_rejects_value_over_limit() {
    let mut builder = SsTableBuilder::new(4096);
    let value = vec![0u8; MAX_VALUE_BYTES + 1];
    assert!(matches!(
        builder.add(b"k", &value),
        Err(SstError::EntryTooLarge { .. })
    ));
    assert_eq!(builder.num_entries(), 0);
}

#[test]
fn key_at_limit_survives_reopen() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("limit.sst");
    let key = vec![b'k'; MAX_KEY_BYTES];
    let mut builder = SsTableBuilder::new(4096).without_bloom();
    builder.add(&key, b"v")?;
    builder.build(1, &path, None)?;

    let table = SsTable::open(1, &path, None)?;
    assert_eq!(table.get(&key)?, Some(b"v".to_vec()));
    Ok(())
}

// -------------------- Build --------------------

#[test]
fn empty_build_fails_without_creating_file() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("empty.sst");
    let builder = SsTableBuilder::new(4096);
    assert!(builder.is_empty());

    let err = builder.build(1, &path, None).unwrap_err();
    assert!(matches!(err, SstError::EmptyTable));
    assert!(!path.exists());
    assert!(!tmp_path(&path).exists());
    Ok(())
}

#[test]
fn build_leaves_no_tmp_file() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("t.sst");
    build_table(&path, 1, 4096, &ten_pairs(), None)?;
    assert!(path.exists());
    assert!(!tmp_path(&path).exists());
    Ok(())
}

#[test]
fn build_overwrites_existing_file() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("t.sst");
    std::fs::write(&path, b"garbage")?;
    let table = build_table(&path, 9, 4096, &ten_pairs(), None)?;
    assert_eq!(table.get(b"key3")?, Some(b"value3".to_vec()));
    assert!(SsTable::open(9, &path, None).is_ok());
    Ok(())
}

#[test]
fn counters_and_estimated_size() {
    let mut builder = SsTableBuilder::new(TWO_BLOCK_SIZE);
    assert_eq!(builder.estimated_size(), 0);
    for (k, v) in ten_pairs().iter().take(6) {
        builder.add(k, v).unwrap();
    }
    assert_eq!(builder.num_entries(), 6);
    // the first five pairs were sealed when the sixth arrived
    assert_eq!(builder.estimated_size(), 5 * 22 + BLOCK_TRAILER_BYTES);
}

#[test]
fn file_size_matches_reported_size() -> Result<()> {
    let dir = tempdir()?;
    let table = build_table(&dir.path().join("t.sst"), 1, 4096, &ten_pairs(), None)?;
    assert_eq!(std::fs::metadata(table.path())?.len(), table.sst_size());
    Ok(())
}

#[test]
fn without_bloom_builds_table_without_filter() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("nb.sst");
    let mut builder = SsTableBuilder::new(4096).without_bloom();
    builder.add(b"a", b"1")?;
    let table = builder.build(1, &path, None)?;
    assert!(!table.has_bloom());
    assert!(table.may_contain(b"anything"));

    let reopened = SsTable::open(1, &path, None)?;
    assert!(!reopened.has_bloom());
    assert_eq!(reopened.get(b"a")?, Some(b"1".to_vec()));
    Ok(())
}

#[test]
fn with_bloom_filters_absent_keys() -> Result<()> {
    let dir = tempdir()?;
    let mut builder = SsTableBuilder::new(4096).with_bloom(1000, 0.01);
    for i in 0..1000 {
        builder.add(format!("key{:04}", i).as_bytes(), b"v")?;
    }
    let table = builder.build(1, dir.path().join("b.sst"), None)?;
    assert!(table.has_bloom());
    for i in 0..1000 {
        assert!(table.may_contain(format!("key{:04}", i).as_bytes()));
    }
    let false_positives = (0..1000)
        .filter(|i| table.may_contain(format!("other{:04}", i).as_bytes()))
        .count();
    assert!(false_positives < 50, "{} false positives", false_positives);
    Ok(())
}
