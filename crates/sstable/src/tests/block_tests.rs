use crate::*;

fn sample_block() -> Block {
    let mut block = Block::new(4096);
    for (k, v) in [("apple", "red"), ("banana", "yellow"), ("cherry", "dark red")] {
        assert!(block.add_entry(k.as_bytes(), v.as_bytes()));
    }
    block
}

// -------------------- Building --------------------

#[test]
fn new_block_is_empty() {
    let block = Block::new(64);
    assert!(block.is_empty());
    assert_eq!(block.len(), 0);
    assert_eq!(block.encoded_size(), BLOCK_TRAILER_BYTES);
    assert!(block.first_key().is_none());
    assert!(block.last_key().is_none());
}

#[test]
fn encoded_size_tracks_entries() {
    let mut block = Block::new(4096);
    block.add_entry(b"k", b"vv");
    assert_eq!(block.encoded_size(), BLOCK_TRAILER_BYTES + ENTRY_OVERHEAD + 3);
    block.add_entry(b"kk", b"v");
    assert_eq!(block.encoded_size(), BLOCK_TRAILER_BYTES + 2 * ENTRY_OVERHEAD + 6);
    assert_eq!(block.encode().len(), block.encoded_size());
}

#[test]
fn add_rejects_entry_past_capacity() {
    // trailer 4 + one entry of 12 + 2 = 18 bytes
    let mut block = Block::new(20);
    assert!(block.add_entry(b"a", b"1"));
    assert!(!block.add_entry(b"b", b"2"));
    assert_eq!(block.len(), 1);
}

#[test]
fn add_refuses_key_over_limit_even_when_empty() {
    let mut block = Block::new(4096);
    assert!(!block.add_entry(&vec![b'k'; MAX_KEY_BYTES + 1], b"v"));
    assert!(block.is_empty());
}

#[test]
fn empty_block_accepts_oversized_entry() {
    let mut block = Block::new(16);
    let big = vec![7u8; 100];
    assert!(block.add_entry(b"big", &big));
    assert_eq!(block.len(), 1);
    assert!(!block.add_entry(b"c", b"x"));
}

// -------------------- Lookup --------------------

#[test]
fn get_value_binary_finds_every_key() {
    let block = sample_block();
    assert_eq!(block.get_value_binary(b"apple"), Some(&b"red"[..]));
    assert_eq!(block.get_value_binary(b"banana"), Some(&b"yellow"[..]));
    assert_eq!(block.get_value_binary(b"cherry"), Some(&b"dark red"[..]));
}

#[test]
fn get_value_binary_misses() {
    let block = sample_block();
    assert!(block.get_value_binary(b"aardvark").is_none());
    assert!(block.get_value_binary(b"blueberry").is_none());
    assert!(block.get_value_binary(b"zucchini").is_none());
    assert!(Block::new(64).get_value_binary(b"a").is_none());
}

#[test]
fn first_and_last_key() {
    let block = sample_block();
    assert_eq!(block.first_key(), Some(&b"apple"[..]));
    assert_eq!(block.last_key(), Some(&b"cherry"[..]));
}

#[test]
fn lower_bound_positions() {
    let block = sample_block();
    assert_eq!(block.lower_bound(b""), 0);
    assert_eq!(block.lower_bound(b"apple"), 0);
    assert_eq!(block.lower_bound(b"b"), 1);
    assert_eq!(block.lower_bound(b"banana"), 1);
    assert_eq!(block.lower_bound(b"cherry"), 2);
    assert_eq!(block.lower_bound(b"date"), 3);
}

#[test]
fn entry_out_of_range_is_none() {
    let block = sample_block();
    assert!(block.entry(2).is_some());
    assert!(block.entry(3).is_none());
}

#[test]
fn iter_yields_pairs_in_order() {
    let block = sample_block();
    let keys: Vec<&[u8]> = block.iter().map(|(k, _)| k).collect();
    assert_eq!(keys, vec![&b"apple"[..], &b"banana"[..], &b"cherry"[..]]);
}

#[test]
fn empty_key_and_value_are_stored() {
    let mut block = Block::new(64);
    block.add_entry(b"", b"");
    block.add_entry(b"k", b"");
    assert_eq!(block.get_value_binary(b""), Some(&b""[..]));
    assert_eq!(block.get_value_binary(b"k"), Some(&b""[..]));
}

// -------------------- Encoding --------------------

#[test]
fn encode_layout_is_entries_offsets_count() {
    let mut block = Block::new(64);
    block.add_entry(b"ab", b"c");
    let bytes = block.encode();
    let expected: Vec<u8> = [
        &2u32.to_le_bytes()[..],
        b"ab",
        &1u32.to_le_bytes()[..],
        b"c",
        &0u32.to_le_bytes()[..],
        &1u32.to_le_bytes()[..],
    ]
    .concat();
    assert_eq!(bytes, expected);
}

#[test]
fn decoded_block_answers_like_source_block() -> anyhow::Result<()> {
    let block = sample_block();
    let decoded = Block::decode(&block.encode())?;
    assert_eq!(decoded.len(), 3);
    assert_eq!(decoded.get_value_binary(b"banana"), Some(&b"yellow"[..]));
    assert_eq!(decoded.encode(), block.encode());
    Ok(())
}

#[test]
fn decode_rejects_short_buffer() {
    assert!(matches!(Block::decode(&[1, 0]), Err(SstError::Corrupt(_))));
}

#[test]
fn decode_rejects_bad_count() {
    let mut bytes = sample_block().encode();
    let n = bytes.len();
    bytes[n - 4..].copy_from_slice(&1000u32.to_le_bytes());
    assert!(matches!(Block::decode(&bytes), Err(SstError::Corrupt(_))));
}

#[test]
fn decode_rejects_bad_offset() {
    let mut bytes = sample_block().encode();
    let n = bytes.len();
    // second offset slot sits just before the last slot and the count
    let slot = n - 4 - 2 * 4;
    bytes[slot..slot + 4].copy_from_slice(&1u32.to_le_bytes());
    assert!(matches!(Block::decode(&bytes), Err(SstError::Corrupt(_))));
}

#[test]
fn decode_rejects_truncated_entry() {
    let mut block = Block::new(64);
    block.add_entry(b"key", b"value");
    let mut bytes = block.encode();
    // claim a longer value than is present
    bytes[7..11].copy_from_slice(&50u32.to_le_bytes());
    assert!(matches!(Block::decode(&bytes), Err(SstError::Corrupt(_))));
}
