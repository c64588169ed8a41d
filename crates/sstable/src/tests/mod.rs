mod block_tests;
mod builder_tests;

use crate::*;
use std::path::Path;
use std::sync::Arc;

/// `key0`..`key9` with values `value0`..`value9`. Each pair encodes to 22
/// bytes, so five fit in a 128-byte block and the sixth does not.
pub(crate) const TWO_BLOCK_SIZE: usize = 128;

pub(crate) fn ten_pairs() -> Vec<(Vec<u8>, Vec<u8>)> {
    (0..10)
        .map(|i| {
            (
                format!("key{}", i).into_bytes(),
                format!("value{}", i).into_bytes(),
            )
        })
        .collect()
}

pub(crate) fn build_table(
    path: &Path,
    sst_id: u64,
    block_size: usize,
    pairs: &[(Vec<u8>, Vec<u8>)],
    cache: Option<Arc<BlockCache>>,
) -> Result<SsTable> {
    let mut builder = SsTableBuilder::new(block_size);
    for (k, v) in pairs {
        builder.add(k, v)?;
    }
    builder.build(sst_id, path, cache)
}
