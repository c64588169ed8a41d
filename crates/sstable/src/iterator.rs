use std::sync::Arc;

use crate::block::Block;
use crate::error::Result;
use crate::reader::SsTable;

/// Ordered iterator over the pairs of one [`SsTable`].
///
/// Blocks are loaded lazily, one at a time, through
/// [`SsTable::read_block`]. After an error is yielded the iterator is fused
/// and returns `None`.
pub struct SstIter<'a> {
    table: &'a SsTable,
    next_block: usize,
    block: Option<Arc<Block>>,
    pos: usize,
    /// Skip target, consumed when the first block is loaded.
    seek: Option<Vec<u8>>,
    done: bool,
}

impl<'a> SstIter<'a> {
    pub(crate) fn new(table: &'a SsTable, start: Option<&[u8]>) -> Self {
        let mut next_block = 0;
        let mut seek = None;
        if let Some(start) = start {
            if start > table.last_key() {
                next_block = table.num_blocks();
            } else if start > table.first_key() {
                // in range, so the lookup cannot fail
                next_block = table.find_block_idx(start).unwrap_or(0);
                seek = Some(start.to_vec());
            }
        }
        Self {
            table,
            next_block,
            block: None,
            pos: 0,
            seek,
            done: false,
        }
    }

    fn load_next_block(&mut self) -> Result<bool> {
        if self.next_block >= self.table.num_blocks() {
            return Ok(false);
        }
        let block = self.table.read_block(self.next_block)?;
        self.next_block += 1;
        self.pos = match self.seek.take() {
            Some(start) => block.lower_bound(&start),
            None => 0,
        };
        self.block = Some(block);
        Ok(true)
    }
}

impl Iterator for SstIter<'_> {
    type Item = Result<(Vec<u8>, Vec<u8>)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        loop {
            if let Some(block) = &self.block {
                if let Some((k, v)) = block.entry(self.pos) {
                    self.pos += 1;
                    return Some(Ok((k.to_vec(), v.to_vec())));
                }
            }
            match self.load_next_block() {
                Ok(true) => {}
                Ok(false) => {
                    self.done = true;
                    return None;
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
    }
}
