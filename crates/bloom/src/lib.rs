///! # Bloom Filter
///!
///! Membership filter embedded in every StrataKV SST.
///!
///! A negative answer is exact: the key was never added. A positive answer
///! may be a false positive, at a rate chosen when the filter is sized.
///!
///! ## Usage in StrataKV
///!
///! The SST builder adds every key it packs into a block. On a point lookup
///! the engine probes the filter before the sparse block index, so a table
///! that cannot hold the key costs no binary search and no block read.
///!
///! ## Example
///!
///! ```rust,no_run
///! use bloom::BloomFilter;
///!
///! let mut bf = BloomFilter::new(1000, 0.01);
///! bf.insert(b"key1");
///! assert!(bf.may_contain(b"key1"));
///! let bytes = bf.encode();
///! let back = BloomFilter::decode(&bytes).unwrap();
///! assert!(back.may_contain(b"key1"));
///! ```
use std::io;

/// Encoded header: `num_bits(u64) + num_hashes(u32) + bits_len(u32)`.
pub const HEADER_BYTES: usize = 8 + 4 + 4;

/// Upper bound on the bit vector accepted by [`BloomFilter::decode`] (128 MiB).
const MAX_BLOOM_BYTES: usize = 128 * 1024 * 1024;

/// A bloom filter over a byte vector probed by `k` derived hash functions.
///
/// Probe positions use double hashing, `h1 + i * h2`, with both halves taken
/// from FNV-1a over the key with two different offset bases.
#[derive(Clone, PartialEq, Eq)]
pub struct BloomFilter {
    bits: Vec<u8>,
    num_bits: u64,
    num_hashes: u32,
}

impl BloomFilter {
    /// Sizes a filter for `expected_items` keys at `false_positive_rate`.
    ///
    /// # Panics
    ///
    /// Panics if `expected_items` is 0 or `false_positive_rate` is not in `(0, 1)`.
    pub fn new(expected_items: usize, false_positive_rate: f64) -> Self {
        assert!(expected_items > 0, "expected_items must be > 0");
        assert!(
            false_positive_rate > 0.0 && false_positive_rate < 1.0,
            "false_positive_rate must be in (0, 1)"
        );

        // m = -n * ln(p) / ln(2)^2, k = (m / n) * ln(2)
        let n = expected_items as f64;
        let ln2 = std::f64::consts::LN_2;
        let num_bits = ((-n * false_positive_rate.ln()) / (ln2 * ln2)).ceil() as u64;
        let num_bits = num_bits.max(64);
        let num_hashes = ((num_bits as f64 / n) * ln2).round().max(1.0) as u32;

        Self {
            bits: vec![0u8; num_bits.div_ceil(8) as usize],
            num_bits,
            num_hashes,
        }
    }

    /// Adds `key` to the filter.
    pub fn insert(&mut self, key: &[u8]) {
        for bit in self.bit_positions(key) {
            self.bits[(bit / 8) as usize] |= 1 << (bit % 8);
        }
    }

    /// `false` means `key` was definitely never inserted.
    #[must_use]
    pub fn may_contain(&self, key: &[u8]) -> bool {
        self.bit_positions(key)
            .all(|bit| self.bits[(bit / 8) as usize] & (1 << (bit % 8)) != 0)
    }

    #[must_use]
    pub fn num_bits(&self) -> u64 {
        self.num_bits
    }

    #[must_use]
    pub fn num_hashes(&self) -> u32 {
        self.num_hashes
    }

    /// Size of [`encode`](BloomFilter::encode)'s output in bytes.
    #[must_use]
    pub fn encoded_size(&self) -> usize {
        HEADER_BYTES + self.bits.len()
    }

    /// Serializes the filter.
    ///
    /// ```text
    /// [num_bits: u64 LE][num_hashes: u32 LE][bits_len: u32 LE][bits]
    /// ```
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_size());
        out.extend_from_slice(&self.num_bits.to_le_bytes());
        out.extend_from_slice(&self.num_hashes.to_le_bytes());
        out.extend_from_slice(&(self.bits.len() as u32).to_le_bytes());
        out.extend_from_slice(&self.bits);
        out
    }

    /// Parses bytes produced by [`encode`](BloomFilter::encode).
    ///
    /// Trailing bytes after the bit vector are rejected so that a wrong
    /// section boundary in the caller is reported instead of ignored.
    pub fn decode(buf: &[u8]) -> io::Result<Self> {
        if buf.len() < HEADER_BYTES {
            return Err(invalid("bloom filter header truncated"));
        }
        let num_bits = u64::from_le_bytes(fixed(&buf[0..8]));
        let num_hashes = u32::from_le_bytes(fixed(&buf[8..12]));
        let bits_len = u32::from_le_bytes(fixed(&buf[12..16])) as usize;

        if bits_len > MAX_BLOOM_BYTES {
            return Err(invalid(format!("bloom filter too large: {} bytes", bits_len)));
        }
        if buf.len() != HEADER_BYTES + bits_len {
            return Err(invalid(format!(
                "bloom filter length mismatch: header says {} bytes, section has {}",
                bits_len,
                buf.len() - HEADER_BYTES
            )));
        }
        if num_bits == 0 || num_hashes == 0 || num_bits > (bits_len as u64) * 8 {
            return Err(invalid("bloom filter parameters inconsistent"));
        }

        Ok(Self {
            bits: buf[HEADER_BYTES..].to_vec(),
            num_bits,
            num_hashes,
        })
    }

    /// Bit positions for `key`. Copies the filter geometry so the iterator
    /// does not borrow `self`.
    fn bit_positions(&self, key: &[u8]) -> impl Iterator<Item = u64> {
        let h1 = fnv1a_64(key, 0xcbf2_9ce4_8422_2325);
        let h2 = fnv1a_64(key, 0x517c_c1b7_2722_0a95) | 1;
        let num_bits = self.num_bits;
        (0..self.num_hashes as u64).map(move |i| h1.wrapping_add(i.wrapping_mul(h2)) % num_bits)
    }
}

impl std::fmt::Debug for BloomFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BloomFilter")
            .field("num_bits", &self.num_bits)
            .field("num_hashes", &self.num_hashes)
            .field("bytes", &self.bits.len())
            .finish()
    }
}

fn fnv1a_64(data: &[u8], basis: u64) -> u64 {
    const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;
    data.iter()
        .fold(basis, |hash, &byte| (hash ^ byte as u64).wrapping_mul(FNV_PRIME))
}

fn fixed<const N: usize>(slice: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(slice);
    out
}

fn invalid(msg: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.into())
}
