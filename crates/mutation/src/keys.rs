//! Partition identity: raw keys, tokens, and the decorated key order.
//!
//! Partitions are placed by the Murmur3 partitioner: the token of a key is
//! the first 64 bits of the x64 128-bit Murmur3 hash (seed 0) of its raw
//! bytes, computed the way Cassandra does it, including its sign-extension
//! of tail bytes. `i64::MIN` is reserved as the minimum token and is never
//! produced for a key.

use std::fmt;

/// Placement token of a partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Token(pub i64);

impl Token {
    /// Computes the Murmur3 token of a raw partition key.
    #[must_use]
    pub fn of_key(raw: &[u8]) -> Self {
        match murmur3_x64_128_h1(raw) {
            i64::MIN => Token(i64::MAX),
            t => Token(t),
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A partition key together with its token.
///
/// Ordered by token first and by the raw key bytes on token collisions.
/// Field order matters: the derived `Ord` compares `token` before `key`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DecoratedKey {
    token: Token,
    key: Vec<u8>,
}

impl DecoratedKey {
    /// Decorates a raw key with its Murmur3 token.
    pub fn from_raw(key: impl Into<Vec<u8>>) -> Self {
        let key = key.into();
        Self {
            token: Token::of_key(&key),
            key,
        }
    }

    /// Decorates a key given as hex (surrounding whitespace is ignored).
    pub fn from_hex(hex_key: &str) -> Result<Self, hex::FromHexError> {
        Ok(Self::from_raw(hex::decode(hex_key.trim())?))
    }

    #[must_use]
    pub fn token(&self) -> Token {
        self.token
    }

    #[must_use]
    pub fn key(&self) -> &[u8] {
        &self.key
    }

    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(&self.key)
    }
}

impl fmt::Display for DecoratedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{key: {}, token: {}}}", self.to_hex(), self.token)
    }
}

const C1: u64 = 0x87c3_7b91_1142_53d5;
const C2: u64 = 0x4cf5_ad43_2745_937f;

fn fmix(mut k: u64) -> u64 {
    k ^= k >> 33;
    k = k.wrapping_mul(0xff51_afd7_ed55_8ccd);
    k ^= k >> 33;
    k = k.wrapping_mul(0xc4ce_b9fe_1a85_ec53);
    k ^ (k >> 33)
}

fn le_u64(bytes: &[u8]) -> u64 {
    bytes
        .iter()
        .rev()
        .fold(0u64, |acc, &b| (acc << 8) | u64::from(b))
}

/// Tail bytes are folded in as *signed* values.
fn signed_byte(b: u8) -> u64 {
    b as i8 as i64 as u64
}

fn murmur3_x64_128_h1(data: &[u8]) -> i64 {
    let len = data.len() as u64;
    let mut h1: u64 = 0;
    let mut h2: u64 = 0;

    let mut blocks = data.chunks_exact(16);
    for block in &mut blocks {
        let (lo, hi) = block.split_at(8);
        let mut k1 = le_u64(lo);
        let mut k2 = le_u64(hi);

        k1 = k1.wrapping_mul(C1).rotate_left(31).wrapping_mul(C2);
        h1 ^= k1;
        h1 = h1.rotate_left(27).wrapping_add(h2);
        h1 = h1.wrapping_mul(5).wrapping_add(0x52dc_e729);

        k2 = k2.wrapping_mul(C2).rotate_left(33).wrapping_mul(C1);
        h2 ^= k2;
        h2 = h2.rotate_left(31).wrapping_add(h1);
        h2 = h2.wrapping_mul(5).wrapping_add(0x3849_5ab5);
    }

    let tail = blocks.remainder();
    if tail.len() > 8 {
        let mut k2: u64 = 0;
        for (i, &b) in tail.iter().enumerate().skip(8).rev() {
            k2 ^= signed_byte(b) << ((i - 8) * 8);
        }
        k2 = k2.wrapping_mul(C2).rotate_left(33).wrapping_mul(C1);
        h2 ^= k2;
    }
    if !tail.is_empty() {
        let mut k1: u64 = 0;
        for (i, &b) in tail.iter().enumerate().take(8).rev() {
            k1 ^= signed_byte(b) << (i * 8);
        }
        k1 = k1.wrapping_mul(C1).rotate_left(31).wrapping_mul(C2);
        h1 ^= k1;
    }

    h1 ^= len;
    h2 ^= len;
    h1 = h1.wrapping_add(h2);
    h2 = h2.wrapping_add(h1);
    h1 = fmix(h1);
    h2 = fmix(h2);
    h1 = h1.wrapping_add(h2);
    h1 as i64
}
