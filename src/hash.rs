//! Hash constructions used for block digests.
//!
//! A digest is the big-endian encoding of a 32-bit hash over exactly one
//! block's content. Streams take a factory (`Fn() -> H`) rather than a hasher
//! so every block is hashed by a freshly constructed instance.

use byteorder::{BigEndian, ByteOrder};
use highway::{HighwayHash, HighwayHasher, Key};

use crate::blocks::utils::DIGEST_SIZE;

/// Key used by [`Highway32`].
pub const HIGHWAY_HASH_KEY: [u64; 4] = [
    0x6d61657274736b63,
    0x6563686b73756d73,
    0x6d61657274736b63,
    0x6563686b73756d73,
];

/// A streaming hash producing a 32-bit value.
pub trait Hash32 {
    /// Feeds more bytes into the hash.
    fn update(&mut self, data: &[u8]);

    /// Consumes the hash and returns its 32-bit value.
    fn finish32(self) -> u32;
}

impl Hash32 for crc32fast::Hasher {
    fn update(&mut self, data: &[u8]) {
        crc32fast::Hasher::update(self, data);
    }

    fn finish32(self) -> u32 {
        self.finalize()
    }
}

/// HighwayHash with a fixed key, truncated to its low 32 bits.
pub struct Highway32(HighwayHasher);

impl Highway32 {
    pub fn new() -> Self {
        Self(HighwayHasher::new(Key(HIGHWAY_HASH_KEY)))
    }
}

impl Default for Highway32 {
    fn default() -> Self {
        Self::new()
    }
}

impl Hash32 for Highway32 {
    fn update(&mut self, data: &[u8]) {
        self.0.append(data);
    }

    fn finish32(self) -> u32 {
        self.0.finalize64() as u32
    }
}

/// Encodes a hash value the way it is stored after a block.
pub fn encode_digest(value: u32) -> [u8; DIGEST_SIZE as usize] {
    let mut digest = [0u8; DIGEST_SIZE as usize];
    BigEndian::write_u32(&mut digest, value);
    digest
}

/// Computes the stored digest of `data` with a fresh hash from `new_hash`.
pub fn block_digest<H, F>(new_hash: F, data: &[u8]) -> [u8; DIGEST_SIZE as usize]
where
    H: Hash32,
    F: Fn() -> H,
{
    let mut hash = new_hash();
    hash.update(data);
    encode_digest(hash.finish32())
}
