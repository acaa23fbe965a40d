//! Offset arithmetic shared by checksummed readers and writers.
//!
//! Content is cut into blocks of `interval` bytes and every block is followed
//! by a [`DIGEST_SIZE`]-byte digest. A logical offset counts content bytes only,
//! a physical offset counts every byte in the underlying stream:
//!
//! ```text
//! physical = logical + DIGEST_SIZE * (logical / interval)
//! ```

use crate::error::{CheckstreamError, Result};

/// Size of the digest stored after every block.
pub const DIGEST_SIZE: u64 = 4;

/// Default checksum interval is 64 KiB.
pub const DEFAULT_INTERVAL: u64 = 1 << 16;

/// Largest accepted interval; verifying a block buffers it whole.
pub const MAX_INTERVAL: u64 = 1 << 30;

/// Validates that a block holds at least one and at most [`MAX_INTERVAL`] content bytes.
pub fn validate_interval(interval: u64) -> Result<()> {
    if interval == 0 || interval > MAX_INTERVAL {
        return Err(CheckstreamError::InvalidInterval(interval));
    }
    Ok(())
}

/// Physical size of one full block including its digest.
pub fn framed_block_size(interval: u64) -> u64 {
    interval + DIGEST_SIZE
}

/// Maps a logical offset to its physical offset.
///
/// Returns `None` if the physical offset does not fit in a `u64`.
pub fn logical_to_physical(logical: u64, interval: u64) -> Option<u64> {
    (logical / interval)
        .checked_mul(DIGEST_SIZE)
        .and_then(|digests| logical.checked_add(digests))
}

/// Maps a physical offset back to a logical offset.
///
/// Positions inside a digest are not content; they map to the end of the
/// block the digest belongs to.
pub fn physical_to_logical(physical: u64, interval: u64) -> u64 {
    let block = framed_block_size(interval);
    (physical / block) * interval + (physical % block).min(interval)
}

/// Number of physical bytes already consumed from the block containing `physical`.
pub fn block_offset(physical: u64, interval: u64) -> u64 {
    physical % framed_block_size(interval)
}

/// Number of content bytes visible in a stream of `physical_len` bytes.
///
/// The final [`DIGEST_SIZE`] bytes of a stream are never content, so a
/// truncated trailing digest eats into the content before it.
pub fn content_len(physical_len: u64, interval: u64) -> u64 {
    let block = framed_block_size(interval);
    (physical_len / block) * interval + (physical_len % block).saturating_sub(DIGEST_SIZE)
}

/// Number of physical bytes a stream of `content_len` content bytes occupies.
pub fn framed_len(content_len: u64, interval: u64) -> u64 {
    content_len + DIGEST_SIZE * content_len.div_ceil(interval)
}
