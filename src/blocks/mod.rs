//! Block-level framing for checksummed streams.
//!
//! Content is divided into fixed-size blocks of `interval` bytes, and every
//! block, including a shorter final one, is followed by a 4-byte big-endian
//! digest of exactly that block's content.
//!
//! # Key Components
//!
//! - [`writer::ChecksummedWriter`]: Passes content through to a sink, inserting
//!   a digest after every full block and after the final partial block on close.
//! - [`reader::ChecksummedReader`]: Reads content back with digests stripped,
//!   seeks by logical offset and verifies the block under the cursor.
//! - [`utils`]: The mapping between logical and physical offsets.
//!
//! # Block Structure
//!
//! ```text
//! +--------------------------+----------+--------------------------+----------+
//! | content[0..interval]     | digest   | content[interval..]      | digest   |
//! |   (interval bytes)       | (4 bytes)|   (<= interval bytes)    | (4 bytes)|
//! +--------------------------+----------+--------------------------+----------+
//! ```
//!
//! A stream of `C` content bytes occupies `C + 4 * ceil(C / interval)` bytes.
//! An empty stream, and a stream ending exactly on a block boundary, have no
//! trailing empty block.

pub mod reader;
pub mod utils;
pub mod writer;
