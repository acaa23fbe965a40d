use std::cmp::min;
use std::io::{self, Read, Result as IoResult, Seek, SeekFrom};

use bytes::{Bytes, BytesMut};
use log::{debug, trace, warn};

use crate::blocks::utils::{self, DEFAULT_INTERVAL, DIGEST_SIZE};
use crate::error::{CheckstreamError, Result};
use crate::hash::{block_digest, Hash32};

/// Raw whence value for seeking relative to the start of the content.
pub const SEEK_START: i32 = 0;
/// Raw whence value for seeking relative to the current position.
pub const SEEK_CURRENT: i32 = 1;
/// Raw whence value for seeking relative to the end of the content.
pub const SEEK_END: i32 = 2;

/// A wrapper around any `Read + Seek` source that tracks the current position.
///
/// The position is updated as reads and seeks succeed. After a failed read or
/// seek the position is unknown and the next
/// [`stream_position`](Seek::stream_position) asks the source again.
pub struct ReadPositionTracker<Source: Read + Seek> {
    /// The underlying source to read from
    source: Source,

    /// The current position in the source, if known
    position: Option<u64>,
}

impl<Source: Read + Seek> ReadPositionTracker<Source> {
    /// Create a new ReadPositionTracker wrapping the given source.
    pub fn new(mut source: Source) -> IoResult<Self> {
        let position = source.stream_position()?;
        Ok(Self {
            source,
            position: Some(position),
        })
    }

    /// Returns the tracked position, or `None` after a failed operation.
    pub fn position(&self) -> Option<u64> {
        self.position
    }

    /// Returns a reference to the underlying source.
    pub fn get_ref(&self) -> &Source {
        &self.source
    }

    /// Returns the underlying source, consuming self.
    pub fn into_inner(self) -> Source {
        self.source
    }
}

impl<Source: Read + Seek> Read for ReadPositionTracker<Source> {
    fn read(&mut self, buf: &mut [u8]) -> IoResult<usize> {
        match self.source.read(buf) {
            Ok(bytes_read) => {
                if let Some(position) = self.position.as_mut() {
                    *position += bytes_read as u64;
                }
                Ok(bytes_read)
            }
            Err(e) => {
                self.position = None;
                Err(e)
            }
        }
    }
}

impl<Source: Read + Seek> Seek for ReadPositionTracker<Source> {
    fn seek(&mut self, pos: SeekFrom) -> IoResult<u64> {
        match self.source.seek(pos) {
            Ok(new_pos) => {
                self.position = Some(new_pos);
                Ok(new_pos)
            }
            Err(e) => {
                self.position = None;
                Err(e)
            }
        }
    }

    fn stream_position(&mut self) -> IoResult<u64> {
        match self.position {
            Some(position) => Ok(position),
            None => {
                let position = self.source.stream_position()?;
                self.position = Some(position);
                Ok(position)
            }
        }
    }
}

/// Configuration options for ChecksummedReader.
#[derive(Debug, Clone)]
pub struct ChecksummedReaderConfig {
    /// Number of content bytes covered by each digest (default: 64 KiB).
    pub interval: u64,
}

impl Default for ChecksummedReaderConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
        }
    }
}

impl ChecksummedReaderConfig {
    /// Creates a new ChecksummedReaderConfig with a custom interval.
    pub fn with_interval(interval: u64) -> Result<Self> {
        utils::validate_interval(interval)?;
        Ok(Self { interval })
    }
}

/// Where the reader stands relative to the block layout.
#[derive(Clone, Copy, Debug, PartialEq)]
enum BlockCursor {
    /// Inside a block, holding the physical bytes consumed from it.
    ///
    /// Only a truncated tail leaves this at or beyond the interval, in which
    /// case nothing more can be read.
    Content(u64),
    /// A full block was read and its digest has not been skipped yet.
    Boundary,
}

/// Reads content written by [`ChecksummedWriter`](crate::blocks::writer::ChecksummedWriter).
///
/// Digests are skipped transparently by reads and are never returned as
/// content. Seeks take logical offsets. [`verify`](Self::verify) checks the
/// block under the cursor on demand.
///
/// After any error from a read, seek or verify the position is unspecified
/// and the caller should seek before reading again.
///
/// # Truncated streams
///
/// The last [`DIGEST_SIZE`] bytes of the source are never content. If the
/// source ends inside a digest, the bytes that would have been content in
/// front of it are withheld so that partial digests never leak out, and the
/// reader is left at the end of the visible content.
pub struct ChecksummedReader<Source, H = crc32fast::Hasher, F = fn() -> crc32fast::Hasher>
where
    Source: Read + Seek,
    H: Hash32,
    F: Fn() -> H,
{
    /// The underlying source, `None` once closed.
    source: Option<ReadPositionTracker<Source>>,

    /// Reader configuration.
    config: ChecksummedReaderConfig,

    /// Constructs a fresh hash for every verified block.
    new_hash: F,

    /// Position within the current block.
    cursor: BlockCursor,

    /// Scratch space for verifying a whole block.
    block_buf: Vec<u8>,
}

impl<Source: Read + Seek> ChecksummedReader<Source> {
    /// Creates a new ChecksummedReader with default configuration and CRC-32 digests.
    pub fn new(source: Source) -> Result<Self> {
        Self::with_config(source, ChecksummedReaderConfig::default())
    }

    /// Creates a new ChecksummedReader with custom configuration and CRC-32 digests.
    pub fn with_config(source: Source, config: ChecksummedReaderConfig) -> Result<Self> {
        Self::with_hasher(source, config, crc32fast::Hasher::new as fn() -> crc32fast::Hasher)
    }
}

impl<Source, H, F> ChecksummedReader<Source, H, F>
where
    Source: Read + Seek,
    H: Hash32,
    F: Fn() -> H,
{
    /// Creates a new ChecksummedReader verifying blocks with a fresh `new_hash()`.
    ///
    /// The source is expected to be positioned at the start of the stream.
    pub fn with_hasher(source: Source, config: ChecksummedReaderConfig, new_hash: F) -> Result<Self> {
        utils::validate_interval(config.interval)?;
        let source = ReadPositionTracker::new(source)?;
        let position = source.position().unwrap_or(0);
        debug!(
            "Opening checksummed reader with interval {} at physical position {}",
            config.interval, position
        );

        Ok(Self {
            cursor: BlockCursor::Content(utils::block_offset(position, config.interval)),
            source: Some(source),
            config,
            new_hash,
            block_buf: Vec::new(),
        })
    }

    /// Returns the configured checksum interval.
    pub fn interval(&self) -> u64 {
        self.config.interval
    }

    /// Returns true once the reader has been closed.
    pub fn is_closed(&self) -> bool {
        self.source.is_none()
    }

    /// Reads content into `buf`, never crossing a block boundary.
    ///
    /// Returns the number of content bytes read; `0` signals the end of the
    /// content (or an empty `buf`). When a read completes a block, the block's
    /// digest is skipped before returning.
    pub fn read_content(&mut self, buf: &mut [u8]) -> Result<usize> {
        let interval = self.config.interval;
        let source = self.source.as_mut().ok_or(CheckstreamError::Closed)?;
        if buf.is_empty() {
            return Ok(0);
        }

        let consumed = match self.cursor {
            BlockCursor::Content(consumed) => consumed,
            BlockCursor::Boundary => {
                let missing = skip_digest(source)?;
                self.cursor = BlockCursor::Content(0);
                if missing > 0 {
                    self.cursor = rewind_to_content_end(source, interval)?;
                    return Ok(0);
                }
                0
            }
        };

        let want = min(interval.saturating_sub(consumed), buf.len() as u64) as usize;
        if want == 0 {
            return Ok(0);
        }

        let n = source.read(&mut buf[..want])?;
        if n == 0 {
            return Ok(0);
        }

        let consumed = consumed + n as u64;
        let missing = if consumed == interval {
            self.cursor = BlockCursor::Boundary;
            let missing = skip_digest(source)?;
            self.cursor = BlockCursor::Content(0);
            missing
        } else {
            self.cursor = BlockCursor::Content(consumed);
            ensure_digest_follows(source)?
        };

        if missing > 0 {
            self.cursor = rewind_to_content_end(source, interval)?;
            trace!("Source ends {} bytes into a digest", DIGEST_SIZE as usize - missing);
        }
        Ok(n.saturating_sub(missing))
    }

    /// Reads up to `len` content bytes with a single [`read_content`](Self::read_content).
    pub fn read_bytes(&mut self, len: usize) -> Result<Bytes> {
        let mut buf = BytesMut::zeroed(len);
        let n = self.read_content(&mut buf)?;
        buf.truncate(n);
        Ok(buf.freeze())
    }

    /// Seeks to a logical offset and returns the new logical offset.
    ///
    /// Relative and end seeks resolve the base position from the source,
    /// apply the delta in content space, and seek the source to the matching
    /// physical offset. Seeking before the start, or to an offset whose
    /// physical position overflows, fails without moving.
    pub fn seek_to(&mut self, pos: SeekFrom) -> Result<u64> {
        let interval = self.config.interval;
        let source = self.source.as_mut().ok_or(CheckstreamError::Closed)?;

        let target = match pos {
            SeekFrom::Start(logical) => physical_target(logical, interval)?,
            SeekFrom::Current(delta) => {
                let physical = source.stream_position()?;
                let base = utils::physical_to_logical(physical, interval);
                physical_target(offset_by(base, delta)?, interval)?
            }
            SeekFrom::End(delta) => {
                let previous = source.stream_position()?;
                let end = source.seek(SeekFrom::End(0))?;
                let base = utils::content_len(end, interval);
                match offset_by(base, delta).and_then(|logical| physical_target(logical, interval)) {
                    Ok(target) => target,
                    Err(e) => {
                        source.seek(SeekFrom::Start(previous))?;
                        return Err(e);
                    }
                }
            }
        };

        let physical = source.seek(SeekFrom::Start(target))?;
        self.cursor = BlockCursor::Content(utils::block_offset(physical, interval));
        Ok(utils::physical_to_logical(physical, interval))
    }

    /// Seeks using a raw whence value ([`SEEK_START`], [`SEEK_CURRENT`] or [`SEEK_END`]).
    ///
    /// An unknown whence fails with [`CheckstreamError::InvalidWhence`]
    /// carrying the source's current physical position, which is left untouched.
    pub fn seek_whence(&mut self, offset: i64, whence: i32) -> Result<u64> {
        self.source.as_ref().ok_or(CheckstreamError::Closed)?;
        let pos = match whence {
            SEEK_START => SeekFrom::Start(u64::try_from(offset).map_err(|_| {
                CheckstreamError::InvalidSeek(format!("negative offset {} from start", offset))
            })?),
            SEEK_CURRENT => SeekFrom::Current(offset),
            SEEK_END => SeekFrom::End(offset),
            _ => {
                let source = self.source.as_mut().ok_or(CheckstreamError::Closed)?;
                let position = source.stream_position()?;
                return Err(CheckstreamError::InvalidWhence { whence, position });
            }
        };
        self.seek_to(pos)
    }

    /// Returns the current logical offset.
    pub fn logical_position(&mut self) -> Result<u64> {
        let source = self.source.as_mut().ok_or(CheckstreamError::Closed)?;
        let physical = source.stream_position()?;
        Ok(utils::physical_to_logical(physical, self.config.interval))
    }

    /// Verifies the digest of the block containing the current position.
    ///
    /// Returns whether the stored digest matches the block's content. The
    /// position is restored afterwards whatever the outcome. An error means
    /// the block could not be checked, not that it is corrupt: a timeout may
    /// leave perfectly good content unreachable for a while.
    ///
    /// A truncated final block is checked against whatever is present, taking
    /// its last [`DIGEST_SIZE`] bytes as the digest. At the end of the stream
    /// there is no block to check and an `UnexpectedEof` I/O error is returned.
    pub fn verify(&mut self) -> Result<bool> {
        let interval = self.config.interval;
        let source = self.source.as_mut().ok_or(CheckstreamError::Closed)?;

        let original = source.stream_position()?;
        let consumed = match self.cursor {
            BlockCursor::Content(consumed) => consumed,
            BlockCursor::Boundary => interval,
        };
        let block_start = original.saturating_sub(consumed);

        let outcome = check_block(
            source,
            block_start,
            utils::framed_block_size(interval) as usize,
            &mut self.block_buf,
            &self.new_hash,
        );
        let restored = source.seek(SeekFrom::Start(original));

        match (outcome, restored) {
            (Ok(valid), Ok(_)) => {
                if !valid {
                    warn!("Digest mismatch in block at physical offset {}", block_start);
                }
                Ok(valid)
            }
            (Ok(_), Err(e)) => Err(e.into()),
            (Err(e), Ok(_)) => Err(e.into()),
            (Err(e), Err(restore)) => {
                warn!(
                    "Failed to restore physical position {} after verify error: {}",
                    original, restore
                );
                Err(e.into())
            }
        }
    }

    /// Closes the reader and releases the source.
    ///
    /// Closing an already closed reader fails with [`CheckstreamError::Closed`].
    pub fn close(&mut self) -> Result<()> {
        self.source.take().ok_or(CheckstreamError::Closed)?;
        debug!("Closed checksummed reader");
        Ok(())
    }

    /// Returns the underlying source, consuming self.
    pub fn into_inner(self) -> Result<Source> {
        self.source
            .map(ReadPositionTracker::into_inner)
            .ok_or(CheckstreamError::Closed)
    }

    /// Gets a reference to the underlying source, if still open.
    pub fn get_ref(&self) -> Option<&Source> {
        self.source.as_ref().map(ReadPositionTracker::get_ref)
    }
}

/// Applies a signed delta to a logical offset.
fn offset_by(base: u64, delta: i64) -> Result<u64> {
    base.checked_add_signed(delta).ok_or_else(|| {
        CheckstreamError::InvalidSeek(format!("offset {} from {} is out of range", delta, base))
    })
}

/// Maps a logical seek target to its physical offset.
fn physical_target(logical: u64, interval: u64) -> Result<u64> {
    utils::logical_to_physical(logical, interval).ok_or_else(|| {
        CheckstreamError::InvalidSeek(format!("offset {} is beyond the largest physical offset", logical))
    })
}

/// Reads until `buf` is full or the source ends, returning the bytes read.
fn read_up_to<R: Read>(source: &mut R, buf: &mut [u8]) -> IoResult<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match source.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Consumes the digest after a full block, returning how many of its bytes are missing.
fn skip_digest<R: Read>(source: &mut R) -> IoResult<usize> {
    let mut digest = [0u8; DIGEST_SIZE as usize];
    let got = read_up_to(source, &mut digest)?;
    trace!("Skipped {} digest bytes", got);
    Ok(digest.len() - got)
}

/// Checks that a full digest's worth of bytes follows the content just read.
///
/// Returns how many bytes are missing. When none are, the peeked bytes are
/// put back so the next read starts right after the content.
fn ensure_digest_follows<R: Read + Seek>(source: &mut R) -> IoResult<usize> {
    let mut peek = [0u8; DIGEST_SIZE as usize];
    let got = read_up_to(source, &mut peek)?;
    if got == peek.len() {
        source.seek(SeekFrom::Current(-(DIGEST_SIZE as i64)))?;
    }
    Ok(peek.len() - got)
}

/// Moves a source that ended inside a digest back to the end of its visible content.
fn rewind_to_content_end<R: Seek>(source: &mut R, interval: u64) -> IoResult<BlockCursor> {
    let end = source.stream_position()?;
    let content_end = source.seek(SeekFrom::Start(end.saturating_sub(DIGEST_SIZE)))?;
    Ok(BlockCursor::Content(utils::block_offset(content_end, interval)))
}

/// Reads the block starting at `block_start` and compares it with its digest.
fn check_block<R, H, F>(
    source: &mut R,
    block_start: u64,
    framed_block: usize,
    buf: &mut Vec<u8>,
    new_hash: &F,
) -> IoResult<bool>
where
    R: Read + Seek,
    H: Hash32,
    F: Fn() -> H,
{
    source.seek(SeekFrom::Start(block_start))?;
    buf.resize(framed_block, 0);
    let n = read_up_to(source, buf)?;

    let digest_size = DIGEST_SIZE as usize;
    if n == 0 {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "no block left to verify at the end of the stream",
        ));
    }
    if n < digest_size {
        return Ok(false);
    }

    let (content, stored) = buf[..n].split_at(n - digest_size);
    Ok(block_digest(new_hash, content)[..] == *stored)
}

impl<Source, H, F> Read for ChecksummedReader<Source, H, F>
where
    Source: Read + Seek,
    H: Hash32,
    F: Fn() -> H,
{
    fn read(&mut self, buf: &mut [u8]) -> IoResult<usize> {
        Ok(self.read_content(buf)?)
    }
}

impl<Source, H, F> Seek for ChecksummedReader<Source, H, F>
where
    Source: Read + Seek,
    H: Hash32,
    F: Fn() -> H,
{
    fn seek(&mut self, pos: SeekFrom) -> IoResult<u64> {
        Ok(self.seek_to(pos)?)
    }
}
