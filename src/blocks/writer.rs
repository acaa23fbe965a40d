use std::cmp::min;
use std::io::{self, Write};
use std::mem;

use log::{debug, error, trace};

use crate::blocks::utils::{self, DEFAULT_INTERVAL, DIGEST_SIZE};
use crate::error::{CheckstreamError, Result};
use crate::hash::{encode_digest, Hash32};

/// Configuration options for ChecksummedWriter.
#[derive(Debug, Clone)]
pub struct ChecksummedWriterConfig {
    /// Number of content bytes covered by each digest (default: 64 KiB).
    pub interval: u64,
}

impl Default for ChecksummedWriterConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
        }
    }
}

impl ChecksummedWriterConfig {
    /// Creates a new ChecksummedWriterConfig with a custom interval.
    pub fn with_interval(interval: u64) -> Result<Self> {
        utils::validate_interval(interval)?;
        Ok(Self { interval })
    }
}

/// Writes content with a digest embedded after every `interval` bytes.
///
/// Content is passed straight through to the sink; only the running hash of
/// the current block is kept. When a block fills up its digest is written and
/// a new hash is constructed for the next block. The final partial block gets
/// its digest on [`close`](Self::close) or [`into_inner`](Self::into_inner).
///
/// Writers are expected to start at offset 0 of a fresh sink. A sink error
/// poisons the writer: the sink is dropped and every later call fails with
/// [`CheckstreamError::Closed`].
pub struct ChecksummedWriter<Sink, H = crc32fast::Hasher, F = fn() -> crc32fast::Hasher>
where
    Sink: Write,
    H: Hash32,
    F: Fn() -> H,
{
    /// The underlying writer, `None` once closed or poisoned.
    sink: Option<Sink>,
    /// Configuration options.
    config: ChecksummedWriterConfig,
    /// Constructs a fresh hash for every block.
    new_hash: F,
    /// Hash of the content written to the current block so far.
    hash: H,
    /// Content bytes in the current block, always below the interval.
    block_len: u64,
    /// Content bytes written in total.
    logical_pos: u64,
    /// Bytes handed to the sink in total, digests included.
    physical_pos: u64,
    /// Sink error withheld by a partial `io::Write::write`, returned by the next call.
    poison: Option<io::Error>,
}

impl<Sink: Write> ChecksummedWriter<Sink> {
    /// Creates a new ChecksummedWriter with default configuration and CRC-32 digests.
    pub fn new(sink: Sink) -> Result<Self> {
        Self::with_config(sink, ChecksummedWriterConfig::default())
    }

    /// Creates a new ChecksummedWriter with custom configuration and CRC-32 digests.
    pub fn with_config(sink: Sink, config: ChecksummedWriterConfig) -> Result<Self> {
        Self::with_hasher(sink, config, crc32fast::Hasher::new as fn() -> crc32fast::Hasher)
    }
}

impl<Sink, H, F> ChecksummedWriter<Sink, H, F>
where
    Sink: Write,
    H: Hash32,
    F: Fn() -> H,
{
    /// Creates a new ChecksummedWriter hashing every block with a fresh `new_hash()`.
    pub fn with_hasher(sink: Sink, config: ChecksummedWriterConfig, new_hash: F) -> Result<Self> {
        utils::validate_interval(config.interval)?;
        debug!("Opening checksummed writer with interval {}", config.interval);

        let hash = new_hash();
        Ok(Self {
            sink: Some(sink),
            config,
            new_hash,
            hash,
            block_len: 0,
            logical_pos: 0,
            physical_pos: 0,
            poison: None,
        })
    }

    /// Returns the configured checksum interval.
    pub fn interval(&self) -> u64 {
        self.config.interval
    }

    /// Returns the number of content bytes written so far.
    pub fn logical_position(&self) -> u64 {
        self.logical_pos
    }

    /// Returns the number of bytes handed to the sink so far, digests included.
    pub fn physical_position(&self) -> u64 {
        self.physical_pos
    }

    /// Returns true once the writer has been closed or poisoned.
    pub fn is_closed(&self) -> bool {
        self.sink.is_none()
    }

    /// Writes content, emitting a digest each time a block fills up.
    ///
    /// Returns the number of content bytes written, which is all of `data`
    /// unless the sink fails. On failure the writer is poisoned and the error
    /// reports how many content bytes the sink confirmed before failing.
    pub fn write_content(&mut self, mut data: &[u8]) -> Result<usize> {
        let interval = self.config.interval;
        let sink = self.sink.as_mut().ok_or(CheckstreamError::Closed)?;

        let mut written = 0;
        while !data.is_empty() {
            let room = interval - self.block_len;
            let take = min(room, data.len() as u64) as usize;
            let (piece, rest) = data.split_at(take);

            let (n, result) = write_counted(sink, piece);
            written += n;
            if let Err(source) = result {
                self.sink = None;
                return Err(CheckstreamError::WriteFailed { written, source });
            }

            self.hash.update(piece);
            self.block_len += take as u64;
            self.logical_pos += take as u64;
            self.physical_pos += take as u64;
            data = rest;

            if self.block_len == interval {
                let hash = mem::replace(&mut self.hash, (self.new_hash)());
                let digest = encode_digest(hash.finish32());
                trace!("Writing digest for block ending at offset {}", self.logical_pos);

                if let (_, Err(source)) = write_counted(sink, &digest) {
                    self.sink = None;
                    return Err(CheckstreamError::WriteFailed { written, source });
                }
                self.physical_pos += DIGEST_SIZE;
                self.block_len = 0;
            }
        }

        Ok(written)
    }

    /// Emits the digest of a pending partial block and flushes the sink.
    fn finish(&mut self, sink: &mut Sink) -> io::Result<()> {
        if self.block_len > 0 {
            let hash = mem::replace(&mut self.hash, (self.new_hash)());
            let digest = encode_digest(hash.finish32());
            trace!(
                "Writing digest for final block of {} bytes at offset {}",
                self.block_len,
                self.logical_pos
            );
            sink.write_all(&digest)?;
            self.physical_pos += DIGEST_SIZE;
            self.block_len = 0;
        }
        sink.flush()
    }

    /// Finishes the stream and releases the sink.
    ///
    /// Writes the digest of a pending partial block, flushes and drops the
    /// sink. Closing an already closed writer fails with
    /// [`CheckstreamError::Closed`].
    pub fn close(&mut self) -> Result<()> {
        let mut sink = self.sink.take().ok_or(CheckstreamError::Closed)?;
        self.finish(&mut sink)?;
        debug!(
            "Closed checksummed writer after {} content bytes ({} physical)",
            self.logical_pos,
            self.physical_position()
        );
        Ok(())
    }

    /// Finishes the stream like [`close`](Self::close) and returns the sink.
    pub fn into_inner(mut self) -> Result<Sink> {
        let mut sink = self.sink.take().ok_or(CheckstreamError::Closed)?;
        self.finish(&mut sink)?;
        Ok(sink)
    }

    /// Gets a reference to the underlying sink, if still open.
    pub fn get_ref(&self) -> Option<&Sink> {
        self.sink.as_ref()
    }
}

/// Writes `data`, returning how many bytes the sink accepted before any error.
fn write_counted<W: Write>(sink: &mut W, data: &[u8]) -> (usize, io::Result<()>) {
    let mut written = 0;
    while written < data.len() {
        match sink.write(&data[written..]) {
            Ok(0) => {
                return (
                    written,
                    Err(io::Error::new(io::ErrorKind::WriteZero, "sink accepted no bytes")),
                )
            }
            Ok(n) => written += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return (written, Err(e)),
        }
    }
    (written, Ok(()))
}

impl<Sink, H, F> Write for ChecksummedWriter<Sink, H, F>
where
    Sink: Write,
    H: Hash32,
    F: Fn() -> H,
{
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if let Some(e) = self.poison.take() {
            return Err(e);
        }
        match self.write_content(buf) {
            Ok(n) => Ok(n),
            // Report the partial write and hand the sink error to the next call.
            Err(CheckstreamError::WriteFailed { written, source }) if written > 0 => {
                debug!("Sink failed after {} content bytes: {}", written, source);
                self.poison = Some(source);
                Ok(written)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        if let Some(e) = self.poison.take() {
            return Err(e);
        }
        let sink = self.sink.as_mut().ok_or(CheckstreamError::Closed)?;
        sink.flush()
    }
}

impl<Sink, H, F> Drop for ChecksummedWriter<Sink, H, F>
where
    Sink: Write,
    H: Hash32,
    F: Fn() -> H,
{
    fn drop(&mut self) {
        if let Some(mut sink) = self.sink.take() {
            if let Err(e) = self.finish(&mut sink) {
                error!("Failed to finish checksummed writer on drop: {}", e);
            }
        }
    }
}
