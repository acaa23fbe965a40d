// Copyright 2024
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Checkstream embeds periodic integrity checksums into byte streams.
//!
//! A [`ChecksummedWriter`] interleaves a 4-byte digest after every block of
//! content it writes. A [`ChecksummedReader`] strips those digests on read,
//! seeks by content offset, and verifies individual blocks on demand. The two
//! only share the byte layout described in [`blocks`]; the interval and hash
//! construction must match on both sides.
//!
//! ```
//! use std::io::{Cursor, Read};
//! use checkstream::{ChecksummedReader, ChecksummedReaderConfig};
//! use checkstream::{ChecksummedWriter, ChecksummedWriterConfig};
//!
//! let config = ChecksummedWriterConfig::with_interval(16)?;
//! let mut writer = ChecksummedWriter::with_config(Vec::new(), config)?;
//! writer.write_content(b"some content spanning two blocks")?;
//! let stream = writer.into_inner()?;
//!
//! let config = ChecksummedReaderConfig::with_interval(16)?;
//! let mut reader = ChecksummedReader::with_config(Cursor::new(stream), config)?;
//! assert!(reader.verify()?);
//! let mut content = Vec::new();
//! reader.read_to_end(&mut content)?;
//! assert_eq!(content, b"some content spanning two blocks");
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod blocks;
pub mod error;
pub mod hash;


pub use blocks::reader::{ChecksummedReader, ChecksummedReaderConfig};
pub use blocks::writer::{ChecksummedWriter, ChecksummedWriterConfig};
pub use error::{CheckstreamError, Result};
pub use hash::{Hash32, Highway32};
