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

//! Integration tests for detecting corruption in files on disk.

use std::fs::OpenOptions;
use std::io::{Read, Seek, SeekFrom, Write};

use tempfile::NamedTempFile;

use checkstream::blocks::utils::{framed_len, logical_to_physical};
use checkstream::error::Result;
use checkstream::{
    ChecksummedReader, ChecksummedReaderConfig, ChecksummedWriter, ChecksummedWriterConfig,
};

const INTERVAL: u64 = 1024;

fn write_file(content: &[u8]) -> Result<NamedTempFile> {
    let file = NamedTempFile::new()?;
    let config = ChecksummedWriterConfig::with_interval(INTERVAL)?;
    let mut writer = ChecksummedWriter::with_config(file.reopen()?, config)?;
    writer.write_content(content)?;
    writer.close()?;
    Ok(file)
}

/// Flips every bit of the byte at physical offset `offset`.
fn corrupt_byte(file: &NamedTempFile, offset: u64) -> Result<()> {
    let mut handle = OpenOptions::new().read(true).write(true).open(file.path())?;
    handle.seek(SeekFrom::Start(offset))?;
    let mut byte = [0u8; 1];
    handle.read_exact(&mut byte)?;
    handle.seek(SeekFrom::Start(offset))?;
    handle.write_all(&[!byte[0]])?;
    handle.sync_all()?;
    Ok(())
}

fn verify_blocks(file: &NamedTempFile, content_len: usize) -> Result<Vec<bool>> {
    let config = ChecksummedReaderConfig::with_interval(INTERVAL)?;
    let mut reader = ChecksummedReader::with_config(file.reopen()?, config)?;

    let mut results = Vec::new();
    for block_start in (0..content_len as u64).step_by(INTERVAL as usize) {
        reader.seek_to(SeekFrom::Start(block_start))?;
        results.push(reader.verify()?);
    }
    Ok(results)
}

#[test]
fn test_corrupt_content_fails_only_its_block() -> Result<()> {
    let content: Vec<u8> = (0..5000u32).map(|i| (i % 253) as u8).collect();
    let file = write_file(&content)?;
    assert_eq!(verify_blocks(&file, content.len())?, vec![true; 5]);

    corrupt_byte(&file, logical_to_physical(2500, INTERVAL).unwrap())?;
    assert_eq!(
        verify_blocks(&file, content.len())?,
        vec![true, true, false, true, true]
    );

    // Reads do not verify: the damaged byte comes back as stored.
    let config = ChecksummedReaderConfig::with_interval(INTERVAL)?;
    let mut reader = ChecksummedReader::with_config(file.reopen()?, config)?;
    let mut read = Vec::new();
    reader.read_to_end(&mut read)?;
    assert_eq!(read.len(), content.len());
    assert_eq!(read[2500], !content[2500]);
    assert_eq!(&read[..2500], &content[..2500]);
    assert_eq!(&read[2501..], &content[2501..]);

    Ok(())
}

#[test]
fn test_corrupt_digest_fails_its_block() -> Result<()> {
    let content = vec![0xA5u8; 3000];
    let file = write_file(&content)?;

    // First digest byte of the second block.
    corrupt_byte(&file, 2 * INTERVAL + 4)?;
    assert_eq!(verify_blocks(&file, content.len())?, vec![true, false, true]);

    // The trailing digest of the partial last block.
    corrupt_byte(&file, framed_len(3000, INTERVAL) - 1)?;
    assert_eq!(verify_blocks(&file, content.len())?, vec![true, false, false]);

    Ok(())
}

#[test]
fn test_verify_keeps_read_position() -> Result<()> {
    let content: Vec<u8> = (0..2048u32).map(|i| (i * 3 % 256) as u8).collect();
    let file = write_file(&content)?;
    corrupt_byte(&file, 10)?;

    let config = ChecksummedReaderConfig::with_interval(INTERVAL)?;
    let mut reader = ChecksummedReader::with_config(file.reopen()?, config)?;

    let mut head = vec![0u8; 100];
    reader.read_exact(&mut head)?;
    assert!(!reader.verify()?);
    assert_eq!(reader.logical_position()?, 100);

    let mut rest = Vec::new();
    reader.read_to_end(&mut rest)?;
    assert_eq!(&rest[..], &content[100..]);

    Ok(())
}
