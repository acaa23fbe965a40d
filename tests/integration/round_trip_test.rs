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

//! Integration tests writing checksummed streams to files and reading them back.

use std::fs::File;
use std::io::{self, BufWriter, Read, Seek, SeekFrom, Write};

use tempfile::NamedTempFile;

use checkstream::blocks::utils::framed_len;
use checkstream::error::Result;
use checkstream::{
    ChecksummedReader, ChecksummedReaderConfig, ChecksummedWriter, ChecksummedWriterConfig,
};

fn test_content(len: usize) -> Vec<u8> {
    (0..len).map(|i| ((i * 31 + i / 7) % 256) as u8).collect()
}

/// Writes `content` to a temp file through a buffered sink.
fn write_to_file(content: &[u8], interval: u64) -> Result<NamedTempFile> {
    let file = NamedTempFile::new()?;
    let config = ChecksummedWriterConfig::with_interval(interval)?;
    let mut writer = ChecksummedWriter::with_config(BufWriter::new(file.reopen()?), config)?;

    for piece in content.chunks(1000) {
        writer.write_content(piece)?;
    }
    writer.close()?;

    Ok(file)
}

fn open_file(file: &NamedTempFile, interval: u64) -> Result<ChecksummedReader<File>> {
    let config = ChecksummedReaderConfig::with_interval(interval)?;
    ChecksummedReader::with_config(file.reopen()?, config)
}

#[test]
fn test_file_round_trip() -> Result<()> {
    let content = test_content(100_000);
    let file = write_to_file(&content, 4096)?;

    assert_eq!(
        file.as_file().metadata()?.len(),
        framed_len(content.len() as u64, 4096)
    );

    let mut reader = open_file(&file, 4096)?;
    let mut read = Vec::new();
    reader.read_to_end(&mut read)?;
    assert_eq!(read, content);

    Ok(())
}

#[test]
fn test_default_interval_file_round_trip() -> Result<()> {
    let content = test_content(200_000);
    let file = NamedTempFile::new()?;

    let mut writer = ChecksummedWriter::new(file.reopen()?)?;
    io::copy(&mut content.as_slice(), &mut writer)?;
    writer.close()?;

    let mut reader = ChecksummedReader::new(file.reopen()?)?;
    let mut read = Vec::new();
    io::copy(&mut reader, &mut read)?;
    assert_eq!(read, content);

    // Every 64 KiB block, including the partial last one, carries a valid digest.
    for block_start in (0..content.len() as u64).step_by(1 << 16) {
        reader.seek_to(SeekFrom::Start(block_start))?;
        assert!(reader.verify()?);
    }

    Ok(())
}

#[test]
fn test_file_seeks() -> Result<()> {
    let content = test_content(10_000);
    let file = write_to_file(&content, 256)?;
    let mut reader = open_file(&file, 256)?;

    for target in [0usize, 255, 256, 257, 5000, 9_999] {
        reader.seek(SeekFrom::Start(target as u64))?;
        let mut buf = [0u8; 1];
        reader.read_exact(&mut buf)?;
        assert_eq!(buf[0], content[target], "Wrong byte at {}", target);
    }

    assert_eq!(reader.seek(SeekFrom::End(-10))?, 9_990);
    let mut tail = Vec::new();
    reader.read_to_end(&mut tail)?;
    assert_eq!(tail, &content[9_990..]);

    assert_eq!(reader.seek(SeekFrom::Current(-100))?, 9_900);
    assert_eq!(reader.logical_position()?, 9_900);

    Ok(())
}

#[test]
fn test_writer_over_borrowed_file() -> Result<()> {
    let content = test_content(3000);
    let mut file = NamedTempFile::new()?;

    {
        let config = ChecksummedWriterConfig::with_interval(512)?;
        let mut writer = ChecksummedWriter::with_config(file.as_file_mut(), config)?;
        writer.write_all(&content)?;
        writer.flush()?;
        // Dropping the writer emits the final digest.
    }

    let mut reader = open_file(&file, 512)?;
    let mut read = Vec::new();
    reader.read_to_end(&mut read)?;
    assert_eq!(read, content);

    Ok(())
}
