//! A tagged compressed-file reader: dispatches to plain, gzip, or bzip2
//! decompression chosen at construction from an explicit hint or a
//! magic-byte sniff, presenting callers with a single `Read` surface
//! instead of duck-typed format dispatch.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::Path;

use bzip2::read::BzDecoder;
use flate2::read::MultiGzDecoder;

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    Plain,
    Gzip,
    Bzip2,
}

impl Compression {
    /// Sniffs the compression format from a file's leading magic bytes.
    /// Falls back to `Plain` for anything unrecognized (including empty
    /// files) — content, not the file extension, decides how to read it.
    pub fn sniff(path: &Path) -> io::Result<Self> {
        let mut f = File::open(path)?;
        let mut magic = [0u8; 3];
        let n = f.read(&mut magic)?;
        Ok(if n >= 2 && magic[0] == 0x1f && magic[1] == 0x8b {
            Compression::Gzip
        } else if n >= 3 && &magic[0..3] == b"BZh" {
            Compression::Bzip2
        } else {
            Compression::Plain
        })
    }
}

/// A boxed, buffered byte stream over any of the three supported
/// compression formats. Every format variant exposes the same
/// `BufRead` surface so record readers never need to know which one
/// they're holding.
pub struct CompressedReader {
    inner: Box<dyn BufRead + Send>,
}

impl CompressedReader {
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with(path, None)
    }

    pub fn open_with(path: &Path, hint: Option<Compression>) -> Result<Self> {
        let compression = match hint {
            Some(c) => c,
            None => Compression::sniff(path)?,
        };
        let file = File::open(path)?;
        let inner: Box<dyn BufRead + Send> = match compression {
            Compression::Plain => Box::new(BufReader::new(file)),
            Compression::Gzip => Box::new(BufReader::new(MultiGzDecoder::new(file))),
            Compression::Bzip2 => Box::new(BufReader::new(BzDecoder::new(file))),
        };
        Ok(CompressedReader { inner })
    }
}

impl Read for CompressedReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl BufRead for CompressedReader {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        self.inner.fill_buf()
    }
    fn consume(&mut self, amt: usize) {
        self.inner.consume(amt)
    }
}
