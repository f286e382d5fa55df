//! File-like stream over a block device region
//!
//! Delta patchers are written against a seekable byte stream. A [`BdFile`]
//! only tracks a window and a cursor; the block device is passed to each
//! call so several streams can share one device.

use crate::storage::{BlockDevice, Region};

/// Seek origin
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekFrom {
    /// From the start of the region
    Start(u64),
    /// From the cursor
    Current(i64),
    /// From the end of the region
    End(i64),
}

/// Stream errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BdFileError<E> {
    /// Block device failure
    Storage(E),
    /// Seek before the start or past the end
    InvalidSeek,
}

/// Seekable stream over a region of a block device
///
/// Reads stop at the region end. Writes past the end grow the region,
/// which is how a patch target of unknown length is produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BdFile {
    offset: u64,
    size: u64,
    pos: u64,
}

impl BdFile {
    /// Open a stream over `region` with the cursor at its start
    pub fn new(region: Region) -> Self {
        Self {
            offset: region.offset,
            size: region.len,
            pos: 0,
        }
    }

    /// Current region, including anything written past its initial end
    pub fn region(&self) -> Region {
        Region::new(self.offset, self.size)
    }

    /// Cursor position relative to the region start
    pub fn tell(&self) -> u64 {
        self.pos
    }

    /// Region length
    pub fn len(&self) -> u64 {
        self.size
    }

    /// Whether the region is empty
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Move the cursor
    pub fn seek<E>(&mut self, pos: SeekFrom) -> Result<u64, BdFileError<E>> {
        let target = match pos {
            SeekFrom::Start(n) => Some(n),
            SeekFrom::Current(d) => self.pos.checked_add_signed(d),
            SeekFrom::End(d) => self.size.checked_add_signed(d),
        };
        match target {
            Some(n) if n <= self.size => {
                self.pos = n;
                Ok(n)
            }
            _ => Err(BdFileError::InvalidSeek),
        }
    }

    /// Read one byte, `None` at the end of the region
    pub fn getc<B: BlockDevice + ?Sized>(
        &mut self,
        flash: &mut B,
    ) -> Result<Option<u8>, BdFileError<B::Error>> {
        if self.pos >= self.size {
            return Ok(None);
        }
        let mut byte = [0u8; 1];
        flash
            .read(&mut byte, self.offset + self.pos)
            .map_err(BdFileError::Storage)?;
        self.pos += 1;
        Ok(Some(byte[0]))
    }

    /// Write one byte at the cursor
    pub fn putc<B: BlockDevice + ?Sized>(
        &mut self,
        flash: &mut B,
        byte: u8,
    ) -> Result<(), BdFileError<B::Error>> {
        self.write(flash, &[byte]).map(|_| ())
    }

    /// Read up to `buf.len()` bytes, returning how many were read
    pub fn read<B: BlockDevice + ?Sized>(
        &mut self,
        flash: &mut B,
        buf: &mut [u8],
    ) -> Result<usize, BdFileError<B::Error>> {
        let n = (self.size - self.pos).min(buf.len() as u64) as usize;
        if n == 0 {
            return Ok(0);
        }
        flash
            .read(&mut buf[..n], self.offset + self.pos)
            .map_err(BdFileError::Storage)?;
        self.pos += n as u64;
        Ok(n)
    }

    /// Write all of `buf` at the cursor
    pub fn write<B: BlockDevice + ?Sized>(
        &mut self,
        flash: &mut B,
        buf: &[u8],
    ) -> Result<usize, BdFileError<B::Error>> {
        flash
            .program(buf, self.offset + self.pos)
            .map_err(BdFileError::Storage)?;
        self.pos += buf.len() as u64;
        self.size = self.size.max(self.pos);
        Ok(buf.len())
    }
}
