//! Block device abstraction
//!
//! The update engine reads and programs the external flash through this
//! byte-addressed interface. Erase management is the implementation's job.

/// Byte-addressed storage backing the update regions
pub trait BlockDevice {
    /// Error type for storage operations
    type Error: core::fmt::Debug;

    /// Read `buf.len()` bytes starting at `offset`
    fn read(&mut self, buf: &mut [u8], offset: u64) -> Result<(), Self::Error>;

    /// Program `buf` starting at `offset`
    fn program(&mut self, buf: &[u8], offset: u64) -> Result<(), Self::Error>;
}

impl<T: BlockDevice + ?Sized> BlockDevice for &mut T {
    type Error = T::Error;

    fn read(&mut self, buf: &mut [u8], offset: u64) -> Result<(), Self::Error> {
        (**self).read(buf, offset)
    }

    fn program(&mut self, buf: &[u8], offset: u64) -> Result<(), Self::Error> {
        (**self).program(buf, offset)
    }
}

/// A contiguous byte range on the block device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Region {
    /// First byte of the region
    pub offset: u64,
    /// Length in bytes
    pub len: u64,
}

impl Region {
    /// Create a region
    pub const fn new(offset: u64, len: u64) -> Self {
        Self { offset, len }
    }

    /// One past the last byte
    pub const fn end(&self) -> u64 {
        self.offset + self.len
    }

    /// Visit the region in chunks of at most `N` bytes
    pub fn for_each_chunk<B, const N: usize, F>(&self, flash: &mut B, mut f: F) -> Result<(), B::Error>
    where
        B: BlockDevice + ?Sized,
        F: FnMut(&[u8]),
    {
        let mut buf = [0u8; N];
        let mut pos = self.offset;
        while pos < self.end() {
            let n = ((self.end() - pos) as usize).min(N);
            flash.read(&mut buf[..n], pos)?;
            f(&buf[..n]);
            pos += n as u64;
        }
        Ok(())
    }
}
