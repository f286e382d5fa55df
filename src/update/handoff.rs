//! Handoff record the bootloader reads to find a pending update

use crate::crypto::Sha256Hash;

/// Marks a handoff record written by this engine
pub const MAGIC: u32 = 0x1BEA_C000;

/// Record shared with the bootloader
///
/// Layout on flash, little-endian:
/// `pending:u8 | reserved:[u8;3] | offset:u64 | size:u32 | sha256:[u8;32] | magic:u32`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct UpdateHandoffRecord {
    /// Set only once the image is verified, right before reset
    pub pending: bool,
    /// First byte of the image on flash
    pub offset: u64,
    /// Image length in bytes
    pub size: u32,
    /// SHA-256 of the image, zero until verified
    pub sha256: Sha256Hash,
    /// Always [`MAGIC`] for records written here
    pub magic: u32,
}

impl UpdateHandoffRecord {
    /// Encoded length
    pub const LEN: usize = 52;

    /// Record written at reconstruction, before anything is verified
    pub fn provisional(offset: u64, size: u32) -> Self {
        Self {
            pending: false,
            offset,
            size,
            sha256: [0; 32],
            magic: MAGIC,
        }
    }

    /// Whether the record carries the expected magic
    pub fn is_valid(&self) -> bool {
        self.magic == MAGIC
    }

    /// Encode to the on-flash layout
    pub fn to_bytes(&self) -> [u8; Self::LEN] {
        let mut buf = [0u8; Self::LEN];
        buf[0] = self.pending as u8;
        buf[4..12].copy_from_slice(&self.offset.to_le_bytes());
        buf[12..16].copy_from_slice(&self.size.to_le_bytes());
        buf[16..48].copy_from_slice(&self.sha256);
        buf[48..52].copy_from_slice(&self.magic.to_le_bytes());
        buf
    }

    /// Decode from the on-flash layout
    pub fn from_bytes(buf: &[u8; Self::LEN]) -> Self {
        let mut offset = [0u8; 8];
        offset.copy_from_slice(&buf[4..12]);
        let mut sha256 = [0u8; 32];
        sha256.copy_from_slice(&buf[16..48]);
        Self {
            pending: buf[0] != 0,
            offset: u64::from_le_bytes(offset),
            size: u32::from_le_bytes([buf[12], buf[13], buf[14], buf[15]]),
            sha256,
            magic: u32::from_le_bytes([buf[48], buf[49], buf[50], buf[51]]),
        }
    }
}
