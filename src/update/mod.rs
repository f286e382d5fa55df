//! Verification and handoff of a reconstructed image
//!
//! This module provides:
//! - The signed image header and the bootloader handoff record
//! - A region stream for delta patch engines
//! - The hard-gated pipeline that marks an image pending and resets

/// Region stream over the block device
pub mod bdfile;

/// Bootloader handoff record
pub mod handoff;

/// Signed image header
pub mod header;

/// Verification pipeline
pub mod pipeline;

pub use bdfile::{BdFile, BdFileError, SeekFrom};
pub use handoff::{UpdateHandoffRecord, MAGIC};
pub use header::UpdateSignatureHeader;
pub use pipeline::{PatchEngine, PatchError, UpdatePipeline, VerifyError};

/// Length of the signed header in front of every image
pub const HEADER_LEN: usize = UpdateSignatureHeader::LEN;

/// System reset line
pub trait SystemReset {
    /// Reset the device; on hardware this does not return
    fn reset(&mut self);
}
