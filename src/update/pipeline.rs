//! Verification pipeline from reconstructed image to pending update

use core::fmt;

use super::handoff::UpdateHandoffRecord;
use super::header::UpdateSignatureHeader;
use super::{SystemReset, HEADER_LEN};
use crate::config::{FlashLayout, FotaConfig};
use crate::crypto::{self, SignatureVerifier};
use crate::storage::{BlockDevice, Region};

/// Delta patch failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PatchError {
    /// Reading the previous image failed
    SourceRead,
    /// Reading the delta failed
    DiffRead,
    /// Writing the patched image failed
    TargetWrite,
    /// The delta is not a valid patch for the source
    Corrupt,
}

impl fmt::Display for PatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatchError::SourceRead => write!(f, "failed to read source image"),
            PatchError::DiffRead => write!(f, "failed to read delta"),
            PatchError::TargetWrite => write!(f, "failed to write patched image"),
            PatchError::Corrupt => write!(f, "corrupt delta"),
        }
    }
}

/// Applies a binary delta between flash regions
pub trait PatchEngine {
    /// Patch `source` with `diff`, writing the result from `target_offset`
    ///
    /// Returns the length of the patched image.
    fn apply<B: BlockDevice + ?Sized>(
        &mut self,
        flash: &mut B,
        source: Region,
        diff: Region,
        target_offset: u64,
    ) -> Result<usize, PatchError>;
}

/// Reasons the pipeline refused an image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum VerifyError<E> {
    /// Block device failure
    Storage(E),
    /// No provisional record on flash
    NoRecord,
    /// Header signature length out of range
    InvalidHeader,
    /// Recorded offset leaves no room for the header
    InvalidOffset,
    /// Manufacturer UUID differs from this device's
    ManufacturerMismatch,
    /// Device class UUID differs from this device's
    DeviceClassMismatch,
    /// Delta patch failed
    Patch(PatchError),
    /// Signature does not verify against the trusted key
    SignatureInvalid,
}

impl<E> From<PatchError> for VerifyError<E> {
    fn from(error: PatchError) -> Self {
        VerifyError::Patch(error)
    }
}

impl<E: fmt::Debug> fmt::Display for VerifyError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VerifyError::Storage(e) => write!(f, "storage error: {:?}", e),
            VerifyError::NoRecord => write!(f, "no handoff record"),
            VerifyError::InvalidHeader => write!(f, "invalid signature header"),
            VerifyError::InvalidOffset => write!(f, "image offset inside header area"),
            VerifyError::ManufacturerMismatch => write!(f, "manufacturer UUID does not match"),
            VerifyError::DeviceClassMismatch => write!(f, "device class UUID does not match"),
            VerifyError::Patch(e) => write!(f, "delta patch failed: {}", e),
            VerifyError::SignatureInvalid => write!(f, "signature verification failed"),
        }
    }
}

/// Turns a reconstructed image into a pending update
///
/// Each step gates the next. The handoff record is only marked pending
/// after the signature verified, and the reset follows immediately.
pub struct UpdatePipeline<P, V> {
    layout: FlashLayout,
    manufacturer_uuid: [u8; 16],
    device_class_uuid: [u8; 16],
    patch: P,
    verifier: V,
}

impl<P: PatchEngine, V: SignatureVerifier> UpdatePipeline<P, V> {
    /// Create a pipeline for the device identity in `config`
    pub fn new(config: &FotaConfig, patch: P, verifier: V) -> Self {
        Self {
            layout: config.layout,
            manufacturer_uuid: config.manufacturer_uuid,
            device_class_uuid: config.device_class_uuid,
            patch,
            verifier,
        }
    }

    /// Patch engine
    pub fn patch_engine(&self) -> &P {
        &self.patch
    }

    /// Signature verifier
    pub fn verifier(&self) -> &V {
        &self.verifier
    }

    /// Verify the image, mark it pending and reset
    ///
    /// Returns only on failure on hardware; the pending record is returned
    /// when `reset` comes back.
    pub fn run<B, R>(
        &mut self,
        flash: &mut B,
        reset: &mut R,
    ) -> Result<UpdateHandoffRecord, VerifyError<B::Error>>
    where
        B: BlockDevice + ?Sized,
        R: SystemReset,
    {
        let record = self.verify(flash)?;

        flash
            .program(&record.to_bytes(), self.layout.handoff_offset)
            .map_err(VerifyError::Storage)?;
        log::info!(
            "Update of {} bytes at {:#x} pending, resetting",
            record.size,
            record.offset
        );

        reset.reset();
        Ok(record)
    }

    /// Run every check and build the final record without writing it
    pub fn verify<B>(&mut self, flash: &mut B) -> Result<UpdateHandoffRecord, VerifyError<B::Error>>
    where
        B: BlockDevice + ?Sized,
    {
        let mut buf = [0u8; UpdateHandoffRecord::LEN];
        flash
            .read(&mut buf, self.layout.handoff_offset)
            .map_err(VerifyError::Storage)?;
        let mut record = UpdateHandoffRecord::from_bytes(&buf);
        if !record.is_valid() {
            return Err(VerifyError::NoRecord);
        }

        let header_offset = record
            .offset
            .checked_sub(HEADER_LEN as u64)
            .ok_or(VerifyError::InvalidOffset)?;
        let mut raw = [0u8; HEADER_LEN];
        flash
            .read(&mut raw, header_offset)
            .map_err(VerifyError::Storage)?;
        let header = UpdateSignatureHeader::from_bytes(&raw).ok_or(VerifyError::InvalidHeader)?;

        if header.manufacturer_uuid != self.manufacturer_uuid {
            return Err(VerifyError::ManufacturerMismatch);
        }
        if header.device_class_uuid != self.device_class_uuid {
            return Err(VerifyError::DeviceClassMismatch);
        }

        if header.is_diff() {
            let source = Region::new(self.layout.diff_source_offset, header.previous_size() as u64);
            let diff = Region::new(record.offset, record.size as u64);
            log::info!(
                "Applying delta of {} bytes against {} byte image",
                diff.len,
                source.len
            );
            let len = self
                .patch
                .apply(flash, source, diff, self.layout.diff_target_offset)?;
            record.offset = self.layout.diff_target_offset;
            record.size = len as u32;
            log::debug!("Patched image is {} bytes", len);
        }

        let image = Region::new(record.offset, record.size as u64);
        let hash = crypto::sha256_region(flash, image).map_err(VerifyError::Storage)?;

        if !self.verifier.verify(&hash, header.signature()) {
            return Err(VerifyError::SignatureInvalid);
        }
        log::info!("Image signature verified");

        record.pending = true;
        record.sha256 = hash;
        Ok(record)
    }
}
