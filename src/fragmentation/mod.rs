//! Fragmentation session lifecycle
//!
//! This module contains:
//! - The reconstruction engine interface ([`FragmentEngine`], [`EngineFactory`])
//! - The per-session configuration built from a setup request
//! - The session controller in [`session`]

use core::fmt;

use crate::storage::{BlockDevice, Region};

/// Session controller state machine
pub mod session;

pub use session::{FragmentOutcome, FragmentationController, SessionState};

/// Reconstruction engine results other than plain success
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FragError {
    /// The image is fully reconstructed
    Complete,
    /// Fragment length differs from the session's fragment size
    SizeIncorrect,
    /// Writing to flash failed
    FlashWrite,
    /// Not enough memory for the session's matrices
    NoMemory,
    /// Frame counter outside the session
    InvalidCounter,
}

impl fmt::Display for FragError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FragError::Complete => write!(f, "complete"),
            FragError::SizeIncorrect => write!(f, "fragment size incorrect"),
            FragError::FlashWrite => write!(f, "flash write error"),
            FragError::NoMemory => write!(f, "out of memory"),
            FragError::InvalidCounter => write!(f, "frame counter out of range"),
        }
    }
}

/// Parameters of one fragmentation session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FragmentationSessionConfig {
    /// Session index
    pub session_id: u8,
    /// Number of uncoded fragments
    pub fragment_count: u16,
    /// Bytes per fragment
    pub fragment_size: u8,
    /// Coding scheme
    pub encoding: u8,
    /// Padding bytes in the last fragment
    pub padding: u8,
    /// Redundancy packets the engine reserves memory for
    pub redundancy: u8,
    /// Start of the reconstruction region
    pub flash_offset: u64,
}

impl FragmentationSessionConfig {
    /// Length of the reconstructed image
    pub fn image_size(&self) -> u64 {
        (self.fragment_count as u64 * self.fragment_size as u64).saturating_sub(self.padding as u64)
    }

    /// Region the image is reconstructed into
    pub fn region(&self) -> Region {
        Region::new(self.flash_offset, self.image_size())
    }
}

/// Erasure-coding reconstruction engine for one session
///
/// The engine writes fragments into the configured region. The block device
/// is lent to each call.
pub trait FragmentEngine {
    /// Prepare the session; fails with [`FragError::NoMemory`] when it cannot
    fn initialize<B: BlockDevice + ?Sized>(&mut self, flash: &mut B) -> Result<(), FragError>;

    /// Feed one frame; `Err(FragError::Complete)` once the image is whole
    fn process_frame<B: BlockDevice + ?Sized>(
        &mut self,
        flash: &mut B,
        counter: u16,
        data: &[u8],
    ) -> Result<(), FragError>;

    /// Frames missed so far
    fn lost_frame_count(&self) -> u32;
}

/// Creates a fresh engine per session
pub trait EngineFactory {
    /// Engine type produced
    type Engine: FragmentEngine;

    /// Build an engine bound to `config`
    fn create(&mut self, config: &FragmentationSessionConfig) -> Self::Engine;
}
