//! Device and update configuration
//!
//! This module contains the compiled-in parameters the update engine runs
//! against. It includes:
//! - Session credential types shared with the radio stack
//! - The flash layout of the update, handoff and delta regions
//! - Identity values a signed update header must carry

/// Session credentials
pub mod device;

pub use device::{AESKey, Credentials, DevAddr};

/// Length of a SEC1 uncompressed P-256 public key
pub const PUBLIC_KEY_LEN: usize = 65;

/// Byte offsets of the regions the update engine uses on the block device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FlashLayout {
    /// Start of the region fragments are reconstructed into
    pub update_offset: u64,
    /// Location of the update handoff record read by the bootloader
    pub handoff_offset: u64,
    /// Copy of the running firmware a delta applies against
    pub diff_source_offset: u64,
    /// Region a patched image is written to
    pub diff_target_offset: u64,
}

impl FlashLayout {
    /// Build a layout from page numbers of a device with `page_size` pages
    pub const fn from_pages(
        page_size: u64,
        update_page: u64,
        handoff_page: u64,
        diff_source_page: u64,
        diff_target_page: u64,
    ) -> Self {
        Self {
            update_offset: update_page * page_size,
            handoff_offset: handoff_page * page_size,
            diff_source_offset: diff_source_page * page_size,
            diff_target_offset: diff_target_page * page_size,
        }
    }
}

impl Default for FlashLayout {
    fn default() -> Self {
        // AT45 with 528-byte pages
        Self::from_pages(528, 1, 0, 1600, 3200)
    }
}

/// Update engine configuration
#[derive(Debug, Clone)]
pub struct FotaConfig {
    /// Flash layout
    pub layout: FlashLayout,
    /// Manufacturer UUID an update header must carry
    pub manufacturer_uuid: [u8; 16],
    /// Device class UUID an update header must carry
    pub device_class_uuid: [u8; 16],
    /// Trusted update signing key (SEC1 encoded)
    pub public_key: [u8; PUBLIC_KEY_LEN],
    /// Uplink port allowed while the Class C window is open
    pub control_port: u8,
    /// Redundancy packets the reconstruction engine reserves memory for
    pub max_redundancy: u8,
    /// Link check period restored in Class A (uplinks)
    pub link_check_count: u8,
    /// Failed link checks before the stack reports disconnect
    pub link_check_threshold: u8,
}

impl FotaConfig {
    /// Create a configuration for a device identity and signing key
    pub fn new(
        manufacturer_uuid: [u8; 16],
        device_class_uuid: [u8; 16],
        public_key: [u8; PUBLIC_KEY_LEN],
    ) -> Self {
        Self {
            layout: FlashLayout::default(),
            manufacturer_uuid,
            device_class_uuid,
            public_key,
            control_port: 5,
            max_redundancy: 40,
            link_check_count: 3,
            link_check_threshold: 5,
        }
    }

    /// Replace the flash layout
    pub fn with_layout(mut self, layout: FlashLayout) -> Self {
        self.layout = layout;
        self
    }
}
