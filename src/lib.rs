//! LoRaWAN firmware-over-the-air update engine
//!
//! This crate implements the device side of multicast firmware delivery for
//! LoRaWAN end-devices. It receives fragments over a Class C multicast
//! session, reconstructs the image on external flash, verifies its signed
//! header and hands it to the bootloader.
//!
//! # Features
//! - Multicast group setup with session key derivation
//! - Class C window scheduling against the uplink history
//! - Fragmentation session lifecycle over a pluggable reconstruction engine
//! - SHA-256 / ECDSA P-256 verification with optional delta patching
//! - `no_std`, no heap, no unsafe code
//!
//! # Example
//! ```ignore
//! use lorawan_fota::{
//!     config::FotaConfig,
//!     crypto::P256Verifier,
//!     device::{Event, FotaDevice},
//! };
//!
//! let config = FotaConfig::new(MANUFACTURER_UUID, DEVICE_CLASS_UUID, PUBLIC_KEY);
//! let verifier = P256Verifier::new(config.public_key);
//! let mut device = FotaDevice::new(config, stack, flash, engines, patcher, verifier, reset);
//!
//! // Feed downlinks and poll timers from the main loop
//! device.handle_event(Event::DownlinkReceived { port, payload }, now)?;
//! device.poll(now)?;
//!
//! // Drain acknowledgements
//! if let Some(uplink) = device.next_uplink()? {
//!     let sent = stack.send(uplink.port, &uplink.payload, uplink.confirmed());
//!     device.complete_uplink(sent);
//! }
//! ```

#![warn(missing_docs)]
#![no_std]

/// Multicast group and Class A/C management
pub mod class;

/// Engine configuration
pub mod config;

/// Cryptographic functions
pub mod crypto;

/// Update engine context
pub mod device;

/// Downlink command routing
pub mod dispatcher;

/// Fragmentation session lifecycle
pub mod fragmentation;

/// Control protocol wire format
pub mod protocol;

/// LoRaWAN stack abstraction
pub mod radio;

/// Companion MCU serial relay
pub mod relay;

/// Block device abstraction
pub mod storage;

/// Scheduled events
pub mod timer;

/// Image verification and bootloader handoff
pub mod update;

/// Uplink history and queue
pub mod uplink;
