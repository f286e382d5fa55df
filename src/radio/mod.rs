//! Radio stack abstraction
//!
//! The MAC and PHY layers live outside this crate. The update engine only
//! needs the narrow control surface in [`traits::LoRaWanStack`].

/// LoRaWAN stack interface
pub mod traits;

pub use traits::LoRaWanStack;
