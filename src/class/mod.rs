//! Device class management for multicast delivery
//!
//! This module contains:
//! - Class C: multicast group setup and receive window scheduling
//! - Switch: the Class A/C orchestrator that swaps sessions on the stack

/// Multicast group and Class C session manager
pub mod class_c;
pub use class_c::{MulticastGroupManager, MulticastGroupParams};

/// Class A/C switch orchestrator
pub mod switch;
pub use switch::ClassSwitch;

/// Device operating mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum OperatingMode {
    /// Class A: uplink followed by two short receive windows
    ClassA,
    /// Class C: continuous receive on the multicast session
    ClassC,
}
