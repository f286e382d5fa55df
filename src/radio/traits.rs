use crate::class::OperatingMode;
use crate::config::device::Credentials;

/// Interface to the LoRaWAN MAC/PHY stack the update engine drives
///
/// The engine never builds frames itself. It swaps the active session,
/// moves the receive window and toggles the device class through this trait.
pub trait LoRaWanStack {
    /// Error type for stack operations
    type Error: core::fmt::Debug;

    /// Snapshot of the currently active session, including frame counters
    fn session(&self) -> Credentials;

    /// Replace the active session keys, address, data rates and counters
    fn install_session(&mut self, credentials: &Credentials) -> Result<(), Self::Error>;

    /// Set the RX2 / continuous receive frequency (Hz) and data rate
    fn configure_rx2(&mut self, frequency: u32, datarate: u8) -> Result<(), Self::Error>;

    /// Configure periodic link checks; zero disables them
    fn set_link_check(&mut self, count: u8, threshold: u8) -> Result<(), Self::Error>;

    /// Change the device class
    fn set_class(&mut self, mode: OperatingMode) -> Result<(), Self::Error>;
}
