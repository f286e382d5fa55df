//! Power management for the update engine
//!
//! This module provides:
//! - The [`PowerControl`] capability the platform implements
//! - A power manager that only lets the device sleep in Class A
//! - Sleep accounting

use crate::class::OperatingMode;
use crate::timer::Timestamp;

/// Power consumption states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PowerState {
    /// Normal operation
    Active,
    /// Peripherals saved and low-power mode configured
    Sleeping,
}

/// Platform low-power hooks
pub trait PowerControl {
    /// Error type for power operations
    type Error: core::fmt::Debug;

    /// Save peripheral state that low-power mode loses
    fn save(&mut self) -> Result<(), Self::Error>;

    /// Put clocks and pins into their low-power configuration
    fn configure_low_power(&mut self) -> Result<(), Self::Error>;

    /// Restore the state captured by [`PowerControl::save`]
    fn restore(&mut self) -> Result<(), Self::Error>;
}

/// Sleep accounting
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PowerMetrics {
    /// Completed sleep periods
    pub sleep_count: u32,
    /// Seconds spent asleep
    pub sleep_time: u64,
    /// Sleep requests refused because Class C was active
    pub refused: u32,
}

/// Power manager gating sleep on the operating mode
///
/// Class C keeps the receiver open, so sleeping there would lose fragments.
pub struct PowerManager<P: PowerControl> {
    control: P,
    state: PowerState,
    metrics: PowerMetrics,
    asleep_since: Option<Timestamp>,
}

impl<P: PowerControl> PowerManager<P> {
    /// Create new power manager
    pub fn new(control: P) -> Self {
        Self {
            control,
            state: PowerState::Active,
            metrics: PowerMetrics::default(),
            asleep_since: None,
        }
    }

    /// Enter low-power mode if `mode` allows it
    ///
    /// Returns whether the device may now sleep.
    pub fn enter_sleep(&mut self, mode: OperatingMode, now: Timestamp) -> Result<bool, P::Error> {
        if self.state == PowerState::Sleeping {
            return Ok(true);
        }
        if mode != OperatingMode::ClassA {
            log::debug!("Staying awake in Class C");
            self.metrics.refused += 1;
            return Ok(false);
        }

        self.control.save()?;
        self.control.configure_low_power()?;
        self.state = PowerState::Sleeping;
        self.asleep_since = Some(now);
        Ok(true)
    }

    /// Leave low-power mode
    pub fn wake(&mut self, now: Timestamp) -> Result<(), P::Error> {
        if self.state != PowerState::Sleeping {
            return Ok(());
        }

        self.control.restore()?;
        self.state = PowerState::Active;
        if let Some(since) = self.asleep_since.take() {
            self.metrics.sleep_count += 1;
            self.metrics.sleep_time += now.saturating_sub(since);
        }
        Ok(())
    }

    /// Get current power state
    pub fn state(&self) -> PowerState {
        self.state
    }

    /// Get sleep accounting
    pub fn metrics(&self) -> &PowerMetrics {
        &self.metrics
    }

    /// Platform hooks
    pub fn control(&self) -> &P {
        &self.control
    }
}
