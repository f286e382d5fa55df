//! Class A/C switch orchestrator
//!
//! The device lives in Class A. A scheduled multicast window moves it to
//! Class C on the group's session; the window closes on the revert timer
//! or as soon as a fragmentation session completes.

use super::OperatingMode;
use crate::config::device::Credentials;
use crate::radio::LoRaWanStack;
use crate::timer::{Timer, Timestamp};

/// Owns the Class A snapshot and the Class C revert timer
#[derive(Debug)]
pub struct ClassSwitch {
    mode: OperatingMode,
    class_a: Option<Credentials>,
    revert_timer: Timer,
    cancel_duration: u32,
    link_check_count: u8,
    link_check_threshold: u8,
}

impl ClassSwitch {
    /// Create an orchestrator in Class A
    ///
    /// `link_check_count` and `link_check_threshold` are restored on every
    /// return to Class A.
    pub fn new(link_check_count: u8, link_check_threshold: u8) -> Self {
        Self {
            mode: OperatingMode::ClassA,
            class_a: None,
            revert_timer: Timer::new(),
            cancel_duration: 0,
            link_check_count,
            link_check_threshold,
        }
    }

    /// Current operating mode
    pub fn mode(&self) -> OperatingMode {
        self.mode
    }

    /// Last Class A session snapshot
    pub fn class_a_credentials(&self) -> Option<&Credentials> {
        self.class_a.as_ref()
    }

    /// Record the Class A session, e.g. after a successful join
    pub fn update_class_a_credentials(&mut self, credentials: Credentials) {
        self.class_a = Some(credentials);
    }

    /// Pending revert to Class A
    pub fn revert_timer(&self) -> &Timer {
        &self.revert_timer
    }

    /// Open the multicast window on `class_c`
    ///
    /// The live session is snapshotted first so it can be restored verbatim.
    /// If the stack rejects any step the Class A session is reinstalled and
    /// the mode stays Class A.
    pub fn enter_class_c<S: LoRaWanStack>(
        &mut self,
        stack: &mut S,
        class_c: &Credentials,
        cancel_duration: u32,
        now: Timestamp,
    ) -> Result<(), S::Error> {
        if self.mode == OperatingMode::ClassC {
            log::debug!("Already in Class C");
            return Ok(());
        }

        // A multicast session left live by a failed rollback is never a snapshot
        let live = stack.session();
        if !live.same_session(class_c) {
            self.class_a = Some(live);
        }

        if let Err(e) = Self::install_class_c(stack, class_c) {
            log::error!("Class C switch failed: {:?}", e);
            if let Err(rollback) = self.restore_class_a(stack) {
                log::error!("Class A rollback failed: {:?}", rollback);
            }
            return Err(e);
        }

        self.mode = OperatingMode::ClassC;
        self.cancel_duration = cancel_duration;
        self.revert_timer.arm(now, cancel_duration);

        log::info!("Switched to Class C for {} s", cancel_duration);
        Ok(())
    }

    /// Close the multicast window and restore the Class A session
    ///
    /// `class_c` receives the frame counters the multicast session reached.
    /// The restore runs whenever the live session is not the Class A one,
    /// whatever the mode. On failure the mode stays Class C so a retry
    /// restores the full configuration.
    pub fn enter_class_a<S: LoRaWanStack>(
        &mut self,
        stack: &mut S,
        class_c: Option<&mut Credentials>,
    ) -> Result<(), S::Error> {
        self.revert_timer.cancel();

        let live = stack.session();
        let restored = self
            .class_a
            .as_ref()
            .map_or(true, |class_a| class_a.same_session(&live));
        if self.mode == OperatingMode::ClassA && restored {
            return Ok(());
        }

        if let Some(class_c) = class_c {
            if class_c.same_session(&live) {
                class_c.sync_counters(&live);
            }
        }

        self.mode = OperatingMode::ClassC;
        self.restore_class_a(stack)?;

        self.mode = OperatingMode::ClassA;
        log::info!("Switched to Class A");
        Ok(())
    }

    fn install_class_c<S: LoRaWanStack>(stack: &mut S, class_c: &Credentials) -> Result<(), S::Error> {
        stack.install_session(class_c)?;
        stack.configure_rx2(class_c.rx2_frequency, class_c.rx_datarate)?;
        stack.set_link_check(0, 0)?;
        stack.set_class(OperatingMode::ClassC)
    }

    fn restore_class_a<S: LoRaWanStack>(&self, stack: &mut S) -> Result<(), S::Error> {
        match self.class_a {
            Some(ref class_a) => {
                stack.install_session(class_a)?;
                stack.configure_rx2(class_a.rx2_frequency, class_a.rx_datarate)?;
            }
            None => log::warn!("No Class A session to restore"),
        }
        stack.set_link_check(self.link_check_count, self.link_check_threshold)?;
        stack.set_class(OperatingMode::ClassA)
    }

    /// Keep the window open while downlink traffic arrives
    pub fn on_downlink(&mut self, now: Timestamp) {
        if self.mode == OperatingMode::ClassC {
            self.revert_timer.arm(now, self.cancel_duration);
        }
    }

    /// Returns true once when the window has been idle for its full duration
    pub fn poll_revert(&mut self, now: Timestamp) -> bool {
        self.revert_timer.poll(now)
    }

    /// Whether an uplink on `port` may be sent without leaving Class C
    pub fn uplink_allowed(&self, port: u8, control_port: u8) -> bool {
        self.mode == OperatingMode::ClassA || port == control_port
    }
}
