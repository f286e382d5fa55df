//! Update engine context
//!
//! [`FotaDevice`] owns every piece of session state and all collaborators.
//! The application feeds it [`Event`]s and polls it with the current time;
//! acknowledgements come out of its uplink queue.

use core::fmt;

use heapless::Vec;

use crate::class::{ClassSwitch, MulticastGroupManager, OperatingMode};
use crate::config::device::Credentials;
use crate::config::FotaConfig;
use crate::crypto::SignatureVerifier;
use crate::dispatcher::{self, Action, DispatchContext};
use crate::fragmentation::{EngineFactory, FragmentationController};
use crate::protocol::MAX_DOWNLINK_PAYLOAD;
use crate::radio::LoRaWanStack;
use crate::storage::BlockDevice;
use crate::timer::Timestamp;
use crate::update::{PatchEngine, SystemReset, UpdatePipeline};
use crate::uplink::{Uplink, UplinkLedger, UplinkQueue, DEFAULT_LEDGER_CAPACITY, DEFAULT_QUEUE_DEPTH};

/// Power policy
pub mod power;

/// Inputs to the update engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Application downlink from the stack
    DownlinkReceived {
        /// Application port
        port: u8,
        /// Decrypted payload
        payload: Vec<u8, MAX_DOWNLINK_PAYLOAD>,
    },
    /// The scheduled Class C window opens
    ClassCSwitchDue,
    /// The Class C window has been idle long enough
    ClassCRevertDue,
    /// An uplink went out with this frame counter
    UplinkSent(u32),
}

/// Update engine error type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DeviceError<S> {
    /// LoRaWAN stack error
    Stack(S),
}

impl<S> From<S> for DeviceError<S> {
    fn from(error: S) -> Self {
        DeviceError::Stack(error)
    }
}

impl<S: fmt::Debug> fmt::Display for DeviceError<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceError::Stack(e) => write!(f, "stack error: {:?}", e),
        }
    }
}

/// Firmware update engine for one device
pub struct FotaDevice<
    S,
    B,
    F,
    P,
    V,
    R,
    const N: usize = DEFAULT_LEDGER_CAPACITY,
    const Q: usize = DEFAULT_QUEUE_DEPTH,
> where
    S: LoRaWanStack,
    B: BlockDevice,
    F: EngineFactory,
    P: PatchEngine,
    V: SignatureVerifier,
    R: SystemReset,
{
    config: FotaConfig,
    stack: S,
    flash: B,
    reset: R,
    ledger: UplinkLedger<N>,
    groups: MulticastGroupManager,
    fragmentation: FragmentationController<F>,
    pipeline: UpdatePipeline<P, V>,
    switch: ClassSwitch,
    uplinks: UplinkQueue<Q>,
}

impl<S, B, F, P, V, R, const N: usize, const Q: usize> FotaDevice<S, B, F, P, V, R, N, Q>
where
    S: LoRaWanStack,
    B: BlockDevice,
    F: EngineFactory,
    P: PatchEngine,
    V: SignatureVerifier,
    R: SystemReset,
{
    /// Create the engine in Class A with no sessions
    pub fn new(config: FotaConfig, stack: S, flash: B, factory: F, patch: P, verifier: V, reset: R) -> Self {
        let fragmentation = FragmentationController::new(factory, &config);
        let pipeline = UpdatePipeline::new(&config, patch, verifier);
        let switch = ClassSwitch::new(config.link_check_count, config.link_check_threshold);
        Self {
            config,
            stack,
            flash,
            reset,
            ledger: UplinkLedger::new(),
            groups: MulticastGroupManager::new(),
            fragmentation,
            pipeline,
            switch,
            uplinks: UplinkQueue::new(),
        }
    }

    /// Handle one event
    pub fn handle_event(&mut self, event: Event, now: Timestamp) -> Result<(), DeviceError<S::Error>> {
        match event {
            Event::DownlinkReceived { port, payload } => self.handle_downlink(port, &payload, now),
            Event::ClassCSwitchDue => self.switch_to_class_c(now),
            Event::ClassCRevertDue => {
                log::info!("Class C timeout");
                self.switch_to_class_a()
            }
            Event::UplinkSent(counter) => {
                self.ledger.record(counter, now);
                Ok(())
            }
        }
    }

    /// Fire any timers that are due
    pub fn poll(&mut self, now: Timestamp) -> Result<(), DeviceError<S::Error>> {
        if self.groups.poll_switch(now) {
            self.handle_event(Event::ClassCSwitchDue, now)?;
        }
        if self.switch.poll_revert(now) {
            self.handle_event(Event::ClassCRevertDue, now)?;
        }
        Ok(())
    }

    /// Handle an application downlink
    pub fn handle_downlink(
        &mut self,
        port: u8,
        payload: &[u8],
        now: Timestamp,
    ) -> Result<(), DeviceError<S::Error>> {
        if payload.is_empty() {
            return Ok(());
        }
        self.switch.on_downlink(now);

        let cx = DispatchContext {
            groups: &mut self.groups,
            fragmentation: &mut self.fragmentation,
            ledger: &self.ledger,
            flash: &mut self.flash,
        };
        let dispatched = dispatcher::dispatch(cx, port, payload, now);

        if let Some(answer) = dispatched.answer {
            if let Some(uplink) = Uplink::answer(answer.port, answer.as_bytes()) {
                // Full queue is logged by the queue
                let _ = self.uplinks.enqueue(uplink);
            }
        }

        match dispatched.action {
            Some(Action::RevertToClassA) => self.switch_to_class_a()?,
            Some(Action::RunVerification) => self.run_verification(),
            None => {}
        }

        if self.switch.mode() == OperatingMode::ClassC && self.groups.credentials().is_none() {
            log::info!("Multicast group removed, leaving Class C");
            self.switch_to_class_a()?;
        }
        Ok(())
    }

    /// Make sure an uplink on `port` may be sent in the current class
    ///
    /// Only the control port may be used from Class C; anything else moves
    /// the device back to Class A first.
    pub fn prepare_uplink(&mut self, port: u8) -> Result<(), DeviceError<S::Error>> {
        if !self.switch.uplink_allowed(port, self.config.control_port) {
            log::info!("Uplink on port {} requires Class A", port);
            self.switch_to_class_a()?;
        }
        Ok(())
    }

    /// Take the next uplink for transmission, preparing the stack for it
    pub fn next_uplink(&mut self) -> Result<Option<Uplink>, DeviceError<S::Error>> {
        let Some(uplink) = self.uplinks.peek().cloned() else {
            return Ok(None);
        };
        self.prepare_uplink(uplink.port)?;
        Ok(Some(uplink))
    }

    /// Report whether the uplink from [`Self::next_uplink`] was delivered
    pub fn complete_uplink(&mut self, sent: bool) {
        self.uplinks.complete(sent);
    }

    /// Queue application data; dropped while protocol answers are pending
    pub fn send_application(&mut self, port: u8, data: &[u8]) -> bool {
        match Uplink::application(port, data) {
            Some(uplink) => self.uplinks.enqueue(uplink).is_ok(),
            None => {
                log::warn!("Application uplink of {} bytes too long", data.len());
                false
            }
        }
    }

    /// Record the Class A session after a join
    pub fn on_join(&mut self, credentials: Credentials) {
        log::info!("Joined, Class A session recorded");
        self.switch.update_class_a_credentials(credentials);
    }

    /// Whether the device may enter low-power sleep
    pub fn may_sleep(&self) -> bool {
        self.switch.mode() == OperatingMode::ClassA
    }

    /// Current operating mode
    pub fn mode(&self) -> OperatingMode {
        self.switch.mode()
    }

    /// Engine configuration
    pub fn config(&self) -> &FotaConfig {
        &self.config
    }

    /// LoRaWAN stack
    pub fn stack(&self) -> &S {
        &self.stack
    }

    /// Mutable LoRaWAN stack
    pub fn stack_mut(&mut self) -> &mut S {
        &mut self.stack
    }

    /// Block device
    pub fn flash(&self) -> &B {
        &self.flash
    }

    /// Mutable block device
    pub fn flash_mut(&mut self) -> &mut B {
        &mut self.flash
    }

    /// Reset line
    pub fn reset_line(&self) -> &R {
        &self.reset
    }

    /// Uplink history
    pub fn ledger(&self) -> &UplinkLedger<N> {
        &self.ledger
    }

    /// Multicast group manager
    pub fn groups(&self) -> &MulticastGroupManager {
        &self.groups
    }

    /// Fragmentation controller
    pub fn fragmentation(&self) -> &FragmentationController<F> {
        &self.fragmentation
    }

    /// Verification pipeline
    pub fn pipeline(&self) -> &UpdatePipeline<P, V> {
        &self.pipeline
    }

    /// Class switch orchestrator
    pub fn class_switch(&self) -> &ClassSwitch {
        &self.switch
    }

    /// Outgoing uplinks
    pub fn uplinks(&self) -> &UplinkQueue<Q> {
        &self.uplinks
    }

    fn switch_to_class_c(&mut self, now: Timestamp) -> Result<(), DeviceError<S::Error>> {
        if !self.fragmentation.is_receiving() {
            log::warn!("Refusing Class C switch, no fragmentation session");
            return Ok(());
        }
        let Some(class_c) = self.groups.credentials().copied() else {
            log::warn!("Refusing Class C switch, no multicast credentials");
            return Ok(());
        };
        let cancel_duration = self.groups.cancel_duration();
        self.switch
            .enter_class_c(&mut self.stack, &class_c, cancel_duration, now)?;
        Ok(())
    }

    fn switch_to_class_a(&mut self) -> Result<(), DeviceError<S::Error>> {
        self.switch
            .enter_class_a(&mut self.stack, self.groups.credentials_mut())?;
        Ok(())
    }

    fn run_verification(&mut self) {
        match self.pipeline.run(&mut self.flash, &mut self.reset) {
            Ok(record) => log::info!("Update at {:#x} handed off", record.offset),
            Err(e) => log::error!("Update rejected: {}", e),
        }
    }
}
