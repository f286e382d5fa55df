//! Fragmentation session controller

use super::{EngineFactory, FragError, FragmentEngine, FragmentationSessionConfig};
use crate::config::FotaConfig;
use crate::crypto;
use crate::protocol::commands::{DataBlockAuthAns, DataFragment, FragSessionSetupReq};
use crate::protocol::fragmentation::STATUS_NOT_ENOUGH_MEMORY;
use crate::protocol::Answer;
use crate::storage::BlockDevice;
use crate::update::{UpdateHandoffRecord, HEADER_LEN};

/// Fragmentation controller state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SessionState {
    /// No session
    Idle,
    /// Session configured, engine not yet initialized
    Configured,
    /// Accepting fragments
    Receiving,
    /// Image reconstructed, waiting for the network's authentication
    Complete,
    /// Engine failed; a new setup is required
    Aborted,
}

/// Result of feeding one fragment
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FragmentOutcome {
    /// No session is receiving
    Ignored,
    /// Fragment consumed, image not complete yet
    Accepted,
    /// Image complete; `answer` carries the CRC-64 to the network
    Complete {
        /// `DATA_BLOCK_AUTH_REQ` to send
        answer: Answer,
        /// CRC-64 of the reconstructed image
        crc64: u64,
    },
    /// Session aborted
    Aborted,
}

struct Session<E> {
    config: FragmentationSessionConfig,
    engine: Option<E>,
}

/// Owns the single fragmentation session and its reconstruction engine
pub struct FragmentationController<F: EngineFactory> {
    factory: F,
    state: SessionState,
    session: Option<Session<F::Engine>>,
    update_offset: u64,
    handoff_offset: u64,
    max_redundancy: u8,
}

impl<F: EngineFactory> FragmentationController<F> {
    /// Create an idle controller
    pub fn new(factory: F, config: &FotaConfig) -> Self {
        Self {
            factory,
            state: SessionState::Idle,
            session: None,
            update_offset: config.layout.update_offset,
            handoff_offset: config.layout.handoff_offset,
            max_redundancy: config.max_redundancy,
        }
    }

    /// Current state
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Whether fragments are being accepted
    pub fn is_receiving(&self) -> bool {
        self.state == SessionState::Receiving
    }

    /// Configuration of the current or last session
    pub fn config(&self) -> Option<&FragmentationSessionConfig> {
        self.session.as_ref().map(|s| &s.config)
    }

    /// Frames lost in the running session
    pub fn lost_frame_count(&self) -> Option<u32> {
        self.session
            .as_ref()
            .and_then(|s| s.engine.as_ref())
            .map(|e| e.lost_frame_count())
    }

    /// Handle `FRAG_SESSION_SETUP_REQ`
    ///
    /// Any previous session is dropped, including its reconstruction state.
    pub fn handle_setup<B: BlockDevice + ?Sized>(
        &mut self,
        flash: &mut B,
        req: &FragSessionSetupReq,
    ) -> Answer {
        let config = FragmentationSessionConfig {
            session_id: req.index,
            fragment_count: req.fragment_count,
            fragment_size: req.fragment_size,
            encoding: req.encoding,
            padding: req.padding,
            redundancy: self.max_redundancy,
            flash_offset: self.update_offset,
        };

        self.session = None;
        let mut engine = self.factory.create(&config);
        self.state = SessionState::Configured;

        match engine.initialize(flash) {
            Ok(()) => {
                log::info!(
                    "Fragmentation session {}: {} x {} bytes, padding {}",
                    config.session_id,
                    config.fragment_count,
                    config.fragment_size,
                    config.padding
                );
                self.session = Some(Session {
                    config,
                    engine: Some(engine),
                });
                self.state = SessionState::Receiving;
                Answer::frag_session_setup(req.index, 0)
            }
            Err(e) => {
                log::error!("Fragmentation session could not initialize: {}", e);
                self.state = SessionState::Idle;
                Answer::frag_session_setup(req.index, STATUS_NOT_ENOUGH_MEMORY)
            }
        }
    }

    /// Handle `DATA_FRAGMENT`
    pub fn handle_fragment<B: BlockDevice + ?Sized>(
        &mut self,
        flash: &mut B,
        fragment: &DataFragment<'_>,
    ) -> FragmentOutcome {
        if self.state != SessionState::Receiving {
            log::trace!("Fragment {} outside a receiving session", fragment.counter);
            return FragmentOutcome::Ignored;
        }
        let Some(session) = self.session.as_mut() else {
            return FragmentOutcome::Ignored;
        };
        let Some(engine) = session.engine.as_mut() else {
            return FragmentOutcome::Ignored;
        };

        match engine.process_frame(flash, fragment.counter, fragment.data) {
            Ok(()) => {
                log::debug!(
                    "Processed frame {}, {} lost",
                    fragment.counter,
                    engine.lost_frame_count()
                );
                return FragmentOutcome::Accepted;
            }
            Err(FragError::Complete) => {
                log::info!("Fragmentation session complete at frame {}", fragment.counter);
            }
            Err(e) => {
                log::error!("Frame {} failed: {}", fragment.counter, e);
                session.engine = None;
                self.state = SessionState::Aborted;
                return FragmentOutcome::Aborted;
            }
        }

        session.engine = None;
        let config = session.config;
        match Self::finish(flash, &config, self.handoff_offset) {
            Ok((answer, crc64)) => {
                self.state = SessionState::Complete;
                FragmentOutcome::Complete { answer, crc64 }
            }
            Err(e) => {
                log::error!("Storage failure completing session: {:?}", e);
                self.state = SessionState::Aborted;
                FragmentOutcome::Aborted
            }
        }
    }

    /// Handle `DATA_BLOCK_AUTH_ANS`
    ///
    /// Returns true when the verification pipeline should run.
    pub fn handle_auth_answer(&mut self, ans: &DataBlockAuthAns) -> bool {
        if self.state != SessionState::Complete {
            log::debug!("Ignoring stale DATA_BLOCK_AUTH_ANS");
            return false;
        }
        if !ans.accepted {
            log::warn!("Network rejected data block ({:#04x})", ans.index_status);
            return false;
        }
        true
    }

    // CRC the image and write the provisional handoff record
    fn finish<B: BlockDevice + ?Sized>(
        flash: &mut B,
        config: &FragmentationSessionConfig,
        handoff_offset: u64,
    ) -> Result<(Answer, u64), B::Error> {
        let crc = crypto::crc64_region(flash, config.region())?;
        log::info!("Reconstructed {} bytes, CRC-64 {:016x}", config.image_size(), crc);

        let header = HEADER_LEN as u64;
        let size = config.image_size().saturating_sub(header) as u32;
        let record = UpdateHandoffRecord::provisional(config.flash_offset + header, size);
        flash.program(&record.to_bytes(), handoff_offset)?;

        Ok((Answer::data_block_auth(config.session_id, crc), crc))
    }
}
