//! Downlink command dispatcher
//!
//! Routes control ports to their handlers. Port 200 goes to the multicast
//! group manager, port 201 to the fragmentation controller. Other ports are
//! not ours and are ignored.

use crate::class::MulticastGroupManager;
use crate::fragmentation::{EngineFactory, FragmentOutcome, FragmentationController};
use crate::protocol::commands::{CommandError, FotaCommand};
use crate::protocol::Answer;
use crate::storage::BlockDevice;
use crate::timer::Timestamp;
use crate::uplink::UplinkLedger;

/// Follow-up the device must take after a dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Action {
    /// Fragmentation finished; leave the multicast window
    RevertToClassA,
    /// The network authenticated the image; run verification
    RunVerification,
}

/// Outcome of dispatching one downlink
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dispatched {
    /// Acknowledgement to queue for uplink
    pub answer: Option<Answer>,
    /// Follow-up action
    pub action: Option<Action>,
}

impl Dispatched {
    fn answer(answer: Answer) -> Self {
        Self {
            answer: Some(answer),
            action: None,
        }
    }

    fn action(action: Action) -> Self {
        Self {
            answer: None,
            action: Some(action),
        }
    }
}

/// Components a downlink may touch
pub struct DispatchContext<'a, F: EngineFactory, B: ?Sized, const N: usize> {
    /// Multicast group manager
    pub groups: &'a mut MulticastGroupManager,
    /// Fragmentation controller
    pub fragmentation: &'a mut FragmentationController<F>,
    /// Uplink history for timing references
    pub ledger: &'a UplinkLedger<N>,
    /// Block device the image is reconstructed on
    pub flash: &'a mut B,
}

/// Parse and route a downlink received on `port`
///
/// Malformed payloads are logged and dropped without an answer.
pub fn dispatch<F, B, const N: usize>(
    cx: DispatchContext<'_, F, B, N>,
    port: u8,
    payload: &[u8],
    now: Timestamp,
) -> Dispatched
where
    F: EngineFactory,
    B: BlockDevice + ?Sized,
{
    let command = match FotaCommand::from_bytes(port, payload) {
        Ok(command) => command,
        Err(CommandError::UnknownPort(_)) => return Dispatched::default(),
        Err(e @ CommandError::UnknownOpcode { .. }) => {
            log::info!("Ignoring downlink: {}", e);
            return Dispatched::default();
        }
        Err(e) => {
            log::warn!("Rejected downlink: {}", e);
            return Dispatched::default();
        }
    };

    match command {
        FotaCommand::McGroupSetup(req) => Dispatched::answer(cx.groups.handle_group_setup(&req)),
        FotaCommand::McGroupDelete(req) => Dispatched::answer(cx.groups.handle_group_delete(&req)),
        FotaCommand::McClassCSession(req) => {
            Dispatched::answer(cx.groups.handle_classc_session(&req, cx.ledger, now))
        }
        FotaCommand::FragSessionSetup(req) => {
            Dispatched::answer(cx.fragmentation.handle_setup(cx.flash, &req))
        }
        FotaCommand::DataFragment(fragment) => {
            match cx.fragmentation.handle_fragment(cx.flash, &fragment) {
                FragmentOutcome::Complete { answer, .. } => Dispatched {
                    answer: Some(answer),
                    action: Some(Action::RevertToClassA),
                },
                _ => Dispatched::default(),
            }
        }
        FotaCommand::DataBlockAuthAns(ans) => {
            if cx.fragmentation.handle_auth_answer(&ans) {
                Dispatched::action(Action::RunVerification)
            } else {
                Dispatched::default()
            }
        }
    }
}
