//! Multicast group and Class C session management

use crate::config::device::{Credentials, DevAddr};
use crate::crypto;
use crate::protocol::commands::{McClassCSessionReq, McGroupDeleteReq, McGroupSetupReq};
use crate::protocol::multicast::{
    STATUS_DELETE_UNDEFINED, STATUS_GROUP_UNDEFINED, STATUS_TIMING_UNKNOWN,
};
use crate::protocol::Answer;
use crate::timer::{Timer, Timestamp};
use crate::uplink::UplinkLedger;

/// Largest delay the session answer can express (24 bits)
const MAX_SWITCH_IN: i64 = 0x00FF_FFFF;

/// Parameters of the configured multicast group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MulticastGroupParams {
    /// Group identifier
    pub group_id: u8,
    /// Multicast address in wire order
    pub mc_addr: DevAddr,
    /// Root key the session keys were derived from
    pub mc_root_key: [u8; 16],
    /// Most significant bits of the multicast frame counter
    pub count_msb: u16,
    /// Validity window
    pub validity: u32,
}

/// Multicast group and Class C session manager
///
/// Holds at most one group and the Class C credentials derived from it.
/// A superseding setup replaces both and cancels any pending switch.
#[derive(Debug, Default)]
pub struct MulticastGroupManager {
    group: Option<MulticastGroupParams>,
    credentials: Option<Credentials>,
    switch_timer: Timer,
    cancel_duration: u32,
}

impl MulticastGroupManager {
    /// Create a manager with no group
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle `MC_GROUP_SETUP_REQ`
    pub fn handle_group_setup(&mut self, req: &McGroupSetupReq) -> Answer {
        let mc_addr = req.dev_addr();
        let (nwk_skey, app_skey) = crypto::derive_multicast_keys(&req.mc_root_key, &mc_addr);

        self.group = Some(MulticastGroupParams {
            group_id: req.group_id,
            mc_addr,
            mc_root_key: req.mc_root_key,
            count_msb: req.count_msb,
            validity: req.validity,
        });
        self.credentials = Some(Credentials::new(mc_addr, nwk_skey, app_skey));

        if self.switch_timer.is_armed() {
            log::info!("Group superseded, pending Class C switch cancelled");
            self.switch_timer.cancel();
        }

        log::info!(
            "Multicast group {} set up, address {:08x}",
            req.group_id,
            req.mc_addr
        );
        Answer::group_setup(req.group_id)
    }

    /// Handle `MC_GROUP_DELETE_REQ`
    pub fn handle_group_delete(&mut self, req: &McGroupDeleteReq) -> Answer {
        let defined = matches!(self.group, Some(g) if g.group_id == req.group_id);
        let mut status = req.group_id;

        if defined {
            self.group = None;
            self.credentials = None;
            self.switch_timer.cancel();
            log::info!("Multicast group {} deleted", req.group_id);
        } else {
            log::warn!("Delete for undefined multicast group {}", req.group_id);
            status |= STATUS_DELETE_UNDEFINED;
        }

        Answer::group_delete(status)
    }

    /// Handle `MC_CLASSC_SESSION_REQ`
    ///
    /// Looks up the reference uplink in `ledger` and, on a hit, arms the
    /// switch timer so the window opens `time_to_start` seconds after it.
    pub fn handle_classc_session<const N: usize>(
        &mut self,
        req: &McClassCSessionReq,
        ledger: &UplinkLedger<N>,
        now: Timestamp,
    ) -> Answer {
        let mut status = req.group_id;
        self.cancel_duration = req.cancel_duration();

        let defined = matches!(self.group, Some(g) if g.group_id == req.group_id);
        match self.credentials.as_mut() {
            Some(creds) if defined => {
                creds.tx_datarate = req.datarate;
                creds.rx_datarate = req.datarate;
                creds.uplink_ctr = 0;
                creds.downlink_ctr = 0;
                creds.rx2_frequency = req.frequency;
            }
            _ => {
                log::warn!("Class C session for undefined group {}", req.group_id);
                status |= STATUS_GROUP_UNDEFINED;
            }
        }

        let reference = ledger.find_by_ref(req.ul_fcount_ref);
        if reference.is_none() {
            log::warn!("UlFCountRef {} not found in uplink history", req.ul_fcount_ref);
            status |= STATUS_TIMING_UNKNOWN;
        }

        let record = match reference {
            Some(record) if defined => record,
            _ => return Answer::classc_session(status, None),
        };

        let switch_in = (record.sent_at as i64 + req.time_to_start as i64 - now as i64)
            .clamp(1, MAX_SWITCH_IN) as u32;
        self.switch_timer.arm(now, switch_in);

        log::info!(
            "Class C window in {} s, {} Hz DR{}, timeout {} s",
            switch_in,
            req.frequency,
            req.datarate,
            self.cancel_duration
        );
        Answer::classc_session(status, Some(switch_in))
    }

    /// Returns true once when the scheduled Class C switch is due
    pub fn poll_switch(&mut self, now: Timestamp) -> bool {
        self.switch_timer.poll(now)
    }

    /// Pending Class C switch
    pub fn switch_timer(&self) -> &Timer {
        &self.switch_timer
    }

    /// Configured group, if any
    pub fn group(&self) -> Option<&MulticastGroupParams> {
        self.group.as_ref()
    }

    /// Class C credentials derived from the group
    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    /// Mutable Class C credentials, for counter bookkeeping across switches
    pub fn credentials_mut(&mut self) -> Option<&mut Credentials> {
        self.credentials.as_mut()
    }

    /// Seconds the Class C window stays open without traffic
    pub fn cancel_duration(&self) -> u32 {
        self.cancel_duration
    }
}
