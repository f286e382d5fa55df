//! Uplink bookkeeping
//!
//! This module contains the device-side state of the uplink path:
//! - The history of recently transmitted frame counters, used to resolve
//!   the network's timing references
//! - The queue of answers waiting for the uplink scheduler

/// Uplink history ledger
pub mod ledger;

/// Outgoing message queue
pub mod queue;

pub use ledger::{UplinkLedger, UplinkRecord, DEFAULT_LEDGER_CAPACITY};
pub use queue::{Uplink, UplinkKind, UplinkQueue, DEFAULT_QUEUE_DEPTH, MAX_UPLINK_PAYLOAD};
