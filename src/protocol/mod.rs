//! Downlink control protocol
//!
//! This module contains the wire format of the multicast and fragmentation
//! control messages:
//! - Port and opcode constants
//! - Typed request parsing in [`commands`]
//! - Answer encoding for the acknowledgements this device sends

/// Request parsing and answer encoding
pub mod commands;

pub use commands::{
    DataBlockAuthAns, DataFragment, FotaCommand, FragSessionSetupReq, McClassCSessionReq,
    McGroupDeleteReq, McGroupSetupReq,
};

/// Multicast group and Class C session control
pub const MULTICAST_PORT: u8 = 200;

/// Fragmentation session control and data
pub const FRAGMENTATION_PORT: u8 = 201;

/// Largest downlink application payload
pub const MAX_DOWNLINK_PAYLOAD: usize = 242;

/// Largest acknowledgement this device emits
pub const MAX_ANSWER_LEN: usize = 10;

/// Opcodes on [`MULTICAST_PORT`]
pub mod multicast {
    /// Group setup request and answer
    pub const MC_GROUP_SETUP: u8 = 0x02;
    /// Group delete request and answer
    pub const MC_GROUP_DELETE: u8 = 0x03;
    /// Class C session request and answer
    pub const MC_CLASSC_SESSION: u8 = 0x04;

    /// Status bit: no uplink matches the timing reference
    pub const STATUS_TIMING_UNKNOWN: u8 = 0b0000_0100;
    /// Status bit: the referenced group was never set up
    pub const STATUS_GROUP_UNDEFINED: u8 = 0b0001_0000;
    /// Delete status bit: the group to delete does not exist
    pub const STATUS_DELETE_UNDEFINED: u8 = 0b0000_0100;
}

/// Opcodes on [`FRAGMENTATION_PORT`]
pub mod fragmentation {
    /// Fragmentation session setup request and answer
    pub const FRAG_SESSION_SETUP: u8 = 0x02;
    /// Data block authentication request and answer
    pub const DATA_BLOCK_AUTH: u8 = 0x05;
    /// Data fragment
    pub const DATA_FRAGMENT: u8 = 0x08;

    /// Exact length of a session setup request
    pub const FRAG_SESSION_SETUP_REQ_LEN: usize = 7;

    /// Setup status bit: not enough memory for the session
    pub const STATUS_NOT_ENOUGH_MEMORY: u8 = 0b0000_0010;
}

/// An acknowledgement payload queued for uplink
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Answer {
    /// Port the answer is sent on
    pub port: u8,
    /// Answer bytes
    pub payload: heapless::Vec<u8, MAX_ANSWER_LEN>,
}

impl Answer {
    /// Build an answer from its bytes
    ///
    /// Bytes beyond [`MAX_ANSWER_LEN`] are dropped; no answer defined here
    /// is that long.
    pub fn new(port: u8, bytes: &[u8]) -> Self {
        let len = bytes.len().min(MAX_ANSWER_LEN);
        let mut payload = heapless::Vec::new();
        // Cannot fail after truncation
        let _ = payload.extend_from_slice(&bytes[..len]);
        Self { port, payload }
    }

    /// Answer bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.payload
    }
}
