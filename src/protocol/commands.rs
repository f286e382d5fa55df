use core::fmt;

use super::fragmentation::{DATA_BLOCK_AUTH, DATA_FRAGMENT, FRAG_SESSION_SETUP, FRAG_SESSION_SETUP_REQ_LEN};
use super::multicast::{MC_CLASSC_SESSION, MC_GROUP_DELETE, MC_GROUP_SETUP};
use super::{Answer, FRAGMENTATION_PORT, MULTICAST_PORT};
use crate::config::device::{AESKey, DevAddr};

/// Reasons a downlink could not be turned into a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CommandError {
    /// Port carries no control protocol
    UnknownPort(u8),
    /// Payload had no opcode byte
    Empty,
    /// Opcode not defined on this port
    UnknownOpcode {
        /// Port the payload arrived on
        port: u8,
        /// Offending opcode
        opcode: u8,
    },
    /// Payload length does not fit the opcode
    Malformed {
        /// Opcode of the request
        opcode: u8,
        /// Received length including the opcode
        len: usize,
    },
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandError::UnknownPort(port) => write!(f, "no control protocol on port {}", port),
            CommandError::Empty => write!(f, "empty payload"),
            CommandError::UnknownOpcode { port, opcode } => {
                write!(f, "unknown opcode {:#04x} on port {}", opcode, port)
            }
            CommandError::Malformed { opcode, len } => {
                write!(f, "malformed request {:#04x} ({} bytes)", opcode, len)
            }
        }
    }
}

/// Multicast group setup request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct McGroupSetupReq {
    /// Group identifier
    pub group_id: u8,
    /// Multicast address
    pub mc_addr: u32,
    /// Root key the session keys are derived from
    pub mc_root_key: AESKey,
    /// Most significant bits of the multicast frame counter
    pub count_msb: u16,
    /// Validity window
    pub validity: u32,
}

impl McGroupSetupReq {
    /// Request length including the opcode
    pub const LEN: usize = 28;

    /// Parse the request, `payload` starting at the opcode
    pub fn from_bytes(payload: &[u8]) -> Option<Self> {
        if payload.len() < Self::LEN {
            return None;
        }
        let mut mc_root_key = [0u8; 16];
        mc_root_key.copy_from_slice(&payload[6..22]);
        Some(Self {
            group_id: payload[1] & 0x03,
            mc_addr: u32::from_le_bytes([payload[2], payload[3], payload[4], payload[5]]),
            mc_root_key,
            count_msb: u16::from_le_bytes([payload[22], payload[23]]),
            validity: u32::from_le_bytes([payload[24], payload[25], payload[26], payload[27]]),
        })
    }

    /// Multicast address in wire order, as used for key derivation
    pub fn dev_addr(&self) -> DevAddr {
        self.mc_addr.to_le_bytes()
    }
}

/// Multicast group delete request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct McGroupDeleteReq {
    /// Group identifier
    pub group_id: u8,
}

impl McGroupDeleteReq {
    /// Request length including the opcode
    pub const LEN: usize = 2;

    /// Parse the request, `payload` starting at the opcode
    pub fn from_bytes(payload: &[u8]) -> Option<Self> {
        if payload.len() >= Self::LEN {
            Some(Self {
                group_id: payload[1] & 0x03,
            })
        } else {
            None
        }
    }
}

/// Class C session request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct McClassCSessionReq {
    /// Group identifier
    pub group_id: u8,
    /// Seconds after the reference uplink the window opens
    pub time_to_start: u32,
    /// Window length exponent, the window lasts `2^timeout` seconds
    pub timeout: u8,
    /// Low byte of the reference uplink frame counter
    pub ul_fcount_ref: u8,
    /// Downlink frequency in Hz
    pub frequency: u32,
    /// Downlink data rate index
    pub datarate: u8,
}

impl McClassCSessionReq {
    /// Request length including the opcode
    pub const LEN: usize = 10;

    /// Parse the request, `payload` starting at the opcode
    pub fn from_bytes(payload: &[u8]) -> Option<Self> {
        if payload.len() < Self::LEN {
            return None;
        }
        Some(Self {
            group_id: payload[1] & 0x03,
            time_to_start: u32::from_le_bytes([payload[2], payload[3], payload[4] & 0x0F, 0]),
            timeout: payload[4] >> 4,
            ul_fcount_ref: payload[5],
            // Transmitted in units of 100 Hz
            frequency: u32::from_le_bytes([payload[6], payload[7], payload[8], 0]) * 100,
            datarate: payload[9],
        })
    }

    /// Seconds the Class C window stays open without traffic
    pub fn cancel_duration(&self) -> u32 {
        1u32 << (self.timeout & 0x0F)
    }
}

/// Fragmentation session setup request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FragSessionSetupReq {
    /// Fragmentation session index
    pub index: u8,
    /// Number of uncoded fragments in the image
    pub fragment_count: u16,
    /// Bytes per fragment
    pub fragment_size: u8,
    /// Coding scheme
    pub encoding: u8,
    /// Padding bytes in the last fragment
    pub padding: u8,
}

impl FragSessionSetupReq {
    /// Parse the request, `payload` starting at the opcode
    ///
    /// The request has a fixed length; anything else is rejected.
    pub fn from_bytes(payload: &[u8]) -> Option<Self> {
        if payload.len() != FRAG_SESSION_SETUP_REQ_LEN {
            return None;
        }
        Some(Self {
            index: (payload[1] >> 4) & 0x03,
            fragment_count: u16::from_le_bytes([payload[2], payload[3]]),
            fragment_size: payload[4],
            encoding: payload[5],
            padding: payload[6],
        })
    }
}

/// One coded or uncoded fragment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataFragment<'a> {
    /// Frame counter, 1-based
    pub counter: u16,
    /// Fragment bytes
    pub data: &'a [u8],
}

impl<'a> DataFragment<'a> {
    /// Smallest valid data fragment
    pub const MIN_LEN: usize = 3;

    /// Parse the fragment, `payload` starting at the opcode
    pub fn from_bytes(payload: &'a [u8]) -> Option<Self> {
        if payload.len() >= Self::MIN_LEN {
            Some(Self {
                counter: u16::from_le_bytes([payload[1], payload[2]]),
                data: &payload[3..],
            })
        } else {
            None
        }
    }
}

/// Network answer to a data block authentication request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataBlockAuthAns {
    /// Session index and status bits
    pub index_status: u8,
    /// False when the network rejected the reconstructed block
    pub accepted: bool,
}

impl DataBlockAuthAns {
    /// Parse the answer, `payload` starting at the opcode
    ///
    /// A bare two-byte answer carries no authentication data and means the
    /// network did not accept the block.
    pub fn from_bytes(payload: &[u8]) -> Option<Self> {
        if payload.len() >= 2 {
            Some(Self {
                index_status: payload[1],
                accepted: payload.len() > 2,
            })
        } else {
            None
        }
    }
}

/// A parsed control request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FotaCommand<'a> {
    /// Multicast group setup
    McGroupSetup(McGroupSetupReq),
    /// Multicast group delete
    McGroupDelete(McGroupDeleteReq),
    /// Class C session
    McClassCSession(McClassCSessionReq),
    /// Fragmentation session setup
    FragSessionSetup(FragSessionSetupReq),
    /// Data fragment
    DataFragment(DataFragment<'a>),
    /// Data block authentication answer
    DataBlockAuthAns(DataBlockAuthAns),
}

impl<'a> FotaCommand<'a> {
    /// Parse a downlink received on `port`
    pub fn from_bytes(port: u8, payload: &'a [u8]) -> Result<Self, CommandError> {
        if port != MULTICAST_PORT && port != FRAGMENTATION_PORT {
            return Err(CommandError::UnknownPort(port));
        }
        let opcode = *payload.first().ok_or(CommandError::Empty)?;
        let malformed = CommandError::Malformed {
            opcode,
            len: payload.len(),
        };

        let command = match (port, opcode) {
            (MULTICAST_PORT, MC_GROUP_SETUP) => {
                McGroupSetupReq::from_bytes(payload).map(FotaCommand::McGroupSetup)
            }
            (MULTICAST_PORT, MC_GROUP_DELETE) => {
                McGroupDeleteReq::from_bytes(payload).map(FotaCommand::McGroupDelete)
            }
            (MULTICAST_PORT, MC_CLASSC_SESSION) => {
                McClassCSessionReq::from_bytes(payload).map(FotaCommand::McClassCSession)
            }
            (FRAGMENTATION_PORT, FRAG_SESSION_SETUP) => {
                FragSessionSetupReq::from_bytes(payload).map(FotaCommand::FragSessionSetup)
            }
            (FRAGMENTATION_PORT, DATA_FRAGMENT) => {
                DataFragment::from_bytes(payload).map(FotaCommand::DataFragment)
            }
            (FRAGMENTATION_PORT, DATA_BLOCK_AUTH) => {
                DataBlockAuthAns::from_bytes(payload).map(FotaCommand::DataBlockAuthAns)
            }
            _ => return Err(CommandError::UnknownOpcode { port, opcode }),
        };

        command.ok_or(malformed)
    }
}

impl Answer {
    /// `MC_GROUP_SETUP_ANS`
    pub fn group_setup(group_id: u8) -> Self {
        Self::new(MULTICAST_PORT, &[MC_GROUP_SETUP, group_id])
    }

    /// `MC_GROUP_DELETE_ANS`
    pub fn group_delete(status: u8) -> Self {
        Self::new(MULTICAST_PORT, &[MC_GROUP_DELETE, status])
    }

    /// `MC_CLASSC_SESSION_ANS`, with the switch delay when one was scheduled
    pub fn classc_session(status: u8, switch_in: Option<u32>) -> Self {
        match switch_in {
            Some(secs) => {
                let b = secs.to_le_bytes();
                Self::new(MULTICAST_PORT, &[MC_CLASSC_SESSION, status, b[0], b[1], b[2]])
            }
            None => Self::new(MULTICAST_PORT, &[MC_CLASSC_SESSION, status]),
        }
    }

    /// `FRAG_SESSION_SETUP_ANS`
    pub fn frag_session_setup(index: u8, status: u8) -> Self {
        Self::new(FRAGMENTATION_PORT, &[FRAG_SESSION_SETUP, (index << 6) | status])
    }

    /// `DATA_BLOCK_AUTH_REQ` carrying the CRC-64 of the reconstructed block
    pub fn data_block_auth(index: u8, crc64: u64) -> Self {
        let mut bytes = [0u8; 10];
        bytes[0] = DATA_BLOCK_AUTH;
        bytes[1] = index;
        bytes[2..].copy_from_slice(&crc64.to_le_bytes());
        Self::new(FRAGMENTATION_PORT, &bytes)
    }
}
