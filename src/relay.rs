//! Companion MCU relay
//!
//! When the radio module runs next to an application MCU, the two talk over
//! a serial line. Every message is one line: the base64 encoding of an
//! opcode byte followed by its body, terminated by `\n`.

use core::fmt;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use embedded_hal::serial::{Read, Write};
use heapless::Vec;

use crate::config::device::{AESKey, DevAddr};
use crate::crypto;
use crate::uplink::MAX_UPLINK_PAYLOAD;

/// Largest decoded message: opcode, port and a full payload
pub const MAX_RELAY_MESSAGE: usize = MAX_UPLINK_PAYLOAD + 2;

/// Largest encoded line without the terminator
pub const MAX_RELAY_LINE: usize = (MAX_RELAY_MESSAGE + 2) / 3 * 4;

// Decode buffer sized for the decoder's length estimate
const DECODE_BUF: usize = MAX_RELAY_LINE / 4 * 3;

const OP_APP_DATA: u8 = 0x01;
const OP_FIRMWARE_COMPLETE: u8 = 0x02;
const OP_JOIN_STATUS: u8 = 0x03;
const OP_KEY_DERIVATION_REQ: u8 = 0x04;
const OP_KEY_DERIVATION_RESP: u8 = 0x05;

/// Relay errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RelayError<E> {
    /// Serial port failure
    Serial(E),
    /// Line longer than any valid message
    LineTooLong,
    /// Line is not valid base64
    Encoding,
    /// Decoded bytes are not a known message
    InvalidMessage,
}

impl<E: fmt::Debug> fmt::Display for RelayError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelayError::Serial(e) => write!(f, "serial error: {:?}", e),
            RelayError::LineTooLong => write!(f, "line too long"),
            RelayError::Encoding => write!(f, "invalid base64"),
            RelayError::InvalidMessage => write!(f, "invalid relay message"),
        }
    }
}

/// Messages exchanged with the companion MCU
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayMessage {
    /// Application data received on or destined for `port`
    AppData {
        /// Application port
        port: u8,
        /// Payload
        data: Vec<u8, MAX_UPLINK_PAYLOAD>,
    },
    /// A verified firmware image is ready
    FirmwareComplete,
    /// Join status; `None` asks, `Some` answers
    JoinStatus(Option<bool>),
    /// Ask the peer to derive multicast session keys
    KeyDerivationRequest {
        /// Multicast address in wire order
        mc_addr: DevAddr,
        /// Multicast root key
        root_key: AESKey,
    },
    /// Derived multicast session keys
    KeyDerivationResponse {
        /// Network session key
        nwk_skey: AESKey,
        /// Application session key
        app_skey: AESKey,
    },
}

impl RelayMessage {
    /// Encode as opcode followed by body
    pub fn to_bytes(&self) -> Vec<u8, MAX_RELAY_MESSAGE> {
        let mut out = Vec::new();
        // Every body fits MAX_RELAY_MESSAGE
        match self {
            RelayMessage::AppData { port, data } => {
                let _ = out.extend_from_slice(&[OP_APP_DATA, *port]);
                let _ = out.extend_from_slice(data);
            }
            RelayMessage::FirmwareComplete => {
                let _ = out.push(OP_FIRMWARE_COMPLETE);
            }
            RelayMessage::JoinStatus(status) => {
                let _ = out.push(OP_JOIN_STATUS);
                if let Some(joined) = status {
                    let _ = out.push(*joined as u8);
                }
            }
            RelayMessage::KeyDerivationRequest { mc_addr, root_key } => {
                let _ = out.push(OP_KEY_DERIVATION_REQ);
                let _ = out.extend_from_slice(mc_addr);
                let _ = out.extend_from_slice(root_key);
            }
            RelayMessage::KeyDerivationResponse { nwk_skey, app_skey } => {
                let _ = out.push(OP_KEY_DERIVATION_RESP);
                let _ = out.extend_from_slice(nwk_skey);
                let _ = out.extend_from_slice(app_skey);
            }
        }
        out
    }

    /// Decode from opcode followed by body
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let (&opcode, body) = bytes.split_first()?;
        match opcode {
            OP_APP_DATA if !body.is_empty() => Some(RelayMessage::AppData {
                port: body[0],
                data: Vec::from_slice(&body[1..]).ok()?,
            }),
            OP_FIRMWARE_COMPLETE => Some(RelayMessage::FirmwareComplete),
            OP_JOIN_STATUS => match body {
                [] => Some(RelayMessage::JoinStatus(None)),
                [status, ..] => Some(RelayMessage::JoinStatus(Some(*status != 0))),
            },
            OP_KEY_DERIVATION_REQ if body.len() >= 20 => {
                let mut mc_addr = [0u8; 4];
                mc_addr.copy_from_slice(&body[..4]);
                let mut root_key = [0u8; 16];
                root_key.copy_from_slice(&body[4..20]);
                Some(RelayMessage::KeyDerivationRequest { mc_addr, root_key })
            }
            OP_KEY_DERIVATION_RESP if body.len() >= 32 => {
                let mut nwk_skey = [0u8; 16];
                nwk_skey.copy_from_slice(&body[..16]);
                let mut app_skey = [0u8; 16];
                app_skey.copy_from_slice(&body[16..32]);
                Some(RelayMessage::KeyDerivationResponse { nwk_skey, app_skey })
            }
            _ => None,
        }
    }

    /// Answer a key derivation request, `None` for any other message
    pub fn derive_keys(&self) -> Option<RelayMessage> {
        match self {
            RelayMessage::KeyDerivationRequest { mc_addr, root_key } => {
                let (nwk_skey, app_skey) = crypto::derive_multicast_keys(root_key, mc_addr);
                Some(RelayMessage::KeyDerivationResponse { nwk_skey, app_skey })
            }
            _ => None,
        }
    }
}

/// Line-framed relay over an `embedded-hal` serial port
pub struct CompanionRelay<S> {
    serial: S,
    line: Vec<u8, MAX_RELAY_LINE>,
    overflow: bool,
}

impl<S, E> CompanionRelay<S>
where
    S: Read<u8, Error = E> + Write<u8, Error = E>,
    E: fmt::Debug,
{
    /// Create a relay over `serial`
    pub fn new(serial: S) -> Self {
        Self {
            serial,
            line: Vec::new(),
            overflow: false,
        }
    }

    /// Serial port
    pub fn serial(&self) -> &S {
        &self.serial
    }

    /// Mutable serial port
    pub fn serial_mut(&mut self) -> &mut S {
        &mut self.serial
    }

    /// Release the serial port
    pub fn free(self) -> S {
        self.serial
    }

    /// Send one message, blocking until it is written and flushed
    pub fn send(&mut self, message: &RelayMessage) -> Result<(), RelayError<E>> {
        let raw = message.to_bytes();
        let mut encoded = [0u8; MAX_RELAY_LINE];
        let len = STANDARD
            .encode_slice(&raw, &mut encoded)
            .map_err(|_| RelayError::LineTooLong)?;

        for &b in &encoded[..len] {
            nb::block!(self.serial.write(b)).map_err(RelayError::Serial)?;
        }
        nb::block!(self.serial.write(b'\n')).map_err(RelayError::Serial)?;
        nb::block!(self.serial.flush()).map_err(RelayError::Serial)?;
        Ok(())
    }

    /// Drain available bytes, returning a message once a line is complete
    ///
    /// Returns `Ok(None)` when the port has no more data. An invalid line is
    /// reported once and discarded.
    pub fn poll(&mut self) -> Result<Option<RelayMessage>, RelayError<E>> {
        loop {
            let byte = match self.serial.read() {
                Ok(b) => b,
                Err(nb::Error::WouldBlock) => return Ok(None),
                Err(nb::Error::Other(e)) => return Err(RelayError::Serial(e)),
            };

            match byte {
                b'\n' => return self.take_line().map(Some),
                b'\r' => {}
                b => {
                    if self.line.push(b).is_err() {
                        self.overflow = true;
                    }
                }
            }
        }
    }

    fn take_line(&mut self) -> Result<RelayMessage, RelayError<E>> {
        let overflow = core::mem::replace(&mut self.overflow, false);
        let result = if overflow {
            Err(RelayError::LineTooLong)
        } else {
            let mut decoded = [0u8; DECODE_BUF];
            match STANDARD.decode_slice(&self.line, &mut decoded) {
                Ok(n) => RelayMessage::from_bytes(&decoded[..n]).ok_or(RelayError::InvalidMessage),
                Err(_) => Err(RelayError::Encoding),
            }
        };
        self.line.clear();

        if let Err(ref e) = result {
            log::warn!("Dropping relay line: {}", e);
        }
        result
    }
}
