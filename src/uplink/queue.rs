//! Outgoing uplink queue
//!
//! Protocol answers are held until delivered; application data only goes
//! out when nothing else is pending.

use heapless::{Deque, Vec};

/// Maximum uplink application payload size
pub const MAX_UPLINK_PAYLOAD: usize = 242;

/// Default number of queued uplinks
pub const DEFAULT_QUEUE_DEPTH: usize = 4;

/// Origin of an uplink message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum UplinkKind {
    /// Protocol answer, sent confirmed and kept until delivered
    Answer,
    /// Application data, best effort
    Application,
}

/// A message waiting for the uplink scheduler
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Uplink {
    /// Application port
    pub port: u8,
    /// Payload bytes
    pub payload: Vec<u8, MAX_UPLINK_PAYLOAD>,
    /// Message origin
    pub kind: UplinkKind,
}

impl Uplink {
    /// Create a protocol answer
    pub fn answer(port: u8, payload: &[u8]) -> Option<Self> {
        Self::new(port, payload, UplinkKind::Answer)
    }

    /// Create an application message
    pub fn application(port: u8, payload: &[u8]) -> Option<Self> {
        Self::new(port, payload, UplinkKind::Application)
    }

    fn new(port: u8, payload: &[u8], kind: UplinkKind) -> Option<Self> {
        Some(Self {
            port,
            payload: Vec::from_slice(payload).ok()?,
            kind,
        })
    }

    /// Whether the message must be sent confirmed
    pub fn confirmed(&self) -> bool {
        self.kind == UplinkKind::Answer
    }
}

/// Outgoing queue that gives protocol answers priority over application data
///
/// Application messages are only accepted when nothing is pending. Answers
/// stay at the head until the scheduler reports a successful transmission.
#[derive(Debug)]
pub struct UplinkQueue<const N: usize = DEFAULT_QUEUE_DEPTH> {
    queue: Deque<Uplink, N>,
}

impl<const N: usize> UplinkQueue<N> {
    /// Create an empty queue
    pub fn new() -> Self {
        Self { queue: Deque::new() }
    }

    /// Queue a message, returning it back if it was not accepted
    pub fn enqueue(&mut self, uplink: Uplink) -> Result<(), Uplink> {
        if uplink.kind == UplinkKind::Application && !self.queue.is_empty() {
            log::debug!("Answers pending, dropping application uplink on port {}", uplink.port);
            return Err(uplink);
        }
        self.queue.push_back(uplink).map_err(|uplink| {
            log::warn!("Uplink queue full, dropping message on port {}", uplink.port);
            uplink
        })
    }

    /// Next message to transmit
    pub fn peek(&self) -> Option<&Uplink> {
        self.queue.front()
    }

    /// Report the outcome of transmitting the head message
    ///
    /// Application data is discarded either way; answers are retried until
    /// `sent` is true.
    pub fn complete(&mut self, sent: bool) -> Option<Uplink> {
        let retry = match self.queue.front() {
            Some(head) => !sent && head.kind == UplinkKind::Answer,
            None => return None,
        };
        if retry {
            None
        } else {
            self.queue.pop_front()
        }
    }

    /// Number of queued messages
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Whether nothing is queued
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

impl<const N: usize> Default for UplinkQueue<N> {
    fn default() -> Self {
        Self::new()
    }
}
