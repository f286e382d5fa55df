//! Recent uplink history for Class C timing references

use heapless::HistoryBuffer;

use crate::timer::Timestamp;

/// Default number of uplinks remembered
pub const DEFAULT_LEDGER_CAPACITY: usize = 10;

/// One transmitted uplink
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct UplinkRecord {
    /// Uplink frame counter
    pub counter: u32,
    /// Time the frame left the radio
    pub sent_at: Timestamp,
}

/// Fixed-capacity ring of the most recent uplinks, oldest first
///
/// New records overwrite the oldest once the ring is full. There is no
/// removal API.
#[derive(Debug)]
pub struct UplinkLedger<const N: usize = DEFAULT_LEDGER_CAPACITY> {
    records: HistoryBuffer<UplinkRecord, N>,
}

impl<const N: usize> UplinkLedger<N> {
    /// Create an empty ledger
    pub fn new() -> Self {
        Self {
            records: HistoryBuffer::new(),
        }
    }

    /// Record a transmitted uplink
    pub fn record(&mut self, counter: u32, sent_at: Timestamp) {
        self.records.write(UplinkRecord { counter, sent_at });
    }

    /// Resolve an 8-bit `UlFCountRef` against the ledger
    ///
    /// Compares the 8 LSBs of every retained counter; when several match the
    /// newest one wins.
    pub fn find_by_ref(&self, ul_fcount_ref: u8) -> Option<UplinkRecord> {
        self.records
            .oldest_ordered()
            .filter(|r| r.counter as u8 == ul_fcount_ref)
            .last()
            .copied()
    }

    /// Records from oldest to newest
    pub fn iter(&self) -> impl Iterator<Item = &UplinkRecord> {
        self.records.oldest_ordered()
    }

    /// Number of retained records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether no uplink has been recorded yet
    pub fn is_empty(&self) -> bool {
        self.records.len() == 0
    }
}

impl<const N: usize> Default for UplinkLedger<N> {
    fn default() -> Self {
        Self::new()
    }
}
