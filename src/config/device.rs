/// AES-128 key (16 bytes)
pub type AESKey = [u8; 16];
/// Device Address (4 bytes, wire order)
pub type DevAddr = [u8; 4];

/// A complete LoRaWAN session as installed in the radio stack
///
/// The same shape holds both the device's own join-derived session (Class A)
/// and the multicast session derived from a group setup (Class C).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Credentials {
    /// Device address
    pub dev_addr: DevAddr,
    /// Network session key
    pub nwk_skey: AESKey,
    /// Application session key
    pub app_skey: AESKey,
    /// Uplink data rate index
    pub tx_datarate: u8,
    /// Downlink data rate index
    pub rx_datarate: u8,
    /// Uplink frame counter
    pub uplink_ctr: u32,
    /// Downlink frame counter
    pub downlink_ctr: u32,
    /// RX2 frequency in Hz
    pub rx2_frequency: u32,
}

impl Credentials {
    /// Create credentials from derived keys with zeroed counters
    pub fn new(dev_addr: DevAddr, nwk_skey: AESKey, app_skey: AESKey) -> Self {
        Self {
            dev_addr,
            nwk_skey,
            app_skey,
            ..Self::default()
        }
    }

    /// Copy the frame counters from another credential set
    pub fn sync_counters(&mut self, live: &Credentials) {
        self.uplink_ctr = live.uplink_ctr;
        self.downlink_ctr = live.downlink_ctr;
    }

    /// Whether both describe the same session, ignoring counters and radio
    /// parameters
    pub fn same_session(&self, other: &Credentials) -> bool {
        self.dev_addr == other.dev_addr
            && self.nwk_skey == other.nwk_skey
            && self.app_skey == other.app_skey
    }
}
