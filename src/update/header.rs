//! Signed header prepended to every update image

/// Largest DER-encoded P-256 signature
pub const MAX_SIGNATURE_LEN: usize = 72;

/// Signed header at the front of every reconstructed image
///
/// Wire layout: `signature_len:u8 | signature:[u8;72] | manufacturer_uuid:[u8;16]
/// | device_class_uuid:[u8;16] | diff_info:u32 BE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateSignatureHeader {
    /// Bytes of `signature` in use
    pub signature_len: u8,
    /// ECDSA signature over the SHA-256 of the final image
    pub signature: [u8; MAX_SIGNATURE_LEN],
    /// Manufacturer the image is built for
    pub manufacturer_uuid: [u8; 16],
    /// Device class the image is built for
    pub device_class_uuid: [u8; 16],
    /// Diff flag in the high byte, previous image size in the low three
    pub diff_info: u32,
}

impl UpdateSignatureHeader {
    /// Encoded length
    pub const LEN: usize = 109;

    /// Decode a header, rejecting an out-of-range signature length
    pub fn from_bytes(buf: &[u8; Self::LEN]) -> Option<Self> {
        let signature_len = buf[0];
        if signature_len as usize > MAX_SIGNATURE_LEN {
            return None;
        }

        let mut signature = [0u8; MAX_SIGNATURE_LEN];
        signature.copy_from_slice(&buf[1..73]);
        let mut manufacturer_uuid = [0u8; 16];
        manufacturer_uuid.copy_from_slice(&buf[73..89]);
        let mut device_class_uuid = [0u8; 16];
        device_class_uuid.copy_from_slice(&buf[89..105]);

        Some(Self {
            signature_len,
            signature,
            manufacturer_uuid,
            device_class_uuid,
            diff_info: u32::from_be_bytes([buf[105], buf[106], buf[107], buf[108]]),
        })
    }

    /// Encode to the wire layout
    pub fn to_bytes(&self) -> [u8; Self::LEN] {
        let mut buf = [0u8; Self::LEN];
        buf[0] = self.signature_len;
        buf[1..73].copy_from_slice(&self.signature);
        buf[73..89].copy_from_slice(&self.manufacturer_uuid);
        buf[89..105].copy_from_slice(&self.device_class_uuid);
        buf[105..109].copy_from_slice(&self.diff_info.to_be_bytes());
        buf
    }

    /// Signature bytes in use
    pub fn signature(&self) -> &[u8] {
        &self.signature[..(self.signature_len as usize).min(MAX_SIGNATURE_LEN)]
    }

    /// Whether the payload is a delta against the previous image
    pub fn is_diff(&self) -> bool {
        (self.diff_info >> 24) == 1
    }

    /// Size of the previous image a delta applies against
    pub fn previous_size(&self) -> u32 {
        self.diff_info & 0x00FF_FFFF
    }
}
