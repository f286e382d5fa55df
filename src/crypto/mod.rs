//! Cryptographic and integrity primitives for the update engine
//!
//! This module provides:
//! - Multicast session key derivation (AES-128-ECB)
//! - CRC-64 over a flash region, reported to the network after reconstruction
//! - SHA-256 over a flash region, the digest the update signature covers
//! - ECDSA P-256 signature verification behind the [`SignatureVerifier`] seam

use aes::cipher::{BlockEncrypt, KeyInit};
use aes::Aes128;
use crc::{Crc, CRC_64_REDIS};
use p256::ecdsa::{signature::hazmat::PrehashVerifier, Signature, VerifyingKey};
use sha2::{Digest as _, Sha256};

use crate::config::device::{AESKey, DevAddr};
use crate::config::PUBLIC_KEY_LEN;
use crate::storage::{BlockDevice, Region};

/// Block size for AES-128
const BLOCK_SIZE: usize = 16;

/// Read size used when streaming a region through a hash
const HASH_CHUNK: usize = 128;

/// CRC-64 variant used by the fragmentation library (Jones polynomial)
const CRC64: Crc<u64> = Crc::<u64>::new(&CRC_64_REDIS);

/// SHA-256 digest
pub type Sha256Hash = [u8; 32];

/// Derive network and application session keys for a multicast group
///
/// # Arguments
/// * `root_key` - Multicast root key from the group setup
/// * `dev_addr` - Multicast address, in the byte order it arrived on the wire
pub fn derive_multicast_keys(root_key: &AESKey, dev_addr: &DevAddr) -> (AESKey, AESKey) {
    let cipher = Aes128::new(root_key.into());

    // Generate Network Session Key
    let mut nwk_skey = [0u8; BLOCK_SIZE];
    nwk_skey[0] = 0x01;
    nwk_skey[1..5].copy_from_slice(dev_addr);
    cipher.encrypt_block((&mut nwk_skey).into());

    // Generate Application Session Key
    let mut app_skey = [0u8; BLOCK_SIZE];
    app_skey[0] = 0x02;
    app_skey[1..5].copy_from_slice(dev_addr);
    cipher.encrypt_block((&mut app_skey).into());

    (nwk_skey, app_skey)
}

/// CRC-64 of a byte slice
pub fn crc64(data: &[u8]) -> u64 {
    CRC64.checksum(data)
}

/// CRC-64 of a flash region
pub fn crc64_region<B: BlockDevice + ?Sized>(flash: &mut B, region: Region) -> Result<u64, B::Error> {
    let mut digest = CRC64.digest();
    region.for_each_chunk::<B, HASH_CHUNK, _>(flash, |chunk| digest.update(chunk))?;
    Ok(digest.finalize())
}

/// SHA-256 of a flash region
pub fn sha256_region<B: BlockDevice + ?Sized>(
    flash: &mut B,
    region: Region,
) -> Result<Sha256Hash, B::Error> {
    let mut hasher = Sha256::new();
    region.for_each_chunk::<B, HASH_CHUNK, _>(flash, |chunk| hasher.update(chunk))?;
    Ok(hasher.finalize().into())
}

/// Verifies an update signature over an image digest
pub trait SignatureVerifier {
    /// Returns true only if `signature` is a valid signature of `hash`
    fn verify(&self, hash: &Sha256Hash, signature: &[u8]) -> bool;
}

/// ECDSA P-256 verifier for a compiled-in public key
#[derive(Debug, Clone)]
pub struct P256Verifier {
    public_key: [u8; PUBLIC_KEY_LEN],
}

impl P256Verifier {
    /// Create a verifier for a SEC1-encoded public key
    pub fn new(public_key: [u8; PUBLIC_KEY_LEN]) -> Self {
        Self { public_key }
    }
}

impl SignatureVerifier for P256Verifier {
    fn verify(&self, hash: &Sha256Hash, signature: &[u8]) -> bool {
        let Ok(key) = VerifyingKey::from_sec1_bytes(&self.public_key) else {
            log::error!("Trusted public key is not a valid P-256 point");
            return false;
        };

        // Signing tools emit DER; accept raw r||s as well
        let sig = match Signature::from_der(signature).or_else(|_| Signature::from_slice(signature)) {
            Ok(sig) => sig,
            Err(_) => {
                log::warn!("Update signature is not a valid ECDSA encoding");
                return false;
            }
        };

        key.verify_prehash(hash, &sig).is_ok()
    }
}
