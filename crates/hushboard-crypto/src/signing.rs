//! secp256k1 recoverable signatures over 32-byte digests.
//!
//! Signatures use the Ethereum `r || s || v` layout with `v` in `{27, 28}`.
//! Recovery also accepts the raw `{0, 1}` form some wallets return.

use k256::{
    PublicKey,
    ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey},
    elliptic_curve::sec1::ToEncodedPoint,
};

use crate::{CryptoError, keccak256};

/// Size of an Ethereum address in bytes.
pub const ADDRESS_SIZE: usize = 20;

/// Size of a recoverable signature (`r || s || v`).
pub const SIGNATURE_SIZE: usize = 65;

/// Offset Ethereum adds to the recovery id.
const RECOVERY_OFFSET: u8 = 27;

/// Ethereum address of an uncompressed SEC1 public key.
///
/// The address is the last 20 bytes of `keccak256(x || y)`.
pub fn address_from_public_key(key: &VerifyingKey) -> [u8; ADDRESS_SIZE] {
    let point = PublicKey::from(key).to_encoded_point(false);
    let digest = keccak256(&point.as_bytes()[1..]);

    let mut address = [0u8; ADDRESS_SIZE];
    address.copy_from_slice(&digest[32 - ADDRESS_SIZE..]);
    address
}

/// Recover the address that produced `signature` over `digest`.
///
/// # Errors
///
/// - `InvalidSignature` if the layout, recovery id, or curve point is invalid
pub fn recover_signer(
    digest: &[u8; 32],
    signature: &[u8],
) -> Result<[u8; ADDRESS_SIZE], CryptoError> {
    if signature.len() != SIGNATURE_SIZE {
        return Err(CryptoError::InvalidSignature {
            reason: format!("expected {SIGNATURE_SIZE} bytes, got {}", signature.len()),
        });
    }

    let v = signature[64];
    let recovery_byte = if v >= RECOVERY_OFFSET { v - RECOVERY_OFFSET } else { v };
    let recovery_id = RecoveryId::from_byte(recovery_byte).ok_or_else(|| {
        CryptoError::InvalidSignature { reason: format!("bad recovery id {v}") }
    })?;

    let sig = Signature::from_slice(&signature[..64])
        .map_err(|e| CryptoError::InvalidSignature { reason: e.to_string() })?;

    let key = VerifyingKey::recover_from_prehash(digest, &sig, recovery_id)
        .map_err(|e| CryptoError::InvalidSignature { reason: e.to_string() })?;

    Ok(address_from_public_key(&key))
}

/// Secret signing key held by a local wallet.
///
/// The inner key zeroizes itself on drop.
#[derive(Clone)]
pub struct SecretSigner {
    key: SigningKey,
}

impl SecretSigner {
    /// Build a signer from 32 secret bytes.
    ///
    /// # Errors
    ///
    /// - `InvalidSecretKey` if the bytes are zero or not below the curve order
    pub fn from_bytes(secret: &[u8; 32]) -> Result<Self, CryptoError> {
        let key = SigningKey::from_slice(secret).map_err(|_| CryptoError::InvalidSecretKey)?;
        Ok(Self { key })
    }

    /// Ethereum address of this signer.
    pub fn address(&self) -> [u8; ADDRESS_SIZE] {
        address_from_public_key(self.key.verifying_key())
    }

    /// Sign a 32-byte digest, returning `r || s || v`.
    ///
    /// # Errors
    ///
    /// - `InvalidSignature` if the backend refuses the digest
    pub fn sign_digest(&self, digest: &[u8; 32]) -> Result<[u8; SIGNATURE_SIZE], CryptoError> {
        let (signature, recovery_id) = self
            .key
            .sign_prehash_recoverable(digest)
            .map_err(|e| CryptoError::InvalidSignature { reason: e.to_string() })?;

        let mut out = [0u8; SIGNATURE_SIZE];
        out[..64].copy_from_slice(&signature.to_bytes());
        out[64] = recovery_id.to_byte() + RECOVERY_OFFSET;
        Ok(out)
    }
}

impl std::fmt::Debug for SecretSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretSigner").field("address", &self.address()).finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signer(seed: u8) -> SecretSigner {
        SecretSigner::from_bytes(&[seed; 32]).unwrap()
    }

    #[test]
    fn known_key_derives_known_address() {
        // Private key 0x...01 has a well-known address
        let mut secret = [0u8; 32];
        secret[31] = 1;
        let signer = SecretSigner::from_bytes(&secret).unwrap();
        assert_eq!(hex::encode(signer.address()), "7e5f4552091a69125d5dfcb7b8c2659029395bdf");
    }

    #[test]
    fn zero_key_rejected() {
        assert!(matches!(SecretSigner::from_bytes(&[0u8; 32]), Err(CryptoError::InvalidSecretKey)));
    }

    #[test]
    fn signature_recovers_signer() {
        let signer = signer(7);
        let digest = keccak256(b"permit");
        let signature = signer.sign_digest(&digest).unwrap();

        assert_eq!(recover_signer(&digest, &signature).unwrap(), signer.address());
    }

    #[test]
    fn raw_recovery_id_accepted() {
        let signer = signer(9);
        let digest = keccak256(b"permit");
        let mut signature = signer.sign_digest(&digest).unwrap();
        signature[64] -= RECOVERY_OFFSET;

        assert_eq!(recover_signer(&digest, &signature).unwrap(), signer.address());
    }

    #[test]
    fn different_digest_recovers_different_address() {
        let signer = signer(7);
        let signature = signer.sign_digest(&keccak256(b"permit")).unwrap();

        let recovered = recover_signer(&keccak256(b"other"), &signature);
        assert!(recovered.map_or(true, |address| address != signer.address()));
    }

    #[test]
    fn truncated_signature_rejected() {
        let result = recover_signer(&[0u8; 32], &[0u8; 64]);
        assert!(matches!(result, Err(CryptoError::InvalidSignature { .. })));
    }
}
