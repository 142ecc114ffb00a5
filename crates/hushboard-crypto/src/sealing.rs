//! Sealed 64-bit words for local coprocessing.
//!
//! All functions are pure: nonces are provided by the caller. The `context`
//! bytes are authenticated but not encrypted; callers bind the chain id and
//! contract address there so a sealed word cannot be replayed elsewhere.

use chacha20poly1305::{
    XChaCha20Poly1305, XNonce,
    aead::{Aead, KeyInit, Payload},
};

use crate::{CryptoError, keccak256};

/// Size of the `XChaCha20` nonce in bytes.
pub const NONCE_SIZE: usize = 24;

/// A 64-bit word sealed under a coprocessor key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedWord {
    /// The 24-byte `XChaCha20` nonce.
    pub nonce: [u8; NONCE_SIZE],
    /// Ciphertext including the 16-byte Poly1305 tag.
    pub ciphertext: Vec<u8>,
}

impl SealedWord {
    /// Wire form: `nonce || ciphertext`.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(NONCE_SIZE + self.ciphertext.len());
        out.extend_from_slice(&self.nonce);
        out.extend_from_slice(&self.ciphertext);
        out
    }

    /// Parse the wire form produced by [`SealedWord::to_bytes`].
    ///
    /// # Errors
    ///
    /// - `AuthenticationFailed` if the input is shorter than a nonce
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() <= NONCE_SIZE {
            return Err(CryptoError::AuthenticationFailed);
        }
        let mut nonce = [0u8; NONCE_SIZE];
        nonce.copy_from_slice(&bytes[..NONCE_SIZE]);
        Ok(Self { nonce, ciphertext: bytes[NONCE_SIZE..].to_vec() })
    }
}

/// Seal `value` under `key`, authenticating `context`.
pub fn seal_word(
    key: &[u8; 32],
    context: &[u8],
    value: u64,
    nonce: [u8; NONCE_SIZE],
) -> SealedWord {
    let cipher = XChaCha20Poly1305::new(key.into());
    let word = value.to_be_bytes();
    let payload = Payload { msg: &word, aad: context };

    let Ok(ciphertext) = cipher.encrypt(XNonce::from_slice(&nonce), payload) else {
        unreachable!("XChaCha20-Poly1305 encryption cannot fail with valid inputs");
    };

    SealedWord { nonce, ciphertext }
}

/// Open a word sealed by [`seal_word`].
///
/// # Errors
///
/// - `AuthenticationFailed` on wrong key, wrong context, or tampering
pub fn open_word(key: &[u8; 32], context: &[u8], sealed: &SealedWord) -> Result<u64, CryptoError> {
    let cipher = XChaCha20Poly1305::new(key.into());
    let payload = Payload { msg: sealed.ciphertext.as_slice(), aad: context };

    let plaintext = cipher
        .decrypt(XNonce::from_slice(&sealed.nonce), payload)
        .map_err(|_| CryptoError::AuthenticationFailed)?;

    let word: [u8; 8] = plaintext.try_into().map_err(|_| CryptoError::AuthenticationFailed)?;
    Ok(u64::from_be_bytes(word))
}

/// Handle committing to a sealed word in `context`.
pub fn derive_handle(sealed: &SealedWord, context: &[u8]) -> [u8; 32] {
    let mut encoded = Vec::with_capacity(context.len() + NONCE_SIZE + sealed.ciphertext.len());
    encoded.extend_from_slice(context);
    encoded.extend_from_slice(&sealed.nonce);
    encoded.extend_from_slice(&sealed.ciphertext);
    keccak256(&encoded)
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: [u8; 32] = [0x42; 32];

    #[test]
    fn seal_open_roundtrip() {
        let sealed = seal_word(&KEY, b"ctx", 0x6869_0000_0000_0000, [1; NONCE_SIZE]);
        assert_eq!(open_word(&KEY, b"ctx", &sealed).unwrap(), 0x6869_0000_0000_0000);
    }

    #[test]
    fn wrong_context_fails() {
        let sealed = seal_word(&KEY, b"chain-a", 7, [1; NONCE_SIZE]);
        assert_eq!(open_word(&KEY, b"chain-b", &sealed), Err(CryptoError::AuthenticationFailed));
    }

    #[test]
    fn tampered_ciphertext_fails() {
        let mut sealed = seal_word(&KEY, b"ctx", 7, [1; NONCE_SIZE]);
        sealed.ciphertext[0] ^= 0x01;
        assert_eq!(open_word(&KEY, b"ctx", &sealed), Err(CryptoError::AuthenticationFailed));
    }

    #[test]
    fn handles_differ_per_nonce() {
        let a = seal_word(&KEY, b"ctx", 7, [1; NONCE_SIZE]);
        let b = seal_word(&KEY, b"ctx", 7, [2; NONCE_SIZE]);
        assert_ne!(derive_handle(&a, b"ctx"), derive_handle(&b, b"ctx"));
    }

    #[test]
    fn wire_form_roundtrip() {
        let sealed = seal_word(&KEY, b"ctx", 7, [3; NONCE_SIZE]);
        assert_eq!(SealedWord::from_bytes(&sealed.to_bytes()).unwrap(), sealed);
        assert!(SealedWord::from_bytes(&[0u8; NONCE_SIZE]).is_err());
    }
}
