//! Error types for cryptographic operations.

use thiserror::Error;

/// Errors produced by the cryptographic primitives.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// Message text does not fit in a single encrypted word.
    #[error("message is {len} bytes, limit is {max}")]
    MessageTooLong {
        /// Encoded length in bytes.
        len: usize,
        /// Maximum encoded length.
        max: usize,
    },

    /// Message text contains a NUL character, which packing reserves for
    /// padding.
    #[error("message contains a NUL character")]
    NulCharacter,

    /// Decrypted word is not valid UTF-8 text.
    #[error("decoded message is not valid UTF-8")]
    InvalidText,

    /// Secret key bytes are not a valid secp256k1 scalar.
    #[error("invalid secret key")]
    InvalidSecretKey,

    /// Signature bytes are malformed or do not recover a public key.
    #[error("invalid signature: {reason}")]
    InvalidSignature {
        /// Why the signature was rejected.
        reason: String,
    },

    /// AEAD authentication failed (wrong key, wrong handle, or tampering).
    #[error("sealed word failed authentication")]
    AuthenticationFailed,
}
