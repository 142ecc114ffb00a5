//! Hushboard Cryptographic Primitives
//!
//! Pure functions used by the messaging core. Callers provide all randomness
//! so every output is reproducible in simulation.
//!
//! # Decryption Authorization
//!
//! A recipient proves entitlement to a ciphertext by signing an EIP-712
//! permit with their wallet key. The permit binds a fresh re-encryption
//! public key to a set of contracts and a validity window.
//!
//! ```text
//! re-encryption secret ──HKDF──► re-encryption public key
//!                                        │
//!                                        ▼
//!          EIP-712 permit { public key, contracts, start, days }
//!                                        │
//!                                        ▼
//!                 keccak256 digest ──secp256k1──► 65-byte signature
//!                                                        │
//!                                                        ▼
//!                                 recover signer address, check ACL
//! ```
//!
//! # Local Coprocessing
//!
//! Networks without a real FHE coprocessor (local development chains) keep
//! encrypted words sealed with XChaCha20-Poly1305 under a coprocessor key.
//! Handles are keccak commitments over the sealed bytes, so they are unique
//! per encryption and never reveal the plaintext.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod codec;
mod error;
mod keccak;
mod permit;
mod sealing;
mod signing;

pub use codec::{MAX_MESSAGE_BYTES, decode_text, encode_text};
pub use error::CryptoError;
pub use keccak::keccak256;
pub use permit::{DecryptionPermit, Eip712Domain, derive_reencryption_public_key};
pub use sealing::{NONCE_SIZE, SealedWord, derive_handle, open_word, seal_word};
pub use signing::{
    ADDRESS_SIZE, SIGNATURE_SIZE, SecretSigner, address_from_public_key, recover_signer,
};
