//! Typed decryption permit handed to the wallet for signing.

pub use hushboard_crypto::{DecryptionPermit, Eip712Domain};

/// EIP-712 domain plus permit message.
///
/// Built by an [`crate::FheInstance`] (which knows the chain's verifying
/// contract) and signed by a [`crate::Wallet`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypedPermit {
    /// Signing domain.
    pub domain: Eip712Domain,
    /// Permit message.
    pub message: DecryptionPermit,
}

impl TypedPermit {
    /// Digest the wallet signs.
    pub fn digest(&self) -> [u8; 32] {
        self.message.digest(&self.domain)
    }
}
