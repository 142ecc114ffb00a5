//! Error types for the external collaborators.
//!
//! Each collaborator fails independently, so each gets its own strongly-typed
//! error. The orchestrator converts them at its boundary; nothing here decides
//! how an error is presented.

use thiserror::Error;

use crate::types::{Address, ChainId};

/// Errors from the wallet provider.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WalletError {
    /// User declined the wallet prompt.
    #[error("user rejected the wallet request")]
    Rejected,

    /// No account is connected.
    #[error("wallet is disconnected")]
    Disconnected,

    /// Wallet does not know the requested chain.
    #[error("chain {chain_id} is not configured in the wallet")]
    UnknownChain {
        /// Requested chain.
        chain_id: ChainId,
    },

    /// Provider request failed.
    #[error("wallet request failed: {reason}")]
    Request {
        /// Provider error description.
        reason: String,
    },
}

/// Errors from the FHE SDK and instance provider.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FheError {
    /// No FHE parameters exist for the chain.
    #[error("chain {chain_id} has no FHE support")]
    Unsupported {
        /// Requested chain.
        chain_id: ChainId,
    },

    /// Parameter derivation could not reach the network.
    #[error("FHE network unavailable: {reason}")]
    NetworkUnavailable {
        /// Underlying failure.
        reason: String,
    },

    /// Parameter derivation failed.
    #[error("FHE instance derivation failed: {reason}")]
    DerivationFailed {
        /// Underlying failure.
        reason: String,
    },

    /// The instance was retired while the call was in flight.
    #[error("FHE instance was retired while the call was in flight")]
    StaleInstance,

    /// Input encryption failed.
    #[error("encryption failed: {reason}")]
    EncryptionFailed {
        /// Underlying failure.
        reason: String,
    },

    /// Re-encryption request was refused or produced no value.
    #[error("decryption failed: {reason}")]
    DecryptionFailed {
        /// Underlying failure.
        reason: String,
    },
}

impl FheError {
    /// Returns true if this error is transient and may succeed on retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::NetworkUnavailable { .. })
    }
}

/// Errors from the message ledger.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// No contract code at the address on the current chain.
    #[error("no message board contract at {contract}")]
    ContractNotDeployed {
        /// Address that was called.
        contract: Address,
    },

    /// Transaction or call reverted.
    #[error("transaction reverted: {reason}")]
    TransactionReverted {
        /// Revert reason, if the node reported one.
        reason: String,
    },

    /// RPC endpoint did not answer.
    #[error("RPC unavailable: {reason}")]
    RpcUnavailable {
        /// Underlying failure.
        reason: String,
    },
}

impl LedgerError {
    /// Returns true if this error is transient and may succeed on retry.
    ///
    /// Reverts are deterministic for the same input; only transport failures
    /// are worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::RpcUnavailable { .. })
    }
}

/// Errors from the signature store backend.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("signature store error: {reason}")]
pub struct StoreError {
    /// Underlying failure.
    pub reason: String,
}

/// Errors obtaining a decryption signature.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignatureError {
    /// User declined the signing prompt.
    #[error("user rejected the signature request")]
    SigningRejected,

    /// Wallet could not be reached.
    #[error("wallet unavailable: {0}")]
    Wallet(WalletError),

    /// Permit could not be built or the minted signature does not match the
    /// requested key.
    #[error("invalid decryption permit: {reason}")]
    InvalidPermit {
        /// What was wrong.
        reason: String,
    },
}

impl From<WalletError> for SignatureError {
    fn from(err: WalletError) -> Self {
        match err {
            WalletError::Rejected => Self::SigningRejected,
            other => Self::Wallet(other),
        }
    }
}

impl From<FheError> for SignatureError {
    fn from(err: FheError) -> Self {
        Self::InvalidPermit { reason: err.to_string() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wallet_rejection_becomes_signing_rejected() {
        assert_eq!(SignatureError::from(WalletError::Rejected), SignatureError::SigningRejected);
        assert!(matches!(
            SignatureError::from(WalletError::Disconnected),
            SignatureError::Wallet(WalletError::Disconnected)
        ));
    }

    #[test]
    fn only_transport_failures_are_transient() {
        assert!(LedgerError::RpcUnavailable { reason: "timeout".into() }.is_transient());
        assert!(!LedgerError::TransactionReverted { reason: "bad".into() }.is_transient());
        assert!(!LedgerError::ContractNotDeployed { contract: Address::ZERO }.is_transient());

        assert!(FheError::NetworkUnavailable { reason: "down".into() }.is_transient());
        assert!(!FheError::StaleInstance.is_transient());
    }
}
