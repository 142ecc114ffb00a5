//! Operation errors surfaced at the orchestrator boundary.
//!
//! Collaborator errors are converted here so the status surface speaks one
//! vocabulary regardless of which system failed.

use hushboard_core::{
    Address, ChainId, FheError, LedgerError, MessageId, SignatureError, WalletError,
};
use hushboard_crypto::CryptoError;
use thiserror::Error;

/// Why a user action was refused before any collaborator was contacted.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// A send is already in flight.
    #[error("a message is already being sent")]
    SendInFlight,

    /// A decrypt is already in flight.
    #[error("a message is already being decrypted")]
    DecryptInFlight,

    /// A refresh is already in flight.
    #[error("messages are already being refreshed")]
    RefreshInFlight,

    /// Recipient field is empty.
    #[error("recipient is empty")]
    EmptyRecipient,

    /// Message text is empty.
    #[error("message is empty")]
    EmptyMessage,

    /// Message text exceeds the byte budget.
    #[error("message is {len} bytes, limit is {max}")]
    MessageTooLong {
        /// UTF-8 length of the text.
        len: usize,
        /// Configured budget.
        max: usize,
    },

    /// Message text contains a NUL character.
    #[error("message contains a NUL character")]
    NulInMessage,

    /// Recipient is not an address.
    #[error("recipient is not an address: {input}")]
    InvalidRecipient {
        /// Text that failed to parse.
        input: String,
    },

    /// FHE instance is not ready yet.
    #[error("FHE instance is not ready")]
    InstanceNotReady,

    /// Message id is not in the received list.
    #[error("message {message_id} is not in the received list")]
    UnknownMessage {
        /// Requested id.
        message_id: MessageId,
    },

    /// No supported chain is configured to switch to.
    #[error("no supported network is configured")]
    NoSupportedNetwork,
}

/// Error surfaced to the user for an operation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OperationError {
    /// No wallet account is connected.
    #[error("wallet is not connected")]
    WalletDisconnected,

    /// The contract has no deployment on the current chain.
    #[error("message board is not deployed on chain {chain_id}")]
    WrongNetwork {
        /// Current chain.
        chain_id: ChainId,
    },

    /// The deployment table names an address with no contract code.
    #[error("no message board contract at {contract}")]
    ContractNotDeployed {
        /// Address from the deployment table.
        contract: Address,
    },

    /// Transaction or call reverted.
    #[error("transaction reverted: {reason}")]
    TransactionReverted {
        /// Revert reason.
        reason: String,
    },

    /// RPC endpoint or wallet transport failed.
    #[error("network unavailable: {reason}")]
    RpcUnavailable {
        /// Underlying failure.
        reason: String,
    },

    /// User declined a wallet prompt.
    #[error("request rejected in wallet")]
    SigningRejected,

    /// FHE instance could not be derived.
    #[error("FHE instance derivation failed: {reason}")]
    InstanceDerivationFailed {
        /// Underlying failure.
        reason: String,
    },

    /// The chain has no FHE support or no configured endpoint.
    #[error("chain {chain_id} is not supported")]
    UnsupportedChain {
        /// Current chain.
        chain_id: ChainId,
    },

    /// Input encryption failed.
    #[error("encryption failed: {reason}")]
    EncryptionFailed {
        /// Underlying failure.
        reason: String,
    },

    /// The FHE instance was retired while the operation ran.
    #[error("FHE instance was replaced during the operation")]
    StaleInstance,

    /// The session changed while the operation ran.
    #[error("session changed during the operation")]
    StaleOperation,

    /// The gateway refused decryption or the clear value is not text.
    #[error("decryption failed: {reason}")]
    DecryptionFailed {
        /// Underlying failure.
        reason: String,
    },

    /// Refused before any collaborator was contacted.
    #[error(transparent)]
    Rejected(#[from] Rejection),
}

impl OperationError {
    /// Returns true if this error should be dropped without user feedback.
    pub fn is_silent(&self) -> bool {
        matches!(self, Self::StaleInstance | Self::StaleOperation)
    }

    /// Returns true if this error describes the network rather than the
    /// operation (shown as a persistent banner, not a toast).
    pub fn is_network_status(&self) -> bool {
        matches!(self, Self::WrongNetwork { .. } | Self::ContractNotDeployed { .. })
    }

    /// Returns true if retrying the same operation may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::RpcUnavailable { .. }
                | Self::SigningRejected
                | Self::StaleInstance
                | Self::StaleOperation
        )
    }
}

impl From<WalletError> for OperationError {
    fn from(err: WalletError) -> Self {
        match err {
            WalletError::Rejected => Self::SigningRejected,
            WalletError::Disconnected => Self::WalletDisconnected,
            WalletError::UnknownChain { chain_id } => Self::UnsupportedChain { chain_id },
            WalletError::Request { reason } => Self::RpcUnavailable { reason },
        }
    }
}

impl From<FheError> for OperationError {
    fn from(err: FheError) -> Self {
        match err {
            FheError::Unsupported { chain_id } => Self::UnsupportedChain { chain_id },
            FheError::NetworkUnavailable { reason } => Self::RpcUnavailable { reason },
            FheError::DerivationFailed { reason } => Self::InstanceDerivationFailed { reason },
            FheError::StaleInstance => Self::StaleInstance,
            FheError::EncryptionFailed { reason } => Self::EncryptionFailed { reason },
            FheError::DecryptionFailed { reason } => Self::DecryptionFailed { reason },
        }
    }
}

impl From<LedgerError> for OperationError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::ContractNotDeployed { contract } => Self::ContractNotDeployed { contract },
            LedgerError::TransactionReverted { reason } => Self::TransactionReverted { reason },
            LedgerError::RpcUnavailable { reason } => Self::RpcUnavailable { reason },
        }
    }
}

impl From<SignatureError> for OperationError {
    fn from(err: SignatureError) -> Self {
        match err {
            SignatureError::SigningRejected => Self::SigningRejected,
            SignatureError::Wallet(wallet) => wallet.into(),
            SignatureError::InvalidPermit { reason } => Self::DecryptionFailed { reason },
        }
    }
}

impl From<CryptoError> for OperationError {
    fn from(err: CryptoError) -> Self {
        Self::DecryptionFailed { reason: err.to_string() }
    }
}
