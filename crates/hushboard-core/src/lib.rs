//! Hushboard core
//!
//! Domain types and the collaborator seams the messaging orchestrator is
//! built on. Nothing here owns an event loop: every component is either a
//! pure value, a synchronous cache, or an async trait implemented by a
//! wallet, an FHE SDK, or a ledger binding.
//!
//! # Components
//!
//! - [`SessionTracker`]: Chain/signer context derived from wallet events,
//!   with fingerprints for detecting drift mid-operation
//! - [`DeploymentTable`]: Static chain id to contract address table
//! - [`DecryptionSignatureCache`]: Reusable decryption permits keyed by
//!   contract and user
//! - [`InstanceProvider`]: Lazily derived FHE instance bound to one chain
//! - [`MessageLedger`], [`Wallet`], [`FheSdk`]: External collaborators
//!
//! # Ledger binding (optional)
//!
//! With the `evm` feature enabled, [`ledger::evm::EvmLedger`] talks to a
//! deployed message board contract through any ethers middleware.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod deployment;
pub mod env;
pub mod error;
pub mod fhe;
pub mod ledger;
pub mod permit;
pub mod session;
pub mod signature;
pub mod types;
pub mod wallet;

pub use deployment::{
    ChainParams, Deployment, DeploymentTable, LOCAL_CHAIN_ID, LOCAL_RPC_URL, SEPOLIA_CHAIN_ID,
};
pub use env::{Environment, SystemEnv};
pub use error::{FheError, LedgerError, SignatureError, StoreError, WalletError};
pub use fhe::{FheInstance, FheSdk, InstanceHandle, InstanceProvider, Keypair};
pub use ledger::MessageLedger;
pub use permit::TypedPermit;
pub use session::{
    SessionChange, SessionContext, SessionFingerprint, SessionTracker, WalletEvent,
};
pub use signature::{
    DecryptionSignature, DecryptionSignatureCache, MemorySignatureStore, SignatureKey,
    SignatureStore,
};
pub use types::{
    Address, AddressParseError, ChainId, Ciphertext, Handle, MessageId, MessageRecord,
    SubmitReceipt, TxHash,
};
pub use wallet::Wallet;
