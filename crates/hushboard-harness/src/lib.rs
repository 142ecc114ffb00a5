//! Deterministic simulation harness for Hushboard.
//!
//! In-process implementations of the wallet, FHE SDK and message ledger
//! seams, seeded from one [`SimEnv`] so every run is reproducible. The
//! collaborators do real cryptography (secp256k1 permit signatures, sealed
//! words, ACL checks) so the orchestrator is exercised against the same
//! failure modes a live chain produces.
//!
//! # Interleavings
//!
//! Every collaborator call passes through a [`Gate`]. Closing a gate parks
//! calls in flight, letting tests change the session or issue competing
//! commands before the call completes.
//!
//! # Invariant Testing
//!
//! The `invariants` module provides behavioral testing through invariant
//! checks over published status snapshots. Use
//! [`InvariantRegistry::standard()`] for the orchestrator invariants.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod coprocessor;
pub mod gate;
pub mod invariants;
pub mod sim_env;
pub mod sim_ledger;
pub mod sim_wallet;
pub mod world;

pub use coprocessor::{GATEWAY_VERIFIER, LocalCoprocessor, LocalFheSdk};
pub use gate::Gate;
pub use invariants::{
    DecryptedSubsetOfReceived, DeployedMatchesNetwork, DisconnectedIsEmpty, EpochMonotonicity,
    FlagsMatchGuards, Invariant, InvariantRegistry, InvariantResult, SentIdsUnique, StatusTrace,
    Violation,
};
pub use sim_env::{SIM_EPOCH, SimEnv};
pub use sim_ledger::{LedgerCalls, SimLedger};
pub use sim_wallet::SimWallet;
pub use world::{SimRuntime, SimWorld};
