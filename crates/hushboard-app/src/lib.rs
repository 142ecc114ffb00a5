//! Application layer for Hushboard
//!
//! Pure messaging state machine plus the async runtime that executes its
//! actions, so the same orchestration code runs against a browser wallet, a
//! live chain, or the deterministic simulation in `hushboard-harness`.
//!
//! # Components
//!
//! - [`Orchestrator`]: Messaging state machine (guards, staleness, lists)
//! - [`Executor`]: Performs actions against wallet, ledger and FHE SDK
//! - [`Runtime`]: Drives in-flight operations and publishes
//!   [`StatusSnapshot`]s

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod action;
mod config;
mod error;
mod event;
mod executor;
mod orchestrator;
mod runtime;
mod state;

pub use action::{Action, OpTicket};
pub use config::{DEFAULT_SIGNATURE_VALIDITY_DAYS, OrchestratorConfig, SEPOLIA_RPC_URL};
pub use error::{OperationError, Rejection};
pub use event::Event;
pub use executor::Executor;
pub use orchestrator::Orchestrator;
pub use runtime::{Command, Runtime};
pub use state::{
    DecryptedMessage, InstanceInfo, InstanceState, MessageLists, NetworkStatus, Phase,
    StatusSnapshot,
};
