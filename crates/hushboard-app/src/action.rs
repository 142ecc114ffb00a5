//! Side effects requested by the orchestrator.
//!
//! This module defines the [`Action`] enum, the instructions produced by the
//! [`crate::Orchestrator`] for the runtime to execute.

use hushboard_core::{Address, ChainId, ChainParams, MessageId, SessionFingerprint};

use crate::InstanceInfo;

/// Identity of one in-flight operation.
///
/// The completion event echoes the ticket back. A completion whose ticket id
/// no longer matches the guard, or whose fingerprint no longer matches the
/// session, is stale and dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpTicket {
    /// Unique per orchestrator.
    pub id: u64,
    /// Session at operation start.
    pub fingerprint: SessionFingerprint,
}

/// Actions produced by the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Publish a fresh status snapshot.
    Publish,

    /// Ask the wallet for accounts and the current chain.
    Connect {
        /// Operation ticket.
        ticket: OpTicket,
    },

    /// Derive the FHE instance for a chain.
    CreateInstance {
        /// Operation ticket.
        ticket: OpTicket,
        /// Target chain.
        chain_id: ChainId,
        /// RPC endpoint to derive from.
        endpoint: String,
    },

    /// Retire the current FHE instance.
    RetireInstance,

    /// Drop every cached decryption signature.
    ClearSignatures,

    /// Encrypt and submit a message.
    Send {
        /// Operation ticket.
        ticket: OpTicket,
        /// Instance to encrypt with.
        instance: InstanceInfo,
        /// Message board address.
        contract: Address,
        /// Submitting account.
        sender: Address,
        /// Intended reader.
        recipient: Address,
        /// Encoded message word.
        value: u64,
    },

    /// Fetch sent and received id lists.
    Refresh {
        /// Operation ticket.
        ticket: OpTicket,
        /// Message board address.
        contract: Address,
        /// Account whose lists to fetch.
        user: Address,
    },

    /// Decrypt one received message.
    Decrypt {
        /// Operation ticket.
        ticket: OpTicket,
        /// Instance to decrypt with.
        instance: InstanceInfo,
        /// Message board address.
        contract: Address,
        /// Reading account.
        user: Address,
        /// Message to decrypt.
        message_id: MessageId,
    },

    /// Ask the wallet to move to a supported network, adding it if unknown.
    SwitchNetwork {
        /// Operation ticket.
        ticket: OpTicket,
        /// Network to switch to.
        params: ChainParams,
    },
}

impl Action {
    /// Ticket of an asynchronous action. `None` for local actions.
    pub fn ticket(&self) -> Option<OpTicket> {
        match self {
            Self::Publish | Self::RetireInstance | Self::ClearSignatures => None,
            Self::Connect { ticket }
            | Self::CreateInstance { ticket, .. }
            | Self::Send { ticket, .. }
            | Self::Refresh { ticket, .. }
            | Self::Decrypt { ticket, .. }
            | Self::SwitchNetwork { ticket, .. } => Some(*ticket),
        }
    }
}
