//! Observable orchestrator state.
//!
//! [`StatusSnapshot`] is the view model published to subscribers after every
//! state change. It is a plain value: subscribers never see the live
//! orchestrator.

use std::collections::BTreeMap;

use hushboard_core::{Address, ChainId, Handle, MessageId, SessionContext};

use crate::OperationError;

/// Identity of a provider-managed FHE instance.
///
/// The orchestrator never holds the instance itself. The executor resolves
/// this against the provider and fails with `StaleInstance` if the provider
/// has moved on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstanceInfo {
    /// Chain the instance is bound to.
    pub chain_id: ChainId,
    /// Provider generation.
    pub generation: u64,
}

/// Lifecycle of the FHE instance for the current chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstanceState {
    /// No instance requested.
    None,
    /// Derivation in flight.
    Loading {
        /// Ticket of the derivation.
        ticket: u64,
    },
    /// Derivation failed.
    Failed(OperationError),
    /// Instance usable.
    Ready(InstanceInfo),
}

/// Coarse phase shown to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase {
    /// No wallet account or chain.
    Disconnected,
    /// Connected, no instance requested.
    NoInstance,
    /// Connected, instance being derived.
    InstanceLoading,
    /// Connected, instance derivation failed.
    InstanceFailed(OperationError),
    /// Connected with a usable instance.
    InstanceReady,
}

/// Whether the current network can host the message board.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkStatus {
    /// No chain known.
    Unknown,
    /// Contract deployed on the current chain.
    Supported {
        /// Contract address.
        contract: Address,
    },
    /// No deployment for the current chain.
    WrongNetwork {
        /// Current chain.
        chain_id: ChainId,
    },
    /// Deployment table names an address with no code on the current chain.
    ContractMissing {
        /// Address from the deployment table.
        contract: Address,
    },
}

/// A received message decrypted on this client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecryptedMessage {
    /// Chain-assigned id.
    pub message_id: MessageId,
    /// Handle the clear text was decrypted from.
    pub handle: Handle,
    /// Clear text.
    pub clear_text: String,
}

/// Message id lists as returned by a refresh.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageLists {
    /// Ids sent by the user.
    pub sent: Vec<MessageId>,
    /// Ids addressed to the user.
    pub received: Vec<MessageId>,
}

/// Everything a view layer needs to render the messaging state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusSnapshot {
    /// Wallet session.
    pub session: SessionContext,
    /// Session epoch.
    pub epoch: u64,
    /// Coarse phase.
    pub phase: Phase,
    /// Network status.
    pub network: NetworkStatus,
    /// Contract deployed on the current chain. `None` when no chain is known.
    pub is_deployed: Option<bool>,
    /// A send is in flight.
    pub is_sending: bool,
    /// A decrypt is in flight.
    pub is_decrypting: bool,
    /// A refresh is in flight.
    pub is_refreshing: bool,
    /// Send is currently allowed.
    pub can_send_message: bool,
    /// Decrypt is currently allowed.
    pub can_decrypt: bool,
    /// Refresh is currently allowed.
    pub can_get_messages: bool,
    /// Ids sent by the user.
    pub sent: Vec<MessageId>,
    /// Ids addressed to the user.
    pub received: Vec<MessageId>,
    /// Decrypted received messages by id.
    pub decrypted: BTreeMap<MessageId, DecryptedMessage>,
    /// Most recent user-visible error. Cleared by the next success.
    pub last_error: Option<OperationError>,
}

impl StatusSnapshot {
    /// Snapshot of a fresh, disconnected orchestrator.
    pub fn disconnected() -> Self {
        Self {
            session: SessionContext::disconnected(),
            epoch: 0,
            phase: Phase::Disconnected,
            network: NetworkStatus::Unknown,
            is_deployed: None,
            is_sending: false,
            is_decrypting: false,
            is_refreshing: false,
            can_send_message: false,
            can_decrypt: false,
            can_get_messages: false,
            sent: Vec::new(),
            received: Vec::new(),
            decrypted: BTreeMap::new(),
            last_error: None,
        }
    }

    /// Number of sent messages.
    pub fn sent_count(&self) -> usize {
        self.sent.len()
    }

    /// Number of received messages.
    pub fn received_count(&self) -> usize {
        self.received.len()
    }

    /// Sent plus received.
    pub fn total_count(&self) -> usize {
        self.sent.len() + self.received.len()
    }

    /// Clear text of a received message, if decrypted.
    pub fn clear_text(&self, message_id: MessageId) -> Option<&str> {
        self.decrypted.get(&message_id).map(|m| m.clear_text.as_str())
    }
}
