//! Orchestrator input events.
//!
//! Events originate from two sources:
//! - Wallet provider notifications (account and network changes)
//! - Completions of actions the runtime executed

use hushboard_core::{Address, ChainId, SubmitReceipt, WalletEvent};

use crate::{DecryptedMessage, InstanceInfo, MessageLists, OpTicket, OperationError};

/// Events processed by the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Wallet provider notification.
    Wallet(WalletEvent),

    /// Connect round trip finished.
    ConnectFinished {
        /// Ticket of the connect action.
        ticket: OpTicket,
        /// Authorized accounts and current chain.
        result: Result<(Vec<Address>, ChainId), OperationError>,
    },

    /// FHE instance derivation finished.
    InstanceCreated {
        /// Ticket of the create action.
        ticket: OpTicket,
        /// Derived instance.
        result: Result<InstanceInfo, OperationError>,
    },

    /// Send finished.
    SendFinished {
        /// Ticket of the send action.
        ticket: OpTicket,
        /// Confirmed submission.
        result: Result<SubmitReceipt, OperationError>,
    },

    /// Refresh finished.
    RefreshFinished {
        /// Ticket of the refresh action.
        ticket: OpTicket,
        /// Fresh id lists.
        result: Result<MessageLists, OperationError>,
    },

    /// Decrypt finished.
    DecryptFinished {
        /// Ticket of the decrypt action.
        ticket: OpTicket,
        /// Clear text.
        result: Result<DecryptedMessage, OperationError>,
    },

    /// Network switch finished.
    SwitchFinished {
        /// Ticket of the switch action.
        ticket: OpTicket,
        /// Chain the wallet reports after switching.
        result: Result<ChainId, OperationError>,
    },
}
