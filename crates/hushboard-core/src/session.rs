//! Chain/signer context tracking.
//!
//! The [`SessionTracker`] re-derives the [`SessionContext`] from wallet
//! events and hands out [`SessionFingerprint`]s. An operation captures a
//! fingerprint when it starts and compares it when it completes; any
//! mismatch means the account or network drifted underneath it.

use crate::types::{Address, ChainId};

/// Wallet provider notifications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalletEvent {
    /// Accounts were granted (connect succeeded).
    Connected {
        /// Authorized accounts, first is active.
        accounts: Vec<Address>,
        /// Chain the wallet is on.
        chain_id: ChainId,
    },

    /// Active account list changed. Empty means the user disconnected.
    AccountsChanged(Vec<Address>),

    /// Wallet switched networks.
    ChainChanged(ChainId),

    /// Provider disconnected or the user logged out.
    Disconnected,
}

/// Connected wallet state as seen by the core.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionContext {
    /// Current chain. `None` before the wallet reports one.
    pub chain_id: Option<ChainId>,
    /// Active account. `None` when no account is authorized.
    pub signer: Option<Address>,
    /// Both an account and a chain are known.
    pub is_connected: bool,
}

impl SessionContext {
    /// Context with no wallet attached.
    pub fn disconnected() -> Self {
        Self::default()
    }

    /// Context for a connected signer on `chain_id`.
    pub fn connected(chain_id: ChainId, signer: Address) -> Self {
        Self { chain_id: Some(chain_id), signer: Some(signer), is_connected: true }
    }
}

/// Snapshot of the session identity captured at operation start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionFingerprint {
    /// Increments on every observable context change.
    pub epoch: u64,
    /// Chain at capture time.
    pub chain_id: Option<ChainId>,
    /// Signer at capture time.
    pub signer: Option<Address>,
}

/// What changed when a wallet event was applied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionChange {
    /// Chain id differs from the previous context.
    pub chain_changed: bool,
    /// Active account differs from the previous context.
    pub signer_changed: bool,
    /// Connected flag flipped.
    pub connection_changed: bool,
}

impl SessionChange {
    /// Check if anything observable changed.
    pub fn any(&self) -> bool {
        self.chain_changed || self.signer_changed || self.connection_changed
    }
}

/// Derives the session context from wallet events.
///
/// # Invariants
///
/// - `epoch` only increases
/// - `epoch` increases iff `apply` reports a change
/// - `is_connected` implies both `chain_id` and `signer` are set
#[derive(Debug, Clone, Default)]
pub struct SessionTracker {
    context: SessionContext,
    epoch: u64,
}

impl SessionTracker {
    /// Create a tracker in the disconnected state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current context.
    pub fn context(&self) -> &SessionContext {
        &self.context
    }

    /// Current epoch.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Fingerprint of the current context.
    pub fn fingerprint(&self) -> SessionFingerprint {
        SessionFingerprint {
            epoch: self.epoch,
            chain_id: self.context.chain_id,
            signer: self.context.signer,
        }
    }

    /// Apply a wallet event. Returns `None` if the context is unchanged.
    pub fn apply(&mut self, event: WalletEvent) -> Option<SessionChange> {
        let mut next = self.context.clone();

        match event {
            WalletEvent::Connected { accounts, chain_id } => {
                next.signer = accounts.first().copied();
                next.chain_id = Some(chain_id);
            },
            WalletEvent::AccountsChanged(accounts) => {
                next.signer = accounts.first().copied();
            },
            WalletEvent::ChainChanged(chain_id) => {
                next.chain_id = Some(chain_id);
            },
            WalletEvent::Disconnected => {
                next = SessionContext::disconnected();
            },
        }
        next.is_connected = next.signer.is_some() && next.chain_id.is_some();

        let change = SessionChange {
            chain_changed: next.chain_id != self.context.chain_id,
            signer_changed: next.signer != self.context.signer,
            connection_changed: next.is_connected != self.context.is_connected,
        };

        if !change.any() {
            return None;
        }

        tracing::debug!(
            epoch = self.epoch + 1,
            chain_id = ?next.chain_id,
            signer = ?next.signer,
            "session context changed"
        );

        self.context = next;
        self.epoch += 1;
        Some(change)
    }

    /// Check if `fingerprint` still describes the current context.
    pub fn is_current(&self, fingerprint: &SessionFingerprint) -> bool {
        fingerprint.epoch == self.epoch
    }

    /// Check if the chain is unchanged since `fingerprint`.
    pub fn same_chain(&self, fingerprint: &SessionFingerprint) -> bool {
        fingerprint.chain_id == self.context.chain_id
    }

    /// Check if the signer is unchanged since `fingerprint`.
    pub fn same_signer(&self, fingerprint: &SessionFingerprint) -> bool {
        fingerprint.signer == self.context.signer
    }
}
