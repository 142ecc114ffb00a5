//! Message ledger seam.
//!
//! Thin typed interface to the on-chain message board. Implementations
//! translate transport and revert failures into [`LedgerError`].

#[cfg(feature = "evm")]
pub mod evm;

use async_trait::async_trait;

use crate::{
    error::LedgerError,
    types::{Address, Ciphertext, Handle, MessageId, SubmitReceipt},
};

/// On-chain message board.
#[async_trait]
pub trait MessageLedger: Send + Sync + 'static {
    /// Submit an encrypted message from `sender` to `recipient`.
    ///
    /// Returns only after the transaction is confirmed. An unconfirmed
    /// submission is still in flight, never a sent message.
    async fn submit(
        &self,
        contract: Address,
        sender: Address,
        recipient: Address,
        ciphertext: &Ciphertext,
    ) -> Result<SubmitReceipt, LedgerError>;

    /// Ids of messages `user` sent, in submission order.
    async fn list_sent(&self, contract: Address, user: Address)
    -> Result<Vec<MessageId>, LedgerError>;

    /// Ids of messages addressed to `user`, in submission order.
    async fn list_received(
        &self,
        contract: Address,
        user: Address,
    ) -> Result<Vec<MessageId>, LedgerError>;

    /// Ciphertext handle of a message.
    async fn get_handle(&self, contract: Address, message_id: MessageId)
    -> Result<Handle, LedgerError>;
}
