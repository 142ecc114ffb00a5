//! In-memory message board.
//!
//! Behaves like the deployed contract: submissions verify their input proof
//! with the coprocessor, grant the recipient and sender access to the handle,
//! and append a record whose index is its message id.

#![allow(clippy::disallowed_types, reason = "Synchronous state updates only")]

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use hushboard_core::{
    Address, Ciphertext, Handle, LedgerError, MessageId, MessageLedger, MessageRecord,
    SubmitReceipt, TxHash,
};
use hushboard_crypto::keccak256;

use crate::{Gate, LocalCoprocessor};

/// Calls the ledger received, by method.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LedgerCalls {
    /// `submit` calls.
    pub submit: usize,
    /// `list_sent` calls.
    pub list_sent: usize,
    /// `list_received` calls.
    pub list_received: usize,
    /// `get_handle` calls.
    pub get_handle: usize,
}

impl LedgerCalls {
    /// Total calls of any kind.
    pub fn total(&self) -> usize {
        self.submit + self.list_sent + self.list_received + self.get_handle
    }
}

struct LedgerState {
    deployed: bool,
    records: Vec<MessageRecord>,
    submissions: Vec<(Address, Ciphertext)>,
    calls: LedgerCalls,
    revert_next: Option<String>,
    offline: bool,
}

/// Message board at one contract address.
#[derive(Clone)]
pub struct SimLedger {
    contract: Address,
    coprocessor: LocalCoprocessor,
    state: Arc<Mutex<LedgerState>>,
    submit_gate: Gate,
}

impl std::fmt::Debug for SimLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimLedger").field("contract", &self.contract).finish_non_exhaustive()
    }
}

impl SimLedger {
    /// Board deployed at `contract`, verifying inputs with `coprocessor`.
    pub fn new(contract: Address, coprocessor: LocalCoprocessor) -> Self {
        Self {
            contract,
            coprocessor,
            state: Arc::new(Mutex::new(LedgerState {
                deployed: true,
                records: Vec::new(),
                submissions: Vec::new(),
                calls: LedgerCalls::default(),
                revert_next: None,
                offline: false,
            })),
            submit_gate: Gate::new(),
        }
    }

    fn state(&self) -> MutexGuard<'_, LedgerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Contract address.
    pub fn contract(&self) -> Address {
        self.contract
    }

    /// Remove or restore the contract code.
    pub fn set_deployed(&self, deployed: bool) {
        self.state().deployed = deployed;
    }

    /// Fail every call with `RpcUnavailable`.
    pub fn set_offline(&self, offline: bool) {
        self.state().offline = offline;
    }

    /// Revert the next submission with `reason`.
    pub fn revert_next(&self, reason: impl Into<String>) {
        self.state().revert_next = Some(reason.into());
    }

    /// Gate every submission passes through.
    pub fn submit_gate(&self) -> &Gate {
        &self.submit_gate
    }

    /// Calls received so far.
    pub fn calls(&self) -> LedgerCalls {
        self.state().calls
    }

    /// Every stored record, in id order.
    pub fn records(&self) -> Vec<MessageRecord> {
        self.state().records.clone()
    }

    /// Recipient and ciphertext of every submission attempt that reached the
    /// contract, in order.
    pub fn submissions(&self) -> Vec<(Address, Ciphertext)> {
        self.state().submissions.clone()
    }

    fn check_contract(&self, contract: Address) -> Result<(), LedgerError> {
        let state = self.state();
        if state.offline {
            return Err(LedgerError::RpcUnavailable { reason: "connection refused".to_string() });
        }
        if contract != self.contract || !state.deployed {
            return Err(LedgerError::ContractNotDeployed { contract });
        }
        Ok(())
    }

    fn ids_where(&self, predicate: impl Fn(&MessageRecord) -> bool) -> Vec<MessageId> {
        self.state().records.iter().filter(|r| predicate(r)).map(|r| r.id).collect()
    }
}

#[async_trait]
impl MessageLedger for SimLedger {
    async fn submit(
        &self,
        contract: Address,
        sender: Address,
        recipient: Address,
        ciphertext: &Ciphertext,
    ) -> Result<SubmitReceipt, LedgerError> {
        self.state().calls.submit += 1;
        self.submit_gate.pass().await;
        self.check_contract(contract)?;

        let revert = {
            let mut state = self.state();
            state.submissions.push((recipient, ciphertext.clone()));
            state.revert_next.take()
        };
        if let Some(reason) = revert {
            return Err(LedgerError::TransactionReverted { reason });
        }

        self.coprocessor
            .accept_input(contract, sender, ciphertext)
            .map_err(|reason| LedgerError::TransactionReverted { reason })?;
        self.coprocessor.allow(ciphertext.handle, recipient);

        let mut state = self.state();
        let id = state.records.len() as MessageId;
        state.records.push(MessageRecord { id, sender, recipient, handle: ciphertext.handle });

        let mut preimage = Vec::with_capacity(8 + 32);
        preimage.extend_from_slice(&id.to_be_bytes());
        preimage.extend_from_slice(ciphertext.handle.as_bytes());
        let tx_hash = TxHash::new(keccak256(&preimage));
        drop(state);

        tracing::debug!(message_id = id, %sender, %recipient, "message stored");
        Ok(SubmitReceipt { tx_hash, message_id: id })
    }

    async fn list_sent(
        &self,
        contract: Address,
        user: Address,
    ) -> Result<Vec<MessageId>, LedgerError> {
        self.state().calls.list_sent += 1;
        self.check_contract(contract)?;
        Ok(self.ids_where(|r| r.sender == user))
    }

    async fn list_received(
        &self,
        contract: Address,
        user: Address,
    ) -> Result<Vec<MessageId>, LedgerError> {
        self.state().calls.list_received += 1;
        self.check_contract(contract)?;
        Ok(self.ids_where(|r| r.recipient == user))
    }

    async fn get_handle(
        &self,
        contract: Address,
        message_id: MessageId,
    ) -> Result<Handle, LedgerError> {
        self.state().calls.get_handle += 1;
        self.check_contract(contract)?;

        let index = usize::try_from(message_id).map_err(|_| LedgerError::TransactionReverted {
            reason: format!("message {message_id} does not exist"),
        })?;
        self.state().records.get(index).map(|r| r.handle).ok_or_else(|| {
            LedgerError::TransactionReverted {
                reason: format!("message {message_id} does not exist"),
            }
        })
    }
}
