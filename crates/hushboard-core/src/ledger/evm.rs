//! Message board ledger over an EVM JSON-RPC endpoint.

#![allow(clippy::disallowed_types, reason = "Synchronous deployment cache only")]

use std::{
    collections::HashSet,
    sync::{Arc, Mutex, PoisonError},
};

use async_trait::async_trait;
use ethers::{
    abi::RawLog,
    contract::{ContractError, EthEvent, abigen},
    providers::Middleware,
    types::{Bytes, H160, U256},
};

use super::MessageLedger;
use crate::{
    error::LedgerError,
    types::{Address, Ciphertext, Handle, MessageId, SubmitReceipt, TxHash},
};

abigen!(
    FHEMessageBoard,
    r#"[
        {
            "inputs": [
                {"internalType": "address", "name": "recipient", "type": "address"},
                {"internalType": "externalEuint64", "name": "encryptedContent", "type": "bytes32"},
                {"internalType": "bytes", "name": "inputProof", "type": "bytes"}
            ],
            "name": "sendMessage",
            "outputs": [{"internalType": "uint256", "name": "", "type": "uint256"}],
            "stateMutability": "nonpayable",
            "type": "function"
        },
        {
            "inputs": [{"internalType": "address", "name": "user", "type": "address"}],
            "name": "getSentMessages",
            "outputs": [{"internalType": "uint256[]", "name": "", "type": "uint256[]"}],
            "stateMutability": "view",
            "type": "function"
        },
        {
            "inputs": [{"internalType": "address", "name": "user", "type": "address"}],
            "name": "getReceivedMessages",
            "outputs": [{"internalType": "uint256[]", "name": "", "type": "uint256[]"}],
            "stateMutability": "view",
            "type": "function"
        },
        {
            "inputs": [{"internalType": "uint256", "name": "messageId", "type": "uint256"}],
            "name": "getMessageContent",
            "outputs": [{"internalType": "euint64", "name": "", "type": "bytes32"}],
            "stateMutability": "view",
            "type": "function"
        },
        {
            "anonymous": false,
            "inputs": [
                {
                    "indexed": true,
                    "internalType": "uint256",
                    "name": "messageId",
                    "type": "uint256"
                },
                {"indexed": true, "internalType": "address", "name": "sender", "type": "address"},
                {"indexed": true, "internalType": "address", "name": "recipient", "type": "address"}
            ],
            "name": "MessageSent",
            "type": "event"
        }
    ]"#
);

/// [`MessageLedger`] backed by a deployed message board contract.
///
/// Transactions are sent from the middleware's signer; the `sender` passed to
/// [`MessageLedger::submit`] is set as the `from` address so a mismatched
/// signer fails at the node instead of posting under the wrong account.
pub struct EvmLedger<M> {
    client: Arc<M>,
    confirmations: usize,
    verified: Mutex<HashSet<Address>>,
}

impl<M: Middleware + 'static> EvmLedger<M> {
    /// Create a ledger waiting for `confirmations` blocks per submission.
    pub fn new(client: Arc<M>, confirmations: usize) -> Self {
        Self { client, confirmations: confirmations.max(1), verified: Mutex::new(HashSet::new()) }
    }

    fn board(&self, contract: Address) -> FHEMessageBoard<M> {
        FHEMessageBoard::new(to_h160(contract), self.client.clone())
    }

    /// Fail with `ContractNotDeployed` if there is no code at `contract`.
    ///
    /// A positive answer is remembered; code cannot disappear from an address
    /// on a live chain.
    async fn ensure_deployed(&self, contract: Address) -> Result<(), LedgerError> {
        if self.verified.lock().unwrap_or_else(PoisonError::into_inner).contains(&contract) {
            return Ok(());
        }

        let code = self
            .client
            .get_code(to_h160(contract), None)
            .await
            .map_err(|e| LedgerError::RpcUnavailable { reason: e.to_string() })?;

        if code.as_ref().is_empty() {
            tracing::warn!(%contract, "no message board code at address");
            return Err(LedgerError::ContractNotDeployed { contract });
        }

        self.verified.lock().unwrap_or_else(PoisonError::into_inner).insert(contract);
        Ok(())
    }
}

#[async_trait]
impl<M: Middleware + 'static> MessageLedger for EvmLedger<M> {
    async fn submit(
        &self,
        contract: Address,
        sender: Address,
        recipient: Address,
        ciphertext: &Ciphertext,
    ) -> Result<SubmitReceipt, LedgerError> {
        self.ensure_deployed(contract).await?;

        let call = self
            .board(contract)
            .send_message(
                to_h160(recipient),
                *ciphertext.handle.as_bytes(),
                Bytes::from(ciphertext.input_proof.clone()),
            )
            .from(to_h160(sender));

        let pending = call.send().await.map_err(map_contract_error)?;
        let tx_hash = TxHash::new(pending.tx_hash().0);

        let receipt = pending
            .confirmations(self.confirmations)
            .await
            .map_err(|e| LedgerError::RpcUnavailable { reason: e.to_string() })?
            .ok_or_else(|| LedgerError::TransactionReverted {
                reason: format!("transaction {tx_hash} dropped from mempool"),
            })?;

        if receipt.status.is_some_and(|s| s.is_zero()) {
            return Err(LedgerError::TransactionReverted {
                reason: format!("transaction {tx_hash} failed"),
            });
        }

        let event = receipt
            .logs
            .into_iter()
            .find_map(|log| {
                let raw = RawLog { topics: log.topics, data: log.data.to_vec() };
                MessageSentFilter::decode_log(&raw).ok()
            })
            .ok_or_else(|| LedgerError::TransactionReverted {
                reason: format!("transaction {tx_hash} emitted no MessageSent event"),
            })?;

        let message_id = to_message_id(event.message_id)?;
        tracing::info!(%contract, %tx_hash, message_id, "message confirmed");
        Ok(SubmitReceipt { tx_hash, message_id })
    }

    async fn list_sent(
        &self,
        contract: Address,
        user: Address,
    ) -> Result<Vec<MessageId>, LedgerError> {
        self.ensure_deployed(contract).await?;
        let ids = self
            .board(contract)
            .get_sent_messages(to_h160(user))
            .call()
            .await
            .map_err(map_contract_error)?;
        ids.into_iter().map(to_message_id).collect()
    }

    async fn list_received(
        &self,
        contract: Address,
        user: Address,
    ) -> Result<Vec<MessageId>, LedgerError> {
        self.ensure_deployed(contract).await?;
        let ids = self
            .board(contract)
            .get_received_messages(to_h160(user))
            .call()
            .await
            .map_err(map_contract_error)?;
        ids.into_iter().map(to_message_id).collect()
    }

    async fn get_handle(
        &self,
        contract: Address,
        message_id: MessageId,
    ) -> Result<Handle, LedgerError> {
        self.ensure_deployed(contract).await?;
        let handle = self
            .board(contract)
            .get_message_content(U256::from(message_id))
            .call()
            .await
            .map_err(map_contract_error)?;
        Ok(Handle::new(handle))
    }
}

fn to_h160(address: Address) -> H160 {
    H160::from(*address.as_bytes())
}

fn to_message_id(id: U256) -> Result<MessageId, LedgerError> {
    u64::try_from(id).map_err(|_| LedgerError::TransactionReverted {
        reason: format!("message id {id} does not fit in 64 bits"),
    })
}

fn map_contract_error<M: Middleware>(err: ContractError<M>) -> LedgerError {
    if err.is_revert() {
        let reason = err.decode_revert::<String>().unwrap_or_else(|| err.to_string());
        LedgerError::TransactionReverted { reason }
    } else {
        LedgerError::RpcUnavailable { reason: err.to_string() }
    }
}
