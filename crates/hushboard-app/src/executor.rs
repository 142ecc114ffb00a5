//! Executes orchestrator actions against the collaborators.
//!
//! The [`Executor`] is the I/O half of the orchestrator. Every asynchronous
//! [`Action`] becomes a future that owns a clone of the executor and a copy
//! of its inputs, and resolves to the completion [`Event`]. Nothing here
//! decides whether a result is still wanted; the orchestrator does that when
//! the event comes back.

use std::{collections::BTreeSet, sync::Arc};

use hushboard_core::{
    Address, ChainId, ChainParams, DecryptionSignature, DecryptionSignatureCache, Environment,
    FheError, FheSdk, InstanceHandle, InstanceProvider, MessageId, MessageLedger, SignatureError,
    SignatureStore, SubmitReceipt, Wallet, WalletError,
};
use hushboard_crypto::decode_text;

use crate::{
    Action, DecryptedMessage, Event, InstanceInfo, MessageLists, OpTicket, OperationError,
};

/// Collaborator handles shared by all in-flight operations.
///
/// Cheap to clone; clones share the wallet, ledger, instance provider and
/// signature store.
pub struct Executor<S, E> {
    wallet: Arc<dyn Wallet>,
    ledger: Arc<dyn MessageLedger>,
    instances: Arc<InstanceProvider>,
    signatures: DecryptionSignatureCache<S, E>,
    env: E,
    signature_validity_days: u64,
}

impl<S: Clone, E: Clone> Clone for Executor<S, E> {
    fn clone(&self) -> Self {
        Self {
            wallet: Arc::clone(&self.wallet),
            ledger: Arc::clone(&self.ledger),
            instances: Arc::clone(&self.instances),
            signatures: self.signatures.clone(),
            env: self.env.clone(),
            signature_validity_days: self.signature_validity_days,
        }
    }
}

impl<S, E> Executor<S, E>
where
    S: SignatureStore,
    E: Environment,
{
    /// Create an executor over the given collaborators.
    pub fn new(
        wallet: Arc<dyn Wallet>,
        ledger: Arc<dyn MessageLedger>,
        sdk: Arc<dyn FheSdk>,
        store: S,
        env: E,
        signature_validity_days: u64,
    ) -> Self {
        Self {
            wallet,
            ledger,
            instances: Arc::new(InstanceProvider::new(sdk)),
            signatures: DecryptionSignatureCache::new(store, env.clone()),
            env,
            signature_validity_days,
        }
    }

    /// Instance provider.
    pub fn instances(&self) -> &InstanceProvider {
        &self.instances
    }

    /// Decryption signature cache.
    pub fn signatures(&self) -> &DecryptionSignatureCache<S, E> {
        &self.signatures
    }

    /// Perform a local action. Returns `false` if the action is asynchronous
    /// and must go through [`Executor::execute`].
    pub fn apply_local(&self, action: &Action) -> bool {
        match action {
            Action::Publish => true,
            Action::RetireInstance => {
                self.instances.retire();
                true
            },
            Action::ClearSignatures => {
                self.signatures.clear();
                true
            },
            Action::Connect { .. }
            | Action::CreateInstance { .. }
            | Action::Send { .. }
            | Action::Refresh { .. }
            | Action::Decrypt { .. }
            | Action::SwitchNetwork { .. } => false,
        }
    }

    /// Run an asynchronous action to completion.
    ///
    /// Returns `None` for local actions.
    pub async fn execute(self, action: Action) -> Option<Event> {
        let event = match action {
            Action::Publish | Action::RetireInstance | Action::ClearSignatures => return None,

            Action::Connect { ticket } => {
                Event::ConnectFinished { ticket, result: self.connect().await }
            },
            Action::CreateInstance { ticket, chain_id, endpoint } => {
                let result = self
                    .instances
                    .get_instance(chain_id, &endpoint)
                    .await
                    .map(|h| InstanceInfo { chain_id: h.chain_id(), generation: h.generation() })
                    .map_err(OperationError::from);
                Event::InstanceCreated { ticket, result }
            },
            Action::Send { ticket, instance, contract, sender, recipient, value } => {
                let result = self.send(instance, contract, sender, recipient, value).await;
                Event::SendFinished { ticket, result }
            },
            Action::Refresh { ticket, contract, user } => {
                Event::RefreshFinished { ticket, result: self.refresh(contract, user).await }
            },
            Action::Decrypt { ticket, instance, contract, user, message_id } => {
                let result = self.decrypt(ticket, instance, contract, user, message_id).await;
                Event::DecryptFinished { ticket, result }
            },
            Action::SwitchNetwork { ticket, params } => {
                Event::SwitchFinished { ticket, result: self.switch_network(&params).await }
            },
        };

        Some(event)
    }

    async fn connect(&self) -> Result<(Vec<Address>, ChainId), OperationError> {
        let accounts = self.wallet.request_accounts().await?;
        let chain_id = self.wallet.chain_id().await?;
        Ok((accounts, chain_id))
    }

    fn instance(&self, info: InstanceInfo) -> Result<InstanceHandle, OperationError> {
        self.instances
            .current()
            .filter(|h| h.chain_id() == info.chain_id && h.generation() == info.generation)
            .ok_or(OperationError::StaleInstance)
    }

    async fn send(
        &self,
        info: InstanceInfo,
        contract: Address,
        sender: Address,
        recipient: Address,
        value: u64,
    ) -> Result<SubmitReceipt, OperationError> {
        let instance = self.instance(info)?;
        let ciphertext = instance.encrypt_u64(contract, sender, value).await?;
        let receipt = self.ledger.submit(contract, sender, recipient, &ciphertext).await?;
        Ok(receipt)
    }

    async fn refresh(
        &self,
        contract: Address,
        user: Address,
    ) -> Result<MessageLists, OperationError> {
        let (sent, received) = futures::try_join!(
            self.ledger.list_sent(contract, user),
            self.ledger.list_received(contract, user),
        )?;
        Ok(MessageLists { sent, received })
    }

    async fn decrypt(
        &self,
        ticket: OpTicket,
        info: InstanceInfo,
        contract: Address,
        user: Address,
        message_id: MessageId,
    ) -> Result<DecryptedMessage, OperationError> {
        let instance = self.instance(info)?;
        let handle = self.ledger.get_handle(contract, message_id).await?;

        let signature = self
            .signatures
            .get_or_create(contract, user, &[handle], || {
                self.mint_signature(&instance, contract, user)
            })
            .await?;

        // A refused permit must not be served from the cache again
        let value = match instance.user_decrypt(handle, contract, &signature).await {
            Ok(value) => value,
            Err(err @ FheError::DecryptionFailed { .. }) => {
                self.signatures.invalidate(contract, user);
                tracing::debug!(ticket = ticket.id, %contract, %user, "dropped refused signature");
                return Err(err.into());
            },
            Err(err) => return Err(err.into()),
        };
        let clear_text = decode_text(value)?;

        tracing::debug!(ticket = ticket.id, message_id, "decrypted message");
        Ok(DecryptedMessage { message_id, handle, clear_text })
    }

    /// Wallet signing round trip for a contract-wide decryption signature.
    async fn mint_signature(
        &self,
        instance: &InstanceHandle,
        contract: Address,
        user: Address,
    ) -> Result<DecryptionSignature, SignatureError> {
        let keypair = instance.generate_keypair();
        let start_timestamp = self.env.unix_time();
        let duration_days = self.signature_validity_days;

        let permit = instance.create_permit(
            &keypair.public_key,
            &[contract],
            start_timestamp,
            duration_days,
        );
        let signature = self.wallet.sign_typed_data(user, &permit).await?;

        Ok(DecryptionSignature {
            contract,
            user,
            handles: BTreeSet::new(),
            public_key: keypair.public_key,
            private_key: keypair.private_key,
            signature,
            start_timestamp,
            duration_days,
        })
    }

    /// Switch networks, adding the network first if the wallet does not
    /// know it.
    async fn switch_network(
        &self,
        params: &ChainParams,
    ) -> Result<ChainId, OperationError> {
        match self.wallet.switch_chain(params.chain_id).await {
            Ok(()) => {},
            Err(WalletError::UnknownChain { .. }) => {
                tracing::info!(chain_id = params.chain_id, "wallet lacks network, adding it");
                self.wallet.add_chain(params).await?;
                self.wallet.switch_chain(params.chain_id).await?;
            },
            Err(err) => return Err(err.into()),
        }

        Ok(self.wallet.chain_id().await?)
    }
}
