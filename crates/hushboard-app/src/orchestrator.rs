//! Encrypted messaging orchestrator.
//!
//! This module defines the [`Orchestrator`] state machine, which sequences
//! FHE instance acquisition, message submission, list refreshes and
//! signature-gated decryption completely decoupled from I/O.
//!
//! This is a pure state machine: user commands and [`Event`] inputs produce
//! [`Action`] instructions for the runtime to execute. Completions come back
//! as events carrying the [`OpTicket`] they were issued with.
//!
//! # Guards
//!
//! At most one send, one decrypt and one refresh are in flight. A second
//! attempt while a guard is set is rejected, never queued. Guards are reset
//! on completion and on every session change.
//!
//! # Staleness
//!
//! A completion is applied only if its ticket still owns the guard and its
//! session fingerprint still matches. Anything else belongs to an account or
//! network the user has left and is dropped without user-visible error.

use std::collections::BTreeMap;

use hushboard_core::{
    Address, ChainId, MessageId, SessionContext, SessionTracker, SubmitReceipt, WalletEvent,
};
use hushboard_crypto::{CryptoError, encode_text};

use crate::{
    Action, DecryptedMessage, Event, InstanceInfo, InstanceState, MessageLists, NetworkStatus,
    OpTicket, OperationError, OrchestratorConfig, Phase, Rejection, StatusSnapshot,
};

/// In-flight operation tickets.
#[derive(Debug, Clone, Default)]
struct Guards {
    connecting: Option<u64>,
    switching: Option<u64>,
    sending: Option<u64>,
    refreshing: Option<u64>,
    decrypting: Option<(u64, MessageId)>,
}

impl Guards {
    /// Drop guards of operations bound to the session.
    fn reset_session(&mut self) {
        self.sending = None;
        self.refreshing = None;
        self.decrypting = None;
    }
}

/// Messaging state machine.
///
/// Pure state machine that processes events and produces actions.
/// No I/O dependencies - fully testable without a wallet, chain or SDK.
///
/// # Invariants
///
/// - Every decrypted id is in the received list
/// - The sent list holds no duplicate ids
/// - An instance in `Ready` is bound to the current chain
#[derive(Debug, Clone)]
pub struct Orchestrator {
    config: OrchestratorConfig,
    session: SessionTracker,
    instance: InstanceState,
    guards: Guards,
    /// Set when the ledger reports no code at the deployed address. Cleared
    /// on chain change.
    contract_missing: bool,
    sent: Vec<MessageId>,
    received: Vec<MessageId>,
    decrypted: BTreeMap<MessageId, DecryptedMessage>,
    last_error: Option<OperationError>,
    next_ticket: u64,
}

impl Orchestrator {
    /// Create a disconnected orchestrator.
    pub fn new(config: OrchestratorConfig) -> Self {
        Self {
            config,
            session: SessionTracker::new(),
            instance: InstanceState::None,
            guards: Guards::default(),
            contract_missing: false,
            sent: Vec::new(),
            received: Vec::new(),
            decrypted: BTreeMap::new(),
            last_error: None,
            next_ticket: 0,
        }
    }

    /// Process an event and return actions.
    pub fn handle(&mut self, event: Event) -> Vec<Action> {
        match event {
            Event::Wallet(event) => self.on_wallet_event(event),
            Event::ConnectFinished { ticket, result } => self.on_connect_finished(ticket, result),
            Event::InstanceCreated { ticket, result } => self.on_instance_created(ticket, result),
            Event::SendFinished { ticket, result } => self.on_send_finished(ticket, result),
            Event::RefreshFinished { ticket, result } => self.on_refresh_finished(ticket, result),
            Event::DecryptFinished { ticket, result } => self.on_decrypt_finished(ticket, result),
            Event::SwitchFinished { ticket, result } => self.on_switch_finished(ticket, result),
        }
    }

    /// Ask the wallet for accounts. No-op while a connect is in flight.
    pub fn connect(&mut self) -> Vec<Action> {
        if self.guards.connecting.is_some() {
            return vec![];
        }
        let ticket = self.issue_ticket();
        self.guards.connecting = Some(ticket.id);
        vec![Action::Connect { ticket }, Action::Publish]
    }

    /// Encrypt `text` and send it to `recipient`.
    ///
    /// # Errors
    ///
    /// - `Rejected` for an in-flight send, empty or oversized input, an
    ///   unparsable recipient, or an instance that is not ready
    /// - `WalletDisconnected`, `WrongNetwork`, `ContractNotDeployed` from the
    ///   session and deployment checks
    pub fn send(&mut self, recipient: &str, text: &str) -> Result<Vec<Action>, OperationError> {
        if self.guards.sending.is_some() {
            return self.reject(Rejection::SendInFlight.into());
        }

        let recipient = recipient.trim();
        if recipient.is_empty() {
            return self.reject(Rejection::EmptyRecipient.into());
        }
        if text.is_empty() {
            return self.reject(Rejection::EmptyMessage.into());
        }
        if text.contains('\0') {
            return self.reject(Rejection::NulInMessage.into());
        }

        let max = self.config.message_budget();
        if text.len() > max {
            return self.reject(Rejection::MessageTooLong { len: text.len(), max }.into());
        }

        let Ok(recipient) = recipient.parse::<Address>() else {
            return self
                .reject(Rejection::InvalidRecipient { input: recipient.to_string() }.into());
        };

        let sender = match self.signer() {
            Ok(sender) => sender,
            Err(err) => return self.reject(err),
        };
        let contract = match self.deployed_contract() {
            Ok(contract) => contract,
            Err(err) => return self.reject(err),
        };
        let instance = match self.ready_instance() {
            Ok(instance) => instance,
            Err(err) => return self.reject(err),
        };

        let value = match encode_text(text) {
            Ok(value) => value,
            Err(CryptoError::MessageTooLong { len, max }) => {
                return self.reject(Rejection::MessageTooLong { len, max }.into());
            },
            Err(CryptoError::NulCharacter) => return self.reject(Rejection::NulInMessage.into()),
            Err(e) => {
                return self.reject(OperationError::EncryptionFailed { reason: e.to_string() });
            },
        };

        let ticket = self.issue_ticket();
        self.guards.sending = Some(ticket.id);
        tracing::debug!(ticket = ticket.id, %recipient, "send started");

        Ok(vec![
            Action::Send { ticket, instance, contract, sender, recipient, value },
            Action::Publish,
        ])
    }

    /// Fetch the sent and received lists.
    ///
    /// # Errors
    ///
    /// - `Rejected` if a refresh is in flight or the instance is not ready
    /// - `WalletDisconnected`, `WrongNetwork`, `ContractNotDeployed`
    pub fn refresh(&mut self) -> Result<Vec<Action>, OperationError> {
        if self.guards.refreshing.is_some() {
            return self.reject(Rejection::RefreshInFlight.into());
        }

        let user = match self.signer() {
            Ok(user) => user,
            Err(err) => return self.reject(err),
        };
        let contract = match self.deployed_contract() {
            Ok(contract) => contract,
            Err(err) => return self.reject(err),
        };
        if let Err(err) = self.ready_instance() {
            return self.reject(err);
        }

        let ticket = self.issue_ticket();
        self.guards.refreshing = Some(ticket.id);
        tracing::debug!(ticket = ticket.id, "refresh started");

        Ok(vec![Action::Refresh { ticket, contract, user }, Action::Publish])
    }

    /// Decrypt one received message.
    ///
    /// No-op if the message is already decrypted.
    ///
    /// # Errors
    ///
    /// - `Rejected` if a decrypt is in flight, the id is not in the received
    ///   list, or the instance is not ready
    /// - `WalletDisconnected`, `WrongNetwork`, `ContractNotDeployed`
    pub fn decrypt(&mut self, message_id: MessageId) -> Result<Vec<Action>, OperationError> {
        if self.guards.decrypting.is_some() {
            return self.reject(Rejection::DecryptInFlight.into());
        }

        let user = match self.signer() {
            Ok(user) => user,
            Err(err) => return self.reject(err),
        };
        if !self.received.contains(&message_id) {
            return self.reject(Rejection::UnknownMessage { message_id }.into());
        }
        if self.decrypted.contains_key(&message_id) {
            return Ok(vec![]);
        }

        let contract = match self.deployed_contract() {
            Ok(contract) => contract,
            Err(err) => return self.reject(err),
        };
        let instance = match self.ready_instance() {
            Ok(instance) => instance,
            Err(err) => return self.reject(err),
        };

        let ticket = self.issue_ticket();
        self.guards.decrypting = Some((ticket.id, message_id));
        tracing::debug!(ticket = ticket.id, message_id, "decrypt started");

        Ok(vec![Action::Decrypt { ticket, instance, contract, user, message_id }, Action::Publish])
    }

    /// Ask the wallet to switch to the preferred supported network.
    ///
    /// No-op if already on a supported network or a switch is in flight.
    ///
    /// # Errors
    ///
    /// - `WalletDisconnected` without a connected account
    /// - `Rejected(NoSupportedNetwork)` if the deployment table is empty
    pub fn switch_network(&mut self) -> Result<Vec<Action>, OperationError> {
        if let Err(err) = self.signer() {
            return self.reject(err);
        }
        if self.guards.switching.is_some() {
            return Ok(vec![]);
        }

        let current = self.session.context().chain_id;
        if current.is_some_and(|c| self.config.deployments.is_deployed(c)) {
            return Ok(vec![]);
        }

        let Some(params) = self.config.switch_target().map(|d| d.chain.clone()) else {
            return self.reject(Rejection::NoSupportedNetwork.into());
        };

        let ticket = self.issue_ticket();
        self.guards.switching = Some(ticket.id);
        tracing::info!(chain_id = params.chain_id, "requesting network switch");

        Ok(vec![Action::SwitchNetwork { ticket, params }, Action::Publish])
    }

    /// Re-request the FHE instance after a failed derivation.
    pub fn retry_instance(&mut self) -> Vec<Action> {
        if !matches!(self.instance, InstanceState::Failed(_)) {
            return vec![];
        }
        self.instance = InstanceState::None;
        let mut actions = self.request_instance();
        actions.push(Action::Publish);
        actions
    }

    fn on_wallet_event(&mut self, event: WalletEvent) -> Vec<Action> {
        let Some(change) = self.session.apply(event) else {
            return vec![];
        };

        let mut actions = Vec::new();

        // Everything below was derived for the previous account or network
        self.guards.reset_session();
        self.sent.clear();
        self.received.clear();
        self.decrypted.clear();
        self.last_error = None;

        let connected = self.session.context().is_connected;

        if change.chain_changed || !connected {
            if !matches!(self.instance, InstanceState::None) {
                actions.push(Action::RetireInstance);
            }
            self.instance = InstanceState::None;
            self.contract_missing = false;
        }

        if change.connection_changed && !connected {
            actions.push(Action::ClearSignatures);
        }

        if connected {
            actions.extend(self.request_instance());
        }

        actions.push(Action::Publish);
        actions
    }

    fn on_connect_finished(
        &mut self,
        ticket: OpTicket,
        result: Result<(Vec<Address>, ChainId), OperationError>,
    ) -> Vec<Action> {
        if self.guards.connecting != Some(ticket.id) {
            tracing::debug!(ticket = ticket.id, "dropping stale connect result");
            return vec![];
        }
        self.guards.connecting = None;

        // A wallet event that moved the signer is newer than these accounts
        if !self.session.same_signer(&ticket.fingerprint) {
            self.fail(OperationError::StaleOperation);
            return vec![];
        }

        match result {
            Ok((accounts, _)) if accounts.is_empty() => {
                self.fail(OperationError::WalletDisconnected);
                vec![Action::Publish]
            },
            Ok((accounts, chain_id)) => {
                let mut actions =
                    self.on_wallet_event(WalletEvent::Connected { accounts, chain_id });
                if actions.is_empty() {
                    actions.push(Action::Publish);
                }
                actions
            },
            Err(err) => {
                self.fail(err);
                vec![Action::Publish]
            },
        }
    }

    fn on_instance_created(
        &mut self,
        ticket: OpTicket,
        result: Result<InstanceInfo, OperationError>,
    ) -> Vec<Action> {
        let owns_slot =
            matches!(self.instance, InstanceState::Loading { ticket: t } if t == ticket.id);
        if !owns_slot || !self.session.same_chain(&ticket.fingerprint) {
            tracing::debug!(ticket = ticket.id, "dropping stale instance");
            return vec![];
        }

        let chain_id = self.session.context().chain_id;
        self.instance = match result {
            Ok(info) if Some(info.chain_id) == chain_id => {
                tracing::info!(
                    chain_id = info.chain_id,
                    generation = info.generation,
                    "instance ready"
                );
                InstanceState::Ready(info)
            },
            Ok(info) => {
                let err = OperationError::InstanceDerivationFailed {
                    reason: format!("instance bound to chain {}", info.chain_id),
                };
                self.fail(err.clone());
                InstanceState::Failed(err)
            },
            Err(err) => {
                self.fail(err.clone());
                InstanceState::Failed(err)
            },
        };

        vec![Action::Publish]
    }

    fn on_send_finished(
        &mut self,
        ticket: OpTicket,
        result: Result<SubmitReceipt, OperationError>,
    ) -> Vec<Action> {
        if self.guards.sending != Some(ticket.id) || !self.session.is_current(&ticket.fingerprint) {
            tracing::debug!(ticket = ticket.id, "dropping stale send result");
            return vec![];
        }
        self.guards.sending = None;

        match result {
            Ok(receipt) => {
                if !self.sent.contains(&receipt.message_id) {
                    self.sent.push(receipt.message_id);
                }
                self.last_error = None;
                tracing::info!(
                    message_id = receipt.message_id,
                    tx = %receipt.tx_hash,
                    "message sent"
                );
            },
            Err(err) => self.fail(err),
        }

        vec![Action::Publish]
    }

    fn on_refresh_finished(
        &mut self,
        ticket: OpTicket,
        result: Result<MessageLists, OperationError>,
    ) -> Vec<Action> {
        if self.guards.refreshing != Some(ticket.id)
            || !self.session.is_current(&ticket.fingerprint)
        {
            tracing::debug!(ticket = ticket.id, "dropping stale refresh result");
            return vec![];
        }
        self.guards.refreshing = None;

        match result {
            Ok(lists) => {
                let mut sent = Vec::with_capacity(lists.sent.len());
                for id in lists.sent {
                    if !sent.contains(&id) {
                        sent.push(id);
                    }
                }
                self.sent = sent;
                self.received = lists.received;

                let received = &self.received;
                self.decrypted.retain(|id, _| received.contains(id));
                self.last_error = None;
                tracing::info!(
                    sent = self.sent.len(),
                    received = self.received.len(),
                    "messages refreshed"
                );
            },
            Err(err) => self.fail(err),
        }

        vec![Action::Publish]
    }

    fn on_decrypt_finished(
        &mut self,
        ticket: OpTicket,
        result: Result<DecryptedMessage, OperationError>,
    ) -> Vec<Action> {
        let Some((guard, message_id)) = self.guards.decrypting else {
            tracing::debug!(ticket = ticket.id, "dropping stale decrypt result");
            return vec![];
        };
        if guard != ticket.id || !self.session.is_current(&ticket.fingerprint) {
            tracing::debug!(ticket = ticket.id, "dropping stale decrypt result");
            return vec![];
        }
        self.guards.decrypting = None;

        match result {
            Ok(message) if message.message_id != message_id => {
                self.fail(OperationError::DecryptionFailed {
                    reason: format!("expected message {message_id}, got {}", message.message_id),
                });
            },
            Ok(message) => {
                if self.received.contains(&message_id) {
                    self.decrypted.insert(message_id, message);
                    self.last_error = None;
                    tracing::info!(message_id, "message decrypted");
                } else {
                    tracing::debug!(message_id, "decrypted message no longer received");
                }
            },
            Err(err) => self.fail(err),
        }

        vec![Action::Publish]
    }

    fn on_switch_finished(
        &mut self,
        ticket: OpTicket,
        result: Result<ChainId, OperationError>,
    ) -> Vec<Action> {
        if self.guards.switching != Some(ticket.id) {
            tracing::debug!(ticket = ticket.id, "dropping stale switch result");
            return vec![];
        }
        self.guards.switching = None;

        match result {
            Ok(chain_id) => {
                let mut actions = self.on_wallet_event(WalletEvent::ChainChanged(chain_id));
                if actions.is_empty() {
                    actions.push(Action::Publish);
                }
                actions
            },
            Err(err) => {
                self.fail(err);
                vec![Action::Publish]
            },
        }
    }

    fn request_instance(&mut self) -> Vec<Action> {
        let context = self.session.context();
        let Some(chain_id) = context.chain_id.filter(|_| context.is_connected) else {
            return vec![];
        };
        if matches!(self.instance, InstanceState::Loading { .. } | InstanceState::Ready(_)) {
            return vec![];
        }

        let Some(endpoint) = self.config.endpoint(chain_id).map(str::to_string) else {
            tracing::warn!(chain_id, "no RPC endpoint configured");
            self.instance = InstanceState::Failed(OperationError::UnsupportedChain { chain_id });
            return vec![];
        };

        let ticket = self.issue_ticket();
        self.instance = InstanceState::Loading { ticket: ticket.id };
        vec![Action::CreateInstance { ticket, chain_id, endpoint }]
    }

    fn issue_ticket(&mut self) -> OpTicket {
        self.next_ticket += 1;
        OpTicket { id: self.next_ticket, fingerprint: self.session.fingerprint() }
    }

    fn signer(&self) -> Result<Address, OperationError> {
        let context = self.session.context();
        context.signer.filter(|_| context.is_connected).ok_or(OperationError::WalletDisconnected)
    }

    fn deployed_contract(&self) -> Result<Address, OperationError> {
        let chain_id = self.session.context().chain_id.ok_or(OperationError::WalletDisconnected)?;
        let contract = self
            .config
            .deployments
            .contract(chain_id)
            .ok_or(OperationError::WrongNetwork { chain_id })?;
        if self.contract_missing {
            return Err(OperationError::ContractNotDeployed { contract });
        }
        Ok(contract)
    }

    fn ready_instance(&self) -> Result<InstanceInfo, OperationError> {
        match self.instance {
            InstanceState::Ready(info) => Ok(info),
            _ => Err(Rejection::InstanceNotReady.into()),
        }
    }

    /// Network-status errors are carried by [`NetworkStatus`], never
    /// `last_error`.
    fn reject(&mut self, err: OperationError) -> Result<Vec<Action>, OperationError> {
        tracing::debug!(error = %err, "operation rejected");
        if !err.is_network_status() {
            self.last_error = Some(err.clone());
        }
        Err(err)
    }

    fn fail(&mut self, err: OperationError) {
        if matches!(err, OperationError::ContractNotDeployed { .. }) {
            self.contract_missing = true;
        }
        if err.is_silent() {
            tracing::debug!(error = %err, "operation went stale");
        } else if err.is_network_status() {
            tracing::warn!(error = %err, "message board unavailable on this network");
        } else {
            tracing::warn!(error = %err, "operation failed");
            self.last_error = Some(err);
        }
    }

    /// Current status for subscribers.
    pub fn snapshot(&self) -> StatusSnapshot {
        let context = self.session.context();
        let contract = context.chain_id.and_then(|c| self.config.deployments.contract(c));

        let network = match (context.chain_id, contract) {
            (None, _) => NetworkStatus::Unknown,
            (Some(chain_id), None) => NetworkStatus::WrongNetwork { chain_id },
            (Some(_), Some(contract)) if self.contract_missing => {
                NetworkStatus::ContractMissing { contract }
            },
            (Some(_), Some(contract)) => NetworkStatus::Supported { contract },
        };
        let is_deployed =
            context.chain_id.map(|_| matches!(network, NetworkStatus::Supported { .. }));

        let phase = if context.is_connected {
            match &self.instance {
                InstanceState::None => Phase::NoInstance,
                InstanceState::Loading { .. } => Phase::InstanceLoading,
                InstanceState::Failed(err) => Phase::InstanceFailed(err.clone()),
                InstanceState::Ready(_) => Phase::InstanceReady,
            }
        } else {
            Phase::Disconnected
        };

        let ready = phase == Phase::InstanceReady;
        let deployed = is_deployed == Some(true);

        StatusSnapshot {
            session: context.clone(),
            epoch: self.session.epoch(),
            phase,
            network,
            is_deployed,
            is_sending: self.guards.sending.is_some(),
            is_decrypting: self.guards.decrypting.is_some(),
            is_refreshing: self.guards.refreshing.is_some(),
            can_send_message: ready && deployed && self.guards.sending.is_none(),
            can_decrypt: ready && self.guards.decrypting.is_none(),
            can_get_messages: ready && deployed && self.guards.refreshing.is_none(),
            sent: self.sent.clone(),
            received: self.received.clone(),
            decrypted: self.decrypted.clone(),
            last_error: self.last_error.clone(),
        }
    }

    /// Configuration.
    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Current wallet session.
    pub fn session(&self) -> &SessionContext {
        self.session.context()
    }

    /// Instance lifecycle state.
    pub fn instance_state(&self) -> &InstanceState {
        &self.instance
    }

    /// Ids sent by the user.
    pub fn sent(&self) -> &[MessageId] {
        &self.sent
    }

    /// Ids addressed to the user.
    pub fn received(&self) -> &[MessageId] {
        &self.received
    }

    /// Decrypted received messages.
    pub fn decrypted(&self) -> &BTreeMap<MessageId, DecryptedMessage> {
        &self.decrypted
    }

    /// Most recent user-visible error.
    pub fn last_error(&self) -> Option<&OperationError> {
        self.last_error.as_ref()
    }
}
