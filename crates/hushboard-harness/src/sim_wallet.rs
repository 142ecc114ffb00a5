//! Local-key wallet.
//!
//! Holds secp256k1 keys and signs permits for real, so the coprocessor's
//! signer recovery sees genuine signatures. User interaction is scripted:
//! prompts are counted, and rejection can be toggled per kind.

#![allow(clippy::disallowed_types, reason = "Synchronous state updates only")]

use std::{
    collections::BTreeSet,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use async_trait::async_trait;
use hushboard_core::{
    Address, ChainId, ChainParams, Environment, TypedPermit, Wallet, WalletError, WalletEvent,
};
use hushboard_crypto::{CryptoError, SecretSigner};
use tokio::sync::mpsc;

use crate::Gate;

struct WalletState {
    signers: Vec<SecretSigner>,
    chain_id: ChainId,
    known_chains: BTreeSet<ChainId>,
    authorized: bool,
    reject_connect: bool,
    reject_signing: bool,
    sign_prompts: usize,
    added_chains: Vec<ChainParams>,
    events: Option<mpsc::Sender<WalletEvent>>,
}

/// Scripted wallet over local secret keys.
///
/// Clones share accounts, chain and counters.
#[derive(Clone)]
pub struct SimWallet {
    state: Arc<Mutex<WalletState>>,
    sign_gate: Gate,
}

impl std::fmt::Debug for SimWallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state();
        f.debug_struct("SimWallet")
            .field("accounts", &state.signers.len())
            .field("chain_id", &state.chain_id)
            .finish_non_exhaustive()
    }
}

impl SimWallet {
    /// Wallet on `chain_id` with no accounts. Only `chain_id` is known.
    pub fn new(chain_id: ChainId) -> Self {
        Self {
            state: Arc::new(Mutex::new(WalletState {
                signers: Vec::new(),
                chain_id,
                known_chains: BTreeSet::from([chain_id]),
                authorized: false,
                reject_connect: false,
                reject_signing: false,
                sign_prompts: 0,
                added_chains: Vec::new(),
                events: None,
            })),
            sign_gate: Gate::new(),
        }
    }

    fn state(&self) -> MutexGuard<'_, WalletState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Import an account from secret bytes.
    pub fn import(&self, secret: &[u8; 32]) -> Result<Address, CryptoError> {
        let signer = SecretSigner::from_bytes(secret)?;
        let address = Address::from(signer.address());
        self.state().signers.push(signer);
        Ok(address)
    }

    /// Generate an account from `env` randomness.
    pub fn generate<E: Environment>(&self, env: &E) -> Address {
        loop {
            // Out-of-range scalars are astronomically rare; draw again
            if let Ok(address) = self.import(&env.random_32()) {
                return address;
            }
        }
    }

    /// Authorized accounts, active first.
    pub fn accounts(&self) -> Vec<Address> {
        self.state().signers.iter().map(|s| Address::from(s.address())).collect()
    }

    /// Chain the wallet is on.
    pub fn current_chain(&self) -> ChainId {
        self.state().chain_id
    }

    /// Deliver provider notifications to `events`.
    pub fn set_event_sink(&self, events: mpsc::Sender<WalletEvent>) {
        self.state().events = Some(events);
    }

    /// Stop delivering notifications, closing the wallet's end of the channel.
    pub fn clear_event_sink(&self) {
        self.state().events = None;
    }

    fn emit(state: &WalletState, event: WalletEvent) {
        if let Some(events) = &state.events {
            if let Err(e) = events.try_send(event) {
                tracing::warn!(error = %e, "wallet event dropped");
            }
        }
    }

    /// Make `account` the active account, as if the user picked it.
    pub fn select_account(&self, account: Address) {
        let mut state = self.state();
        let position = state.signers.iter().position(|s| Address::from(s.address()) == account);
        if let Some(index) = position {
            let signer = state.signers.remove(index);
            state.signers.insert(0, signer);
        }
        if state.authorized {
            let accounts = state.signers.iter().map(|s| Address::from(s.address())).collect();
            Self::emit(&state, WalletEvent::AccountsChanged(accounts));
        }
    }

    /// Move to `chain_id`, as if the user switched in the wallet UI.
    pub fn change_chain(&self, chain_id: ChainId) {
        let mut state = self.state();
        state.known_chains.insert(chain_id);
        state.chain_id = chain_id;
        Self::emit(&state, WalletEvent::ChainChanged(chain_id));
    }

    /// Revoke authorization, as if the user disconnected the site.
    pub fn disconnect(&self) {
        let mut state = self.state();
        state.authorized = false;
        Self::emit(&state, WalletEvent::Disconnected);
    }

    /// Decline every account request.
    pub fn set_reject_connect(&self, reject: bool) {
        self.state().reject_connect = reject;
    }

    /// Decline every signing prompt.
    pub fn set_reject_signing(&self, reject: bool) {
        self.state().reject_signing = reject;
    }

    /// Number of signing prompts shown.
    pub fn sign_prompts(&self) -> usize {
        self.state().sign_prompts
    }

    /// Networks added through `add_chain`.
    pub fn added_chains(&self) -> Vec<ChainParams> {
        self.state().added_chains.clone()
    }

    /// Gate every signing prompt passes through.
    pub fn sign_gate(&self) -> &Gate {
        &self.sign_gate
    }
}

#[async_trait]
impl Wallet for SimWallet {
    async fn request_accounts(&self) -> Result<Vec<Address>, WalletError> {
        let mut state = self.state();
        if state.reject_connect {
            return Err(WalletError::Rejected);
        }
        state.authorized = true;
        Ok(state.signers.iter().map(|s| Address::from(s.address())).collect())
    }

    async fn chain_id(&self) -> Result<ChainId, WalletError> {
        Ok(self.state().chain_id)
    }

    async fn sign_typed_data(
        &self,
        signer: Address,
        permit: &TypedPermit,
    ) -> Result<Vec<u8>, WalletError> {
        self.sign_gate.pass().await;

        let key = {
            let mut state = self.state();
            if !state.authorized {
                return Err(WalletError::Disconnected);
            }
            if permit.domain.chain_id != state.chain_id {
                return Err(WalletError::Request {
                    reason: format!(
                        "permit is for chain {}, wallet is on {}",
                        permit.domain.chain_id, state.chain_id
                    ),
                });
            }

            state.sign_prompts += 1;
            if state.reject_signing {
                return Err(WalletError::Rejected);
            }

            state
                .signers
                .iter()
                .find(|s| Address::from(s.address()) == signer)
                .cloned()
                .ok_or_else(|| WalletError::Request {
                    reason: format!("unknown account {signer}"),
                })?
        };

        let signature = key
            .sign_digest(&permit.digest())
            .map_err(|e| WalletError::Request { reason: e.to_string() })?;
        tracing::debug!(%signer, "signed decryption permit");
        Ok(signature.to_vec())
    }

    async fn switch_chain(&self, chain_id: ChainId) -> Result<(), WalletError> {
        let mut state = self.state();
        if !state.known_chains.contains(&chain_id) {
            return Err(WalletError::UnknownChain { chain_id });
        }
        if state.chain_id != chain_id {
            state.chain_id = chain_id;
            Self::emit(&state, WalletEvent::ChainChanged(chain_id));
        }
        Ok(())
    }

    async fn add_chain(&self, params: &ChainParams) -> Result<(), WalletError> {
        let mut state = self.state();
        state.known_chains.insert(params.chain_id);
        state.added_chains.push(params.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use hushboard_core::{SEPOLIA_CHAIN_ID, permit::Eip712Domain};
    use hushboard_crypto::{DecryptionPermit, recover_signer};

    use super::*;
    use crate::SimEnv;

    fn permit(chain_id: ChainId) -> TypedPermit {
        TypedPermit {
            domain: Eip712Domain {
                name: "Decryption".to_string(),
                version: "1".to_string(),
                chain_id,
                verifying_contract: [0xde; 20],
            },
            message: DecryptionPermit {
                public_key: vec![1; 32],
                contract_addresses: vec![[0xc0; 20]],
                start_timestamp: 0,
                duration_days: 1,
            },
        }
    }

    #[tokio::test]
    async fn signature_recovers_to_active_account() {
        let wallet = SimWallet::new(31337);
        let alice = wallet.generate(&SimEnv::with_seed(1));
        assert_eq!(wallet.request_accounts().await.unwrap(), vec![alice]);

        let permit = permit(31337);
        let signature = wallet.sign_typed_data(alice, &permit).await.unwrap();
        assert_eq!(Address::from(recover_signer(&permit.digest(), &signature).unwrap()), alice);
        assert_eq!(wallet.sign_prompts(), 1);
    }

    #[tokio::test]
    async fn rejected_prompt_still_counts() {
        let wallet = SimWallet::new(31337);
        let alice = wallet.generate(&SimEnv::with_seed(1));
        let _ = wallet.request_accounts().await.unwrap();
        wallet.set_reject_signing(true);

        assert_eq!(wallet.sign_typed_data(alice, &permit(31337)).await, Err(WalletError::Rejected));
        assert_eq!(wallet.sign_prompts(), 1);
    }

    #[tokio::test]
    async fn unknown_chain_needs_add_first() {
        let wallet = SimWallet::new(31337);
        let (tx, mut rx) = mpsc::channel(4);
        wallet.set_event_sink(tx);

        assert_eq!(
            wallet.switch_chain(SEPOLIA_CHAIN_ID).await,
            Err(WalletError::UnknownChain { chain_id: SEPOLIA_CHAIN_ID })
        );

        wallet.add_chain(&ChainParams::sepolia()).await.unwrap();
        wallet.switch_chain(SEPOLIA_CHAIN_ID).await.unwrap();

        assert_eq!(wallet.current_chain(), SEPOLIA_CHAIN_ID);
        assert_eq!(rx.try_recv().unwrap(), WalletEvent::ChainChanged(SEPOLIA_CHAIN_ID));
    }
}
