//! Simulated local chain for end-to-end runtime tests.
//!
//! Wires one coprocessor, the SDK endpoint serving it and the message board
//! into the default local preset, so runtimes built here talk to the same
//! chain and see each other's messages.

use std::sync::Arc;

use hushboard_app::{Executor, OrchestratorConfig, Runtime};
use hushboard_core::{
    Address, FheInstance, LOCAL_CHAIN_ID, LOCAL_RPC_URL, MemorySignatureStore, MessageId,
    MessageLedger,
};
use hushboard_crypto::encode_text;

use crate::{LocalCoprocessor, LocalFheSdk, SimEnv, SimLedger, SimWallet};

/// Runtime type every simulated client uses.
pub type SimRuntime = Runtime<MemorySignatureStore, SimEnv>;

/// Simulated local development chain.
pub struct SimWorld {
    env: SimEnv,
    coprocessor: LocalCoprocessor,
    sdk: LocalFheSdk,
    ledger: SimLedger,
    config: OrchestratorConfig,
}

impl SimWorld {
    /// Local chain with the default configuration preset.
    pub fn new(seed: u64) -> Self {
        Self::with_config(seed, OrchestratorConfig::default())
    }

    /// Local chain serving `config`'s local deployment.
    ///
    /// A config without a local deployment gets a board at the zero
    /// address, which no runtime will call.
    pub fn with_config(seed: u64, config: OrchestratorConfig) -> Self {
        let env = SimEnv::with_seed(seed);
        let coprocessor = LocalCoprocessor::new(LOCAL_CHAIN_ID, env.clone());

        let sdk = LocalFheSdk::new();
        sdk.register(LOCAL_RPC_URL, coprocessor.clone());

        let contract = config.deployments.contract(LOCAL_CHAIN_ID).unwrap_or_default();
        let ledger = SimLedger::new(contract, coprocessor.clone());

        Self { env, coprocessor, sdk, ledger, config }
    }

    /// Shared environment.
    pub fn env(&self) -> &SimEnv {
        &self.env
    }

    /// Local chain coprocessor.
    pub fn coprocessor(&self) -> &LocalCoprocessor {
        &self.coprocessor
    }

    /// SDK serving the local endpoint.
    pub fn sdk(&self) -> &LocalFheSdk {
        &self.sdk
    }

    /// Message board.
    pub fn ledger(&self) -> &SimLedger {
        &self.ledger
    }

    /// Configuration runtimes are built with.
    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Wallet on the local chain holding `accounts` fresh accounts.
    pub fn wallet(&self, accounts: usize) -> SimWallet {
        let wallet = SimWallet::new(LOCAL_CHAIN_ID);
        for _ in 0..accounts {
            wallet.generate(&self.env);
        }
        wallet
    }

    /// Runtime for `wallet` with its own signature store.
    pub fn runtime(&self, wallet: &SimWallet) -> SimRuntime {
        let executor = Executor::new(
            Arc::new(wallet.clone()),
            Arc::new(self.ledger.clone()),
            Arc::new(self.sdk.clone()),
            MemorySignatureStore::new(),
            self.env.clone(),
            self.config.signature_validity_days,
        );
        Runtime::new(self.config.clone(), executor)
    }

    /// Post a message directly, bypassing any runtime.
    pub async fn post(
        &self,
        sender: Address,
        recipient: Address,
        text: &str,
    ) -> Result<MessageId, String> {
        let value = encode_text(text).map_err(|e| format!("encode failed: {e}"))?;
        let contract = self.ledger.contract();

        let ciphertext = self
            .coprocessor
            .encrypt_u64(contract, sender, value)
            .await
            .map_err(|e| format!("encrypt failed: {e}"))?;

        let receipt = self
            .ledger
            .submit(contract, sender, recipient, &ciphertext)
            .await
            .map_err(|e| format!("submit failed: {e}"))?;

        Ok(receipt.message_id)
    }
}
