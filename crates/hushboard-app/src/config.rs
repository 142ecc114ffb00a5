//! Orchestrator configuration.

use std::collections::BTreeMap;

use hushboard_core::{
    ChainId, Deployment, DeploymentTable, LOCAL_CHAIN_ID, LOCAL_RPC_URL, SEPOLIA_CHAIN_ID,
};
use hushboard_crypto::MAX_MESSAGE_BYTES;

/// Default validity window for minted decryption signatures.
pub const DEFAULT_SIGNATURE_VALIDITY_DAYS: u64 = 365;

/// Sepolia RPC endpoint used when no key-specific URL is configured.
pub const SEPOLIA_RPC_URL: &str = "https://sepolia.infura.io/v3/";

/// Static configuration for the orchestrator and its executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorConfig {
    /// Maximum UTF-8 bytes per message. Clamped to the 64-bit word size.
    pub max_message_bytes: usize,
    /// Validity window of newly minted decryption signatures.
    pub signature_validity_days: u64,
    /// RPC endpoint per chain, used to derive FHE instances.
    pub rpc_endpoints: BTreeMap<ChainId, String>,
    /// Message board deployments.
    pub deployments: DeploymentTable,
    /// Network to offer when the wallet is on an unsupported one. Ignored
    /// unless the table has a deployment there.
    pub preferred_chain: Option<ChainId>,
}

impl Default for OrchestratorConfig {
    /// Local development preset.
    ///
    /// Endpoints for the local node and Sepolia; the contract is deployed on
    /// the local node only.
    fn default() -> Self {
        let mut rpc_endpoints = BTreeMap::new();
        rpc_endpoints.insert(LOCAL_CHAIN_ID, LOCAL_RPC_URL.to_string());
        rpc_endpoints.insert(SEPOLIA_CHAIN_ID, SEPOLIA_RPC_URL.to_string());

        Self {
            max_message_bytes: MAX_MESSAGE_BYTES,
            signature_validity_days: DEFAULT_SIGNATURE_VALIDITY_DAYS,
            rpc_endpoints,
            deployments: DeploymentTable::local(),
            preferred_chain: Some(SEPOLIA_CHAIN_ID),
        }
    }
}

impl OrchestratorConfig {
    /// Set the RPC endpoint for `chain_id`.
    #[must_use]
    pub fn with_endpoint(mut self, chain_id: ChainId, endpoint: impl Into<String>) -> Self {
        self.rpc_endpoints.insert(chain_id, endpoint.into());
        self
    }

    /// Add or replace a deployment.
    #[must_use]
    pub fn with_deployment(mut self, deployment: Deployment) -> Self {
        self.deployments.insert(deployment);
        self
    }

    /// Prefer `chain_id` as the network switch target.
    #[must_use]
    pub fn with_preferred_chain(mut self, chain_id: ChainId) -> Self {
        self.preferred_chain = Some(chain_id);
        self
    }

    /// Deployment offered by a network switch.
    pub fn switch_target(&self) -> Option<&Deployment> {
        self.deployments.preferred(self.preferred_chain)
    }

    /// RPC endpoint for `chain_id`. `None` if the chain is not configured.
    pub fn endpoint(&self, chain_id: ChainId) -> Option<&str> {
        self.rpc_endpoints.get(&chain_id).map(String::as_str)
    }

    /// Effective per-message byte budget.
    pub fn message_budget(&self) -> usize {
        self.max_message_bytes.min(MAX_MESSAGE_BYTES)
    }
}

#[cfg(test)]
mod tests {
    use hushboard_core::{Address, ChainParams};

    use super::*;

    #[test]
    fn default_mirrors_local_preset() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.endpoint(LOCAL_CHAIN_ID), Some(LOCAL_RPC_URL));
        assert!(config.endpoint(SEPOLIA_CHAIN_ID).is_some());
        assert!(config.endpoint(1).is_none());
        assert!(config.deployments.is_deployed(LOCAL_CHAIN_ID));
        assert!(!config.deployments.is_deployed(SEPOLIA_CHAIN_ID));
        assert_eq!(config.preferred_chain, Some(SEPOLIA_CHAIN_ID));
        assert_eq!(config.switch_target().map(|d| d.chain.chain_id), Some(LOCAL_CHAIN_ID));
    }

    #[test]
    fn sepolia_deployment_becomes_switch_target() {
        let sepolia = Deployment { contract: Address::new([9; 20]), chain: ChainParams::sepolia() };
        let config = OrchestratorConfig::default().with_deployment(sepolia);

        assert_eq!(config.switch_target().map(|d| d.chain.chain_id), Some(SEPOLIA_CHAIN_ID));

        let config = config.with_preferred_chain(LOCAL_CHAIN_ID);
        assert_eq!(config.switch_target().map(|d| d.chain.chain_id), Some(LOCAL_CHAIN_ID));
    }

    #[test]
    fn budget_never_exceeds_word_size() {
        let config = OrchestratorConfig { max_message_bytes: 64, ..Default::default() };
        assert_eq!(config.message_budget(), MAX_MESSAGE_BYTES);
    }
}
