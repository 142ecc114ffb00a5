//! Static contract deployment table.
//!
//! "Is the contract deployed on chain X" is answered from this table alone.
//! A chain without an entry is the wrong network; no call is attempted there.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::{Address, ChainId};

/// Chain id of the local Hardhat/Anvil development node.
pub const LOCAL_CHAIN_ID: ChainId = 31337;

/// Default RPC endpoint of the local development node.
pub const LOCAL_RPC_URL: &str = "http://localhost:8545";

/// Chain id of the Sepolia test network.
pub const SEPOLIA_CHAIN_ID: ChainId = 11_155_111;

/// First contract address deployed by the default local deployer account.
const LOCAL_CONTRACT: Address = Address::new([
    0x5f, 0xbd, 0xb2, 0x31, 0x56, 0x78, 0xaf, 0xec, 0xb3, 0x67, 0xf0, 0x32, 0xd9, 0x3f, 0x64, 0x2f,
    0x64, 0x18, 0x0a, 0xa3,
]);

/// Parameters a wallet needs to add a network it does not know.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainParams {
    /// Chain id.
    pub chain_id: ChainId,
    /// Human readable network name.
    pub chain_name: String,
    /// Native currency name.
    pub currency_name: String,
    /// Native currency ticker.
    pub currency_symbol: String,
    /// Native currency decimals.
    pub currency_decimals: u8,
    /// RPC endpoints.
    pub rpc_urls: Vec<String>,
    /// Block explorer URLs.
    pub block_explorer_urls: Vec<String>,
}

impl ChainParams {
    /// Sepolia network parameters for `wallet_addEthereumChain`.
    pub fn sepolia() -> Self {
        Self {
            chain_id: SEPOLIA_CHAIN_ID,
            chain_name: "Sepolia".to_string(),
            currency_name: "Sepolia ETH".to_string(),
            currency_symbol: "SEP".to_string(),
            currency_decimals: 18,
            rpc_urls: vec!["https://sepolia.infura.io/v3/".to_string()],
            block_explorer_urls: vec!["https://sepolia.etherscan.io/".to_string()],
        }
    }
}

/// Message board deployment on one chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deployment {
    /// Contract address.
    pub contract: Address,
    /// Network parameters, used when asking the wallet to switch or add it.
    pub chain: ChainParams,
}

/// Chain id to deployment table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentTable {
    entries: BTreeMap<ChainId, Deployment>,
}

impl DeploymentTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Table with the local development deployment only.
    pub fn local() -> Self {
        Self::new().with(Deployment {
            contract: LOCAL_CONTRACT,
            chain: ChainParams {
                chain_id: LOCAL_CHAIN_ID,
                chain_name: "Hardhat".to_string(),
                currency_name: "Ether".to_string(),
                currency_symbol: "ETH".to_string(),
                currency_decimals: 18,
                rpc_urls: vec![LOCAL_RPC_URL.to_string()],
                block_explorer_urls: Vec::new(),
            },
        })
    }

    /// Table with a Sepolia deployment at `contract`.
    pub fn sepolia(contract: Address) -> Self {
        Self::new().with(Deployment { contract, chain: ChainParams::sepolia() })
    }

    /// Add or replace a deployment.
    #[must_use]
    pub fn with(mut self, deployment: Deployment) -> Self {
        self.insert(deployment);
        self
    }

    /// Add or replace a deployment.
    pub fn insert(&mut self, deployment: Deployment) {
        self.entries.insert(deployment.chain.chain_id, deployment);
    }

    /// Deployment on `chain_id`. `None` if the contract is not deployed there.
    pub fn lookup(&self, chain_id: ChainId) -> Option<&Deployment> {
        self.entries.get(&chain_id)
    }

    /// Contract address on `chain_id`. `None` if not deployed there.
    pub fn contract(&self, chain_id: ChainId) -> Option<Address> {
        self.lookup(chain_id).map(|d| d.contract)
    }

    /// Check if the contract is deployed on `chain_id`.
    pub fn is_deployed(&self, chain_id: ChainId) -> bool {
        self.entries.contains_key(&chain_id)
    }

    /// Switch target when the wallet is on the wrong network.
    ///
    /// The deployment on `preference` if there is one, otherwise the one
    /// with the lowest chain id. `None` if the table is empty.
    pub fn preferred(&self, preference: Option<ChainId>) -> Option<&Deployment> {
        preference
            .and_then(|chain_id| self.lookup(chain_id))
            .or_else(|| self.entries.values().next())
    }

    /// All supported chain ids in ascending order.
    pub fn chain_ids(&self) -> impl Iterator<Item = ChainId> + '_ {
        self.entries.keys().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_table_knows_local_chain_only() {
        let table = DeploymentTable::local();
        assert!(table.is_deployed(LOCAL_CHAIN_ID));
        assert!(!table.is_deployed(1));
        assert_eq!(
            table.contract(LOCAL_CHAIN_ID).map(|a| a.to_string()),
            Some("0x5fbdb2315678afecb367f032d93f642f64180aa3".to_string())
        );
    }

    #[test]
    fn insert_replaces_existing_entry() {
        let mut table = DeploymentTable::local();
        let mut replacement = table.lookup(LOCAL_CHAIN_ID).cloned().unwrap();
        replacement.contract = Address::new([7; 20]);
        table.insert(replacement);

        assert_eq!(table.contract(LOCAL_CHAIN_ID), Some(Address::new([7; 20])));
        assert_eq!(table.chain_ids().count(), 1);
    }

    #[test]
    fn empty_table_has_no_preferred_chain() {
        assert!(DeploymentTable::new().preferred(Some(SEPOLIA_CHAIN_ID)).is_none());
    }

    #[test]
    fn preference_wins_over_lowest_chain_id() {
        let table = DeploymentTable::local().with(Deployment {
            contract: Address::new([9; 20]),
            chain: ChainParams::sepolia(),
        });

        let preferred = table.preferred(Some(SEPOLIA_CHAIN_ID)).map(|d| d.chain.chain_id);
        assert_eq!(preferred, Some(SEPOLIA_CHAIN_ID));
        assert_eq!(table.preferred(None).map(|d| d.chain.chain_id), Some(LOCAL_CHAIN_ID));
    }

    #[test]
    fn undeployed_preference_falls_back() {
        let table = DeploymentTable::local();
        let preferred = table.preferred(Some(SEPOLIA_CHAIN_ID)).map(|d| d.chain.chain_id);
        assert_eq!(preferred, Some(LOCAL_CHAIN_ID));
    }

    #[test]
    fn sepolia_preset_uses_sepolia_params() {
        let table = DeploymentTable::sepolia(Address::new([9; 20]));
        assert_eq!(table.chain_ids().collect::<Vec<_>>(), vec![SEPOLIA_CHAIN_ID]);
        assert_eq!(table.lookup(SEPOLIA_CHAIN_ID).map(|d| &d.chain), Some(&ChainParams::sepolia()));
    }
}
