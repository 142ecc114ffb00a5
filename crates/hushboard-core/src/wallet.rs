//! Wallet provider seam.

use async_trait::async_trait;

use crate::{
    deployment::ChainParams,
    error::WalletError,
    permit::TypedPermit,
    types::{Address, ChainId},
};

/// Wallet provider (browser extension, hardware wallet, local key).
///
/// Account and network changes are not polled through this trait; the
/// provider pushes them as [`crate::WalletEvent`]s.
#[async_trait]
pub trait Wallet: Send + Sync + 'static {
    /// Ask the user to authorize accounts. First account is active.
    async fn request_accounts(&self) -> Result<Vec<Address>, WalletError>;

    /// Chain the wallet is currently on.
    async fn chain_id(&self) -> Result<ChainId, WalletError>;

    /// Sign an EIP-712 permit as `signer`. Returns `r || s || v`.
    ///
    /// Prompts the user; declining surfaces as [`WalletError::Rejected`].
    async fn sign_typed_data(
        &self,
        signer: Address,
        permit: &TypedPermit,
    ) -> Result<Vec<u8>, WalletError>;

    /// Ask the wallet to switch networks.
    ///
    /// Fails with [`WalletError::UnknownChain`] if the wallet has no
    /// configuration for `chain_id`.
    async fn switch_chain(&self, chain_id: ChainId) -> Result<(), WalletError>;

    /// Ask the wallet to add a network configuration.
    async fn add_chain(&self, params: &ChainParams) -> Result<(), WalletError>;
}
