//! FHE SDK seam and instance provider.
//!
//! An FHE instance is the client-side cryptographic context for one chain:
//! it encrypts inputs for the chain's coprocessor and runs the user
//! decryption protocol against its gateway. Deriving one means fetching
//! public parameters from the network, so the [`InstanceProvider`] caches the
//! instance per (chain id, endpoint) and retires it when the chain changes.
//!
//! # Retirement
//!
//! Every [`InstanceHandle`] shares a retired flag with the provider's slot.
//! A call that completes after its instance was retired fails with
//! [`FheError::StaleInstance`] even if the underlying SDK call succeeded:
//! its result belongs to a chain the session has left.

#![allow(clippy::disallowed_types, reason = "Synchronous slot updates only")]

use std::{
    fmt,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicBool, Ordering},
    },
};

use async_trait::async_trait;

use crate::{
    error::FheError,
    permit::TypedPermit,
    signature::DecryptionSignature,
    types::{Address, ChainId, Ciphertext, Handle},
};

/// Re-encryption keypair for the user decryption protocol.
#[derive(Clone, PartialEq, Eq)]
pub struct Keypair {
    /// Public half, bound into the decryption permit.
    pub public_key: Vec<u8>,
    /// Secret half, presented to the gateway with the signed permit.
    pub private_key: Vec<u8>,
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keypair")
            .field("public_key", &hex::encode(&self.public_key))
            .field("private_key", &"<redacted>")
            .finish()
    }
}

/// Client-side FHE context bound to one chain.
#[async_trait]
pub trait FheInstance: Send + Sync + 'static {
    /// Chain this instance was derived for.
    fn chain_id(&self) -> ChainId;

    /// Encrypt `value` as an input `user` submits to `contract`.
    async fn encrypt_u64(
        &self,
        contract: Address,
        user: Address,
        value: u64,
    ) -> Result<Ciphertext, FheError>;

    /// Generate a fresh re-encryption keypair.
    fn generate_keypair(&self) -> Keypair;

    /// Build the typed permit a wallet signs to authorize user decryption.
    fn create_permit(
        &self,
        public_key: &[u8],
        contracts: &[Address],
        start_timestamp: u64,
        duration_days: u64,
    ) -> TypedPermit;

    /// Decrypt `handle` on `contract` for the signature's user.
    ///
    /// # Errors
    ///
    /// - `DecryptionFailed` if the gateway rejects the signature or the user
    ///   has no access to the handle
    async fn user_decrypt(
        &self,
        handle: Handle,
        contract: Address,
        signature: &DecryptionSignature,
    ) -> Result<u64, FheError>;
}

/// Factory deriving FHE instances from network parameters.
#[async_trait]
pub trait FheSdk: Send + Sync + 'static {
    /// Derive an instance for `chain_id` from the RPC `endpoint`.
    ///
    /// # Errors
    ///
    /// - `Unsupported` if the chain has no FHE deployment
    /// - `NetworkUnavailable` if the endpoint cannot be reached
    /// - `DerivationFailed` if the parameters are malformed
    async fn create_instance(
        &self,
        chain_id: ChainId,
        endpoint: &str,
    ) -> Result<Arc<dyn FheInstance>, FheError>;
}

/// Shared handle to a provider-managed instance.
///
/// Cheap to clone. All clones observe retirement.
#[derive(Clone)]
pub struct InstanceHandle {
    instance: Arc<dyn FheInstance>,
    chain_id: ChainId,
    endpoint: Arc<str>,
    generation: u64,
    retired: Arc<AtomicBool>,
}

impl InstanceHandle {
    fn new(
        instance: Arc<dyn FheInstance>,
        chain_id: ChainId,
        endpoint: &str,
        generation: u64,
    ) -> Self {
        Self {
            instance,
            chain_id,
            endpoint: Arc::from(endpoint),
            generation,
            retired: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Chain the instance is bound to.
    pub fn chain_id(&self) -> ChainId {
        self.chain_id
    }

    /// Endpoint the instance was derived from.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Provider-assigned generation. Strictly increasing per provider.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Check if the instance has been retired.
    pub fn is_retired(&self) -> bool {
        self.retired.load(Ordering::SeqCst)
    }

    fn retire(&self) {
        self.retired.store(true, Ordering::SeqCst);
    }

    fn ensure_live(&self) -> Result<(), FheError> {
        if self.is_retired() { Err(FheError::StaleInstance) } else { Ok(()) }
    }

    /// Encrypt `value` for `contract` as `user`.
    ///
    /// # Errors
    ///
    /// - `StaleInstance` if the instance was retired before or during the call
    pub async fn encrypt_u64(
        &self,
        contract: Address,
        user: Address,
        value: u64,
    ) -> Result<Ciphertext, FheError> {
        self.ensure_live()?;
        let ciphertext = self.instance.encrypt_u64(contract, user, value).await?;
        self.ensure_live()?;
        Ok(ciphertext)
    }

    /// Generate a fresh re-encryption keypair.
    pub fn generate_keypair(&self) -> Keypair {
        self.instance.generate_keypair()
    }

    /// Build a decryption permit for the wallet to sign.
    pub fn create_permit(
        &self,
        public_key: &[u8],
        contracts: &[Address],
        start_timestamp: u64,
        duration_days: u64,
    ) -> TypedPermit {
        self.instance.create_permit(public_key, contracts, start_timestamp, duration_days)
    }

    /// Decrypt `handle` with a user decryption signature.
    ///
    /// # Errors
    ///
    /// - `StaleInstance` if the instance was retired before or during the call
    /// - `DecryptionFailed` if the gateway refused
    pub async fn user_decrypt(
        &self,
        handle: Handle,
        contract: Address,
        signature: &DecryptionSignature,
    ) -> Result<u64, FheError> {
        self.ensure_live()?;
        let value = self.instance.user_decrypt(handle, contract, signature).await?;
        self.ensure_live()?;
        Ok(value)
    }
}

impl fmt::Debug for InstanceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstanceHandle")
            .field("chain_id", &self.chain_id)
            .field("endpoint", &self.endpoint)
            .field("generation", &self.generation)
            .field("retired", &self.is_retired())
            .finish()
    }
}

impl PartialEq for InstanceHandle {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.retired, &other.retired)
    }
}

impl Eq for InstanceHandle {}

#[derive(Default)]
struct Slot {
    current: Option<InstanceHandle>,
    /// Bumped on every retirement. A derivation that started under an older
    /// epoch is stale when it completes.
    epoch: u64,
    generation: u64,
}

/// Lazily derives and caches the FHE instance for the active chain.
///
/// # Invariants
///
/// - At most one live instance at a time
/// - A live instance is never handed out for a different chain id
/// - Once retired, an instance stays retired
pub struct InstanceProvider {
    sdk: Arc<dyn FheSdk>,
    slot: Mutex<Slot>,
}

impl InstanceProvider {
    /// Create a provider deriving instances through `sdk`.
    pub fn new(sdk: Arc<dyn FheSdk>) -> Self {
        Self { sdk, slot: Mutex::new(Slot::default()) }
    }

    fn slot(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Instance for (`chain_id`, `endpoint`), deriving it on first use.
    ///
    /// Idempotent: while the cached instance matches and is live, repeated
    /// calls return it without contacting the SDK. A live instance for a
    /// different chain or endpoint is retired when the new one is installed.
    ///
    /// # Errors
    ///
    /// - `Unsupported`, `NetworkUnavailable`, `DerivationFailed` from the SDK
    /// - `StaleInstance` if [`InstanceProvider::retire`] ran while deriving
    pub async fn get_instance(
        &self,
        chain_id: ChainId,
        endpoint: &str,
    ) -> Result<InstanceHandle, FheError> {
        let started_epoch = {
            let slot = self.slot();
            if let Some(current) = slot.current.as_ref().filter(|h| {
                h.chain_id == chain_id && h.endpoint() == endpoint && !h.is_retired()
            }) {
                tracing::debug!(chain_id, generation = current.generation, "reusing FHE instance");
                return Ok(current.clone());
            }
            slot.epoch
        };

        let instance = self.sdk.create_instance(chain_id, endpoint).await?;
        if instance.chain_id() != chain_id {
            return Err(FheError::DerivationFailed {
                reason: format!("SDK returned an instance for chain {}", instance.chain_id()),
            });
        }

        let mut slot = self.slot();
        if slot.epoch != started_epoch {
            tracing::debug!(chain_id, "discarding FHE instance derived across a retirement");
            return Err(FheError::StaleInstance);
        }

        // A concurrent derivation for the same target won the race
        if let Some(current) = slot.current.as_ref().filter(|h| {
            h.chain_id == chain_id && h.endpoint() == endpoint && !h.is_retired()
        }) {
            return Ok(current.clone());
        }

        if let Some(previous) = slot.current.take() {
            previous.retire();
        }

        slot.generation += 1;
        let handle = InstanceHandle::new(instance, chain_id, endpoint, slot.generation);
        slot.current = Some(handle.clone());

        tracing::info!(chain_id, endpoint, generation = handle.generation, "FHE instance ready");
        Ok(handle)
    }

    /// Cached live instance, if any.
    pub fn current(&self) -> Option<InstanceHandle> {
        self.slot().current.clone().filter(|h| !h.is_retired())
    }

    /// Retire the current instance and invalidate in-progress derivations.
    ///
    /// Called on chain change and disconnect.
    pub fn retire(&self) {
        let mut slot = self.slot();
        slot.epoch += 1;
        if let Some(previous) = slot.current.take() {
            tracing::debug!(
                chain_id = previous.chain_id,
                generation = previous.generation,
                "retiring FHE instance"
            );
            previous.retire();
        }
    }
}

impl fmt::Debug for InstanceProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstanceProvider").field("current", &self.current()).finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use hushboard_crypto::{DecryptionPermit, Eip712Domain};
    use tokio::sync::Notify;

    use super::*;

    struct EchoInstance {
        chain_id: ChainId,
        gate: Option<Arc<Notify>>,
    }

    #[async_trait]
    impl FheInstance for EchoInstance {
        fn chain_id(&self) -> ChainId {
            self.chain_id
        }

        async fn encrypt_u64(
            &self,
            _contract: Address,
            _user: Address,
            value: u64,
        ) -> Result<Ciphertext, FheError> {
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            let mut handle = [0u8; 32];
            handle[..8].copy_from_slice(&value.to_be_bytes());
            Ok(Ciphertext { handle: Handle::new(handle), input_proof: Vec::new() })
        }

        fn generate_keypair(&self) -> Keypair {
            Keypair { public_key: vec![1], private_key: vec![2] }
        }

        fn create_permit(
            &self,
            public_key: &[u8],
            contracts: &[Address],
            start_timestamp: u64,
            duration_days: u64,
        ) -> TypedPermit {
            TypedPermit {
                domain: Eip712Domain {
                    name: "Decryption".into(),
                    version: "1".into(),
                    chain_id: self.chain_id,
                    verifying_contract: [0; 20],
                },
                message: DecryptionPermit {
                    public_key: public_key.to_vec(),
                    contract_addresses: contracts.iter().map(|c| *c.as_bytes()).collect(),
                    start_timestamp,
                    duration_days,
                },
            }
        }

        async fn user_decrypt(
            &self,
            handle: Handle,
            _contract: Address,
            _signature: &DecryptionSignature,
        ) -> Result<u64, FheError> {
            let mut word = [0u8; 8];
            word.copy_from_slice(&handle.as_bytes()[..8]);
            Ok(u64::from_be_bytes(word))
        }
    }

    #[derive(Default)]
    struct CountingSdk {
        derivations: AtomicUsize,
        gate: Option<Arc<Notify>>,
    }

    #[async_trait]
    impl FheSdk for CountingSdk {
        async fn create_instance(
            &self,
            chain_id: ChainId,
            endpoint: &str,
        ) -> Result<Arc<dyn FheInstance>, FheError> {
            self.derivations.fetch_add(1, Ordering::SeqCst);
            if endpoint.is_empty() {
                return Err(FheError::Unsupported { chain_id });
            }
            Ok(Arc::new(EchoInstance { chain_id, gate: self.gate.clone() }))
        }
    }

    fn provider() -> (InstanceProvider, Arc<CountingSdk>) {
        let sdk = Arc::new(CountingSdk::default());
        (InstanceProvider::new(sdk.clone()), sdk)
    }

    #[tokio::test]
    async fn same_target_is_derived_once() {
        let (provider, sdk) = provider();

        let a = provider.get_instance(31337, "http://localhost:8545").await.unwrap();
        let b = provider.get_instance(31337, "http://localhost:8545").await.unwrap();

        assert_eq!(a, b);
        assert_eq!(sdk.derivations.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn chain_change_retires_previous_instance() {
        let (provider, _) = provider();

        let local = provider.get_instance(31337, "http://localhost:8545").await.unwrap();
        let other = provider.get_instance(11155111, "https://rpc.example").await.unwrap();

        assert!(local.is_retired());
        assert!(!other.is_retired());
        assert!(other.generation() > local.generation());
        assert_eq!(
            local.encrypt_u64(Address::ZERO, Address::ZERO, 1).await,
            Err(FheError::StaleInstance)
        );
    }

    #[tokio::test]
    async fn retire_clears_current() {
        let (provider, sdk) = provider();
        let handle = provider.get_instance(31337, "http://localhost:8545").await.unwrap();

        provider.retire();

        assert!(handle.is_retired());
        assert!(provider.current().is_none());

        let _ = provider.get_instance(31337, "http://localhost:8545").await.unwrap();
        assert_eq!(sdk.derivations.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn sdk_errors_propagate() {
        let (provider, _) = provider();
        assert_eq!(
            provider.get_instance(1, "").await,
            Err(FheError::Unsupported { chain_id: 1 })
        );
        assert!(provider.current().is_none());
    }

    #[tokio::test]
    async fn retirement_during_call_is_stale() {
        let gate = Arc::new(Notify::new());
        let sdk =
            Arc::new(CountingSdk { derivations: AtomicUsize::new(0), gate: Some(gate.clone()) });
        let provider = InstanceProvider::new(sdk);
        let handle = provider.get_instance(31337, "http://localhost:8545").await.unwrap();

        let call = handle.encrypt_u64(Address::ZERO, Address::ZERO, 5);
        let release = async {
            provider.retire();
            gate.notify_one();
        };
        let (result, ()) = tokio::join!(call, release);

        assert_eq!(result, Err(FheError::StaleInstance));
    }

    #[test]
    fn keypair_debug_redacts_secret() {
        let rendered = format!("{:?}", Keypair { public_key: vec![0xab], private_key: vec![0xcd] });
        assert!(rendered.contains("ab"));
        assert!(!rendered.contains("cd"));
    }
}
