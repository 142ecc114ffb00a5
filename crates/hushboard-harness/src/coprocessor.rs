//! Local FHE coprocessor and SDK.
//!
//! Stands in for a chain's FHE coprocessor and decryption gateway. Words are
//! sealed under a coprocessor key with the chain and contract as associated
//! data, so a handle only opens in the context it was created for. Access is
//! tracked per handle the way an on-chain ACL grants it.
//!
//! User decryption performs the gateway checks for real: the permit digest is
//! rebuilt from the signature, the signer is recovered from the wallet
//! signature, the re-encryption secret must match the permit's public key,
//! the permit must be within its validity window, and the recovered user must
//! be allowed on the handle.

#![allow(clippy::disallowed_types, reason = "Synchronous state updates only")]

use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use async_trait::async_trait;
use hushboard_core::{
    Address, ChainId, Ciphertext, DecryptionSignature, Environment, FheError, FheInstance, FheSdk,
    Handle, Keypair, TypedPermit,
    permit::{DecryptionPermit, Eip712Domain},
};
use hushboard_crypto::{
    NONCE_SIZE, SealedWord, derive_handle, derive_reencryption_public_key, keccak256, open_word,
    recover_signer, seal_word,
};

use crate::{Gate, SimEnv};

/// EIP-712 domain name of the simulated decryption gateway.
pub const GATEWAY_DOMAIN_NAME: &str = "Decryption";

/// EIP-712 domain version of the simulated decryption gateway.
pub const GATEWAY_DOMAIN_VERSION: &str = "1";

/// Address of the simulated decryption verifier contract.
pub const GATEWAY_VERIFIER: Address = Address::new([0xde; 20]);

#[derive(Default)]
struct CoprocessorState {
    sealed: HashMap<Handle, SealedWord>,
    acl: HashMap<Handle, BTreeSet<Address>>,
    encryptions: usize,
    decryptions: usize,
    refuse_permits: bool,
}

/// FHE coprocessor for one simulated chain.
///
/// Clones share the key, the sealed words and the ACL. Implements
/// [`FheInstance`] directly; [`LocalFheSdk`] hands out clones.
#[derive(Clone)]
pub struct LocalCoprocessor {
    chain_id: ChainId,
    key: [u8; 32],
    env: SimEnv,
    state: Arc<Mutex<CoprocessorState>>,
    encrypt_gate: Gate,
    decrypt_gate: Gate,
}

impl std::fmt::Debug for LocalCoprocessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalCoprocessor").field("chain_id", &self.chain_id).finish_non_exhaustive()
    }
}

impl LocalCoprocessor {
    /// Coprocessor for `chain_id` with a key drawn from `env`.
    pub fn new(chain_id: ChainId, env: SimEnv) -> Self {
        let key = env.random_32();
        Self {
            chain_id,
            key,
            env,
            state: Arc::new(Mutex::new(CoprocessorState::default())),
            encrypt_gate: Gate::new(),
            decrypt_gate: Gate::new(),
        }
    }

    fn state(&self) -> MutexGuard<'_, CoprocessorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Gate every encryption passes through.
    pub fn encrypt_gate(&self) -> &Gate {
        &self.encrypt_gate
    }

    /// Gate every user decryption passes through.
    pub fn decrypt_gate(&self) -> &Gate {
        &self.decrypt_gate
    }

    /// Number of encryptions performed.
    pub fn encryptions(&self) -> usize {
        self.state().encryptions
    }

    /// Number of user decryptions attempted.
    pub fn decryptions(&self) -> usize {
        self.state().decryptions
    }

    /// Make the gateway refuse every decryption permit, as after a
    /// verifier key rotation.
    pub fn set_refuse_permits(&self, refuse: bool) {
        self.state().refuse_permits = refuse;
    }

    /// Check if `user` may decrypt `handle`.
    pub fn is_allowed(&self, handle: Handle, user: Address) -> bool {
        self.state().acl.get(&handle).is_some_and(|users| users.contains(&user))
    }

    /// Grant `user` access to `handle`.
    pub fn allow(&self, handle: Handle, user: Address) {
        self.state().acl.entry(handle).or_default().insert(user);
    }

    /// Accept an encrypted input submitted by `user` to `contract`.
    ///
    /// The proof must bind the handle to exactly this contract and user, and
    /// the handle must name a word sealed by this coprocessor. The submitter
    /// is granted access on success.
    pub fn accept_input(
        &self,
        contract: Address,
        user: Address,
        ciphertext: &Ciphertext,
    ) -> Result<(), String> {
        if ciphertext.input_proof != input_proof(ciphertext.handle, contract, user) {
            return Err("input proof does not match contract and sender".to_string());
        }
        if !self.state().sealed.contains_key(&ciphertext.handle) {
            return Err(format!("unknown handle {}", ciphertext.handle));
        }
        self.allow(ciphertext.handle, user);
        Ok(())
    }

    fn context(&self, contract: Address) -> Vec<u8> {
        let mut context = Vec::with_capacity(8 + 20);
        context.extend_from_slice(&self.chain_id.to_be_bytes());
        context.extend_from_slice(contract.as_bytes());
        context
    }

    fn domain(&self) -> Eip712Domain {
        Eip712Domain {
            name: GATEWAY_DOMAIN_NAME.to_string(),
            version: GATEWAY_DOMAIN_VERSION.to_string(),
            chain_id: self.chain_id,
            verifying_contract: *GATEWAY_VERIFIER.as_bytes(),
        }
    }

    fn check_signature(
        &self,
        contract: Address,
        signature: &DecryptionSignature,
    ) -> Result<(), String> {
        if signature.contract != contract {
            return Err(format!("signature covers {}, not {contract}", signature.contract));
        }

        if self.state().refuse_permits {
            return Err("decryption permit was revoked".to_string());
        }

        let now = self.env.unix_time();
        if now < signature.start_timestamp || now >= signature.expires_at() {
            return Err("decryption permit is outside its validity window".to_string());
        }

        let secret: [u8; 32] = signature
            .private_key
            .as_slice()
            .try_into()
            .map_err(|_| "re-encryption secret has the wrong length".to_string())?;
        if derive_reencryption_public_key(&secret).as_slice() != signature.public_key.as_slice() {
            return Err("re-encryption secret does not match the permit".to_string());
        }

        let permit = DecryptionPermit {
            public_key: signature.public_key.clone(),
            contract_addresses: vec![*contract.as_bytes()],
            start_timestamp: signature.start_timestamp,
            duration_days: signature.duration_days,
        };
        let digest = permit.digest(&self.domain());
        let signer = recover_signer(&digest, &signature.signature).map_err(|e| e.to_string())?;
        let signer = Address::from(signer);
        if signer != signature.user {
            return Err(format!("permit was signed by {signer}, not {}", signature.user));
        }

        Ok(())
    }
}

/// Proof binding an input handle to its contract and submitter.
fn input_proof(handle: Handle, contract: Address, user: Address) -> Vec<u8> {
    let mut encoded = Vec::with_capacity(32 + 20 + 20);
    encoded.extend_from_slice(handle.as_bytes());
    encoded.extend_from_slice(contract.as_bytes());
    encoded.extend_from_slice(user.as_bytes());
    keccak256(&encoded).to_vec()
}

#[async_trait]
impl FheInstance for LocalCoprocessor {
    fn chain_id(&self) -> ChainId {
        self.chain_id
    }

    async fn encrypt_u64(
        &self,
        contract: Address,
        user: Address,
        value: u64,
    ) -> Result<Ciphertext, FheError> {
        self.encrypt_gate.pass().await;

        let mut nonce = [0u8; NONCE_SIZE];
        self.env.random_bytes(&mut nonce);

        let context = self.context(contract);
        let sealed = seal_word(&self.key, &context, value, nonce);
        let handle = Handle::new(derive_handle(&sealed, &context));

        let mut state = self.state();
        state.encryptions += 1;
        state.sealed.insert(handle, sealed);
        drop(state);

        tracing::debug!(chain_id = self.chain_id, %handle, "sealed input");
        Ok(Ciphertext { handle, input_proof: input_proof(handle, contract, user) })
    }

    fn generate_keypair(&self) -> Keypair {
        let private_key = self.env.random_32();
        let public_key = derive_reencryption_public_key(&private_key);
        Keypair { public_key: public_key.to_vec(), private_key: private_key.to_vec() }
    }

    fn create_permit(
        &self,
        public_key: &[u8],
        contracts: &[Address],
        start_timestamp: u64,
        duration_days: u64,
    ) -> TypedPermit {
        TypedPermit {
            domain: self.domain(),
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
        contract: Address,
        signature: &DecryptionSignature,
    ) -> Result<u64, FheError> {
        self.decrypt_gate.pass().await;
        self.state().decryptions += 1;

        self.check_signature(contract, signature)
            .map_err(|reason| FheError::DecryptionFailed { reason })?;

        if !self.is_allowed(handle, signature.user) {
            return Err(FheError::DecryptionFailed {
                reason: format!("{} is not allowed to decrypt {handle}", signature.user),
            });
        }

        let sealed = self
            .state()
            .sealed
            .get(&handle)
            .cloned()
            .ok_or_else(|| FheError::DecryptionFailed {
                reason: format!("unknown handle {handle}"),
            })?;

        let value = open_word(&self.key, &self.context(contract), &sealed)
            .map_err(|e| FheError::DecryptionFailed { reason: e.to_string() })?;

        tracing::debug!(
            chain_id = self.chain_id,
            %handle,
            user = %signature.user,
            "user decryption"
        );
        Ok(value)
    }
}

#[derive(Default)]
struct SdkState {
    offline: bool,
    derivations: usize,
}

/// FHE SDK resolving RPC endpoints to local coprocessors.
///
/// An endpoint without a registered coprocessor is an unsupported chain.
#[derive(Clone, Default)]
pub struct LocalFheSdk {
    coprocessors: Arc<Mutex<BTreeMap<String, LocalCoprocessor>>>,
    state: Arc<Mutex<SdkState>>,
    gate: Gate,
}

impl LocalFheSdk {
    /// SDK with no registered endpoints.
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `coprocessor` at `endpoint`.
    pub fn register(&self, endpoint: impl Into<String>, coprocessor: LocalCoprocessor) {
        self.coprocessors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(endpoint.into(), coprocessor);
    }

    fn sdk_state(&self) -> MutexGuard<'_, SdkState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make every derivation fail with `NetworkUnavailable`.
    pub fn set_offline(&self, offline: bool) {
        self.sdk_state().offline = offline;
    }

    /// Number of derivations attempted.
    pub fn derivations(&self) -> usize {
        self.sdk_state().derivations
    }

    /// Gate every derivation passes through.
    pub fn gate(&self) -> &Gate {
        &self.gate
    }
}

#[async_trait]
impl FheSdk for LocalFheSdk {
    async fn create_instance(
        &self,
        chain_id: ChainId,
        endpoint: &str,
    ) -> Result<Arc<dyn FheInstance>, FheError> {
        self.gate.pass().await;

        let offline = {
            let mut state = self.sdk_state();
            state.derivations += 1;
            state.offline
        };
        if offline {
            return Err(FheError::NetworkUnavailable { reason: format!("{endpoint} unreachable") });
        }

        let coprocessor = self
            .coprocessors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(endpoint)
            .cloned()
            .filter(|c| c.chain_id == chain_id)
            .ok_or(FheError::Unsupported { chain_id })?;

        tracing::debug!(chain_id, endpoint, "derived local FHE instance");
        Ok(Arc::new(coprocessor))
    }
}

#[cfg(test)]
mod tests {
    use hushboard_crypto::{SecretSigner, decode_text, encode_text};

    use super::*;

    const CHAIN: ChainId = 31337;

    fn contract() -> Address {
        Address::new([0xc0; 20])
    }

    fn signer(byte: u8) -> SecretSigner {
        SecretSigner::from_bytes(&[byte; 32]).unwrap()
    }

    fn signed(coprocessor: &LocalCoprocessor, wallet: &SecretSigner) -> DecryptionSignature {
        let keypair = coprocessor.generate_keypair();
        let start = coprocessor.env.unix_time();
        let permit = coprocessor.create_permit(&keypair.public_key, &[contract()], start, 1);
        let signature = wallet.sign_digest(&permit.digest()).unwrap();

        DecryptionSignature {
            contract: contract(),
            user: Address::from(wallet.address()),
            handles: BTreeSet::new(),
            public_key: keypair.public_key,
            private_key: keypair.private_key,
            signature: signature.to_vec(),
            start_timestamp: start,
            duration_days: 1,
        }
    }

    #[tokio::test]
    async fn round_trip_for_allowed_user() {
        let coprocessor = LocalCoprocessor::new(CHAIN, SimEnv::with_seed(3));
        let alice = signer(1);
        let user = Address::from(alice.address());

        let value = encode_text("hi").unwrap();
        let ciphertext = coprocessor.encrypt_u64(contract(), user, value).await.unwrap();
        coprocessor.accept_input(contract(), user, &ciphertext).unwrap();

        let signature = signed(&coprocessor, &alice);
        let clear =
            coprocessor.user_decrypt(ciphertext.handle, contract(), &signature).await.unwrap();
        assert_eq!(decode_text(clear).unwrap(), "hi");
    }

    #[tokio::test]
    async fn user_without_access_is_refused() {
        let coprocessor = LocalCoprocessor::new(CHAIN, SimEnv::with_seed(3));
        let alice = signer(1);
        let mallory = signer(2);

        let ciphertext = coprocessor
            .encrypt_u64(contract(), Address::from(alice.address()), 42)
            .await
            .unwrap();
        coprocessor.accept_input(contract(), Address::from(alice.address()), &ciphertext).unwrap();

        let signature = signed(&coprocessor, &mallory);
        let result = coprocessor.user_decrypt(ciphertext.handle, contract(), &signature).await;
        assert!(matches!(result, Err(FheError::DecryptionFailed { .. })));
    }

    #[tokio::test]
    async fn forged_user_field_is_refused() {
        let coprocessor = LocalCoprocessor::new(CHAIN, SimEnv::with_seed(3));
        let alice = signer(1);
        let mallory = signer(2);
        let alice_address = Address::from(alice.address());

        let ciphertext = coprocessor.encrypt_u64(contract(), alice_address, 42).await.unwrap();
        coprocessor.accept_input(contract(), alice_address, &ciphertext).unwrap();

        // Mallory signs but claims to be Alice
        let mut signature = signed(&coprocessor, &mallory);
        signature.user = alice_address;

        let result = coprocessor.user_decrypt(ciphertext.handle, contract(), &signature).await;
        assert!(matches!(result, Err(FheError::DecryptionFailed { .. })));
    }

    #[tokio::test]
    async fn expired_permit_is_refused() {
        let env = SimEnv::with_seed(3);
        let coprocessor = LocalCoprocessor::new(CHAIN, env.clone());
        let alice = signer(1);
        let user = Address::from(alice.address());

        let ciphertext = coprocessor.encrypt_u64(contract(), user, 42).await.unwrap();
        coprocessor.accept_input(contract(), user, &ciphertext).unwrap();
        let signature = signed(&coprocessor, &alice);

        env.advance(2 * 86_400);
        let result = coprocessor.user_decrypt(ciphertext.handle, contract(), &signature).await;
        assert!(matches!(result, Err(FheError::DecryptionFailed { .. })));
    }

    #[test]
    fn input_proof_binds_sender() {
        let coprocessor = LocalCoprocessor::new(CHAIN, SimEnv::with_seed(3));
        let ciphertext = Ciphertext {
            handle: Handle::new([9; 32]),
            input_proof: input_proof(Handle::new([9; 32]), contract(), Address::new([1; 20])),
        };
        assert!(coprocessor.accept_input(contract(), Address::new([2; 20]), &ciphertext).is_err());
    }

    #[tokio::test]
    async fn unknown_endpoint_is_unsupported() {
        let sdk = LocalFheSdk::new();
        sdk.register("http://localhost:8545", LocalCoprocessor::new(CHAIN, SimEnv::new()));

        assert!(sdk.create_instance(CHAIN, "http://localhost:8545").await.is_ok());
        assert!(matches!(
            sdk.create_instance(5, "https://elsewhere").await,
            Err(FheError::Unsupported { chain_id: 5 })
        ));

        sdk.set_offline(true);
        assert!(matches!(
            sdk.create_instance(CHAIN, "http://localhost:8545").await,
            Err(FheError::NetworkUnavailable { .. })
        ));
        assert_eq!(sdk.derivations(), 3);
    }
}
