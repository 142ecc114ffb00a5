//! Fuzz target for the decryption signature cache
//!
//! The backing store is session storage the page does not control, so any
//! bytes may come back from it.
//!
//! # Invariants
//!
//! - Lookup NEVER panics on corrupt entries
//! - A hit always belongs to the requested (contract, user) pair
//! - A hit is valid at lookup time and covers the requested handles

#![no_main]

use arbitrary::Arbitrary;
use hushboard_core::{
    Address, DecryptionSignature, DecryptionSignatureCache, Environment, Handle,
    MemorySignatureStore, SignatureKey, SignatureStore,
};
use hushboard_harness::SimEnv;
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
enum Entry {
    Raw(Vec<u8>),
    Signature {
        contract: u8,
        user: u8,
        handles: Vec<u8>,
        start_offset: i16,
        duration_days: u8,
    },
}

#[derive(Debug, Arbitrary)]
struct Scenario {
    entry: Entry,
    requested: Vec<u8>,
}

fn address(byte: u8) -> Address {
    Address::new([byte; 20])
}

fuzz_target!(|scenario: Scenario| {
    let env = SimEnv::new();
    let store = MemorySignatureStore::new();
    let cache = DecryptionSignatureCache::new(store.clone(), env.clone());

    let key = SignatureKey { contract: address(1), user: address(2) };
    let bytes = match scenario.entry {
        Entry::Raw(bytes) => bytes,
        Entry::Signature { contract, user, handles, start_offset, duration_days } => {
            let signature = DecryptionSignature {
                contract: address(contract % 3),
                user: address(user % 3),
                handles: handles.iter().map(|&b| Handle::new([b; 32])).collect(),
                public_key: vec![0; 32],
                private_key: vec![0; 32],
                signature: vec![0; 65],
                start_timestamp: env.unix_time().saturating_add_signed(i64::from(start_offset)),
                duration_days: u64::from(duration_days),
            };
            let mut bytes = Vec::new();
            if ciborium::into_writer(&signature, &mut bytes).is_err() {
                return;
            }
            bytes
        },
    };
    if store.put(&key.storage_key(), bytes).is_err() {
        return;
    }

    let requested: Vec<Handle> = scenario.requested.iter().map(|&b| Handle::new([b; 32])).collect();
    if let Some(hit) = cache.lookup(key.contract, key.user, &requested) {
        assert_eq!(hit.key(), key);
        assert!(hit.is_valid_at(env.unix_time()));
        assert!(hit.covers(&requested));
    }
});
