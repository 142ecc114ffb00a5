//! EIP-712 typed data for user decryption permits.
//!
//! The permit mirrors the `UserDecryptRequestVerification` struct that FHE
//! gateways verify before re-encrypting a ciphertext for a user.

use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::{ADDRESS_SIZE, keccak256};

/// EIP-712 domain type string.
const DOMAIN_TYPE: &[u8] =
    b"EIP712Domain(string name,string version,uint256 chainId,address verifyingContract)";

/// Permit struct type string.
const PERMIT_TYPE: &[u8] = concat!(
    "UserDecryptRequestVerification(bytes publicKey,address[] contractAddresses,",
    "uint256 startTimestamp,uint256 durationDays)"
)
.as_bytes();

/// Label for re-encryption public key derivation.
const REENCRYPTION_KEY_LABEL: &[u8] = b"hushboardReencryptV1";

/// Seconds in one permit validity day.
const SECONDS_PER_DAY: u64 = 86_400;

/// EIP-712 signing domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Eip712Domain {
    /// Domain name.
    pub name: String,
    /// Domain version.
    pub version: String,
    /// Chain the permit is valid on.
    pub chain_id: u64,
    /// Contract that verifies the permit.
    pub verifying_contract: [u8; ADDRESS_SIZE],
}

impl Eip712Domain {
    /// Domain separator hash.
    pub fn separator(&self) -> [u8; 32] {
        let mut encoded = Vec::with_capacity(32 * 5);
        encoded.extend_from_slice(&keccak256(DOMAIN_TYPE));
        encoded.extend_from_slice(&keccak256(self.name.as_bytes()));
        encoded.extend_from_slice(&keccak256(self.version.as_bytes()));
        encoded.extend_from_slice(&uint_word(self.chain_id));
        encoded.extend_from_slice(&address_word(&self.verifying_contract));
        keccak256(&encoded)
    }
}

/// Permit authorizing re-encryption of a user's ciphertexts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecryptionPermit {
    /// Re-encryption public key results are sealed to.
    pub public_key: Vec<u8>,
    /// Contracts whose ciphertexts the permit covers.
    pub contract_addresses: Vec<[u8; ADDRESS_SIZE]>,
    /// Unix time (seconds) the permit becomes valid.
    pub start_timestamp: u64,
    /// Validity window in days.
    pub duration_days: u64,
}

impl DecryptionPermit {
    /// Unix time (seconds) after which the permit is no longer valid.
    pub fn expires_at(&self) -> u64 {
        self.start_timestamp.saturating_add(self.duration_days.saturating_mul(SECONDS_PER_DAY))
    }

    /// EIP-712 struct hash of the permit.
    pub fn struct_hash(&self) -> [u8; 32] {
        let mut addresses = Vec::with_capacity(32 * self.contract_addresses.len());
        for address in &self.contract_addresses {
            addresses.extend_from_slice(&address_word(address));
        }

        let mut encoded = Vec::with_capacity(32 * 5);
        encoded.extend_from_slice(&keccak256(PERMIT_TYPE));
        encoded.extend_from_slice(&keccak256(&self.public_key));
        encoded.extend_from_slice(&keccak256(&addresses));
        encoded.extend_from_slice(&uint_word(self.start_timestamp));
        encoded.extend_from_slice(&uint_word(self.duration_days));
        keccak256(&encoded)
    }

    /// Digest a wallet signs for this permit under `domain`.
    ///
    /// `keccak256(0x19 || 0x01 || domainSeparator || structHash)`
    pub fn digest(&self, domain: &Eip712Domain) -> [u8; 32] {
        let mut encoded = Vec::with_capacity(2 + 64);
        encoded.extend_from_slice(&[0x19, 0x01]);
        encoded.extend_from_slice(&domain.separator());
        encoded.extend_from_slice(&self.struct_hash());
        keccak256(&encoded)
    }
}

/// Derive the public half of a re-encryption keypair from its secret.
///
/// Deterministic: the same secret always yields the same public key, so a
/// coprocessor can check that a caller holds the secret behind a permit.
pub fn derive_reencryption_public_key(secret: &[u8; 32]) -> [u8; 32] {
    let hkdf = Hkdf::<Sha256>::new(None, secret);
    let mut public_key = Zeroizing::new([0u8; 32]);
    let Ok(()) = hkdf.expand(REENCRYPTION_KEY_LABEL, &mut public_key[..]) else {
        unreachable!("32 bytes is a valid HKDF-SHA256 output length");
    };
    *public_key
}

fn uint_word(value: u64) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[24..].copy_from_slice(&value.to_be_bytes());
    word
}

fn address_word(address: &[u8; ADDRESS_SIZE]) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[32 - ADDRESS_SIZE..].copy_from_slice(address);
    word
}

#[cfg(test)]
mod tests {
    use super::*;

    fn domain(chain_id: u64) -> Eip712Domain {
        Eip712Domain {
            name: "Decryption".to_string(),
            version: "1".to_string(),
            chain_id,
            verifying_contract: [0x11; ADDRESS_SIZE],
        }
    }

    fn permit() -> DecryptionPermit {
        DecryptionPermit {
            public_key: vec![1, 2, 3],
            contract_addresses: vec![[0x22; ADDRESS_SIZE]],
            start_timestamp: 1_700_000_000,
            duration_days: 365,
        }
    }

    #[test]
    fn expiry_counts_whole_days() {
        assert_eq!(permit().expires_at(), 1_700_000_000 + 365 * 86_400);
    }

    #[test]
    fn digest_binds_chain() {
        assert_ne!(permit().digest(&domain(1)), permit().digest(&domain(31337)));
    }

    #[test]
    fn digest_binds_contracts() {
        let mut other = permit();
        other.contract_addresses = vec![[0x33; ADDRESS_SIZE]];
        assert_ne!(permit().digest(&domain(1)), other.digest(&domain(1)));
    }

    #[test]
    fn digest_binds_public_key() {
        let mut other = permit();
        other.public_key = vec![4, 5, 6];
        assert_ne!(permit().struct_hash(), other.struct_hash());
    }

    #[test]
    fn reencryption_key_is_deterministic() {
        let secret = [9u8; 32];
        let public_key = derive_reencryption_public_key(&secret);
        assert_eq!(public_key, derive_reencryption_public_key(&secret));
        assert_ne!(public_key, derive_reencryption_public_key(&[8u8; 32]));
    }
}
