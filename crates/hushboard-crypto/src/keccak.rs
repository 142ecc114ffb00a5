//! Keccak-256 as used by Ethereum (not NIST SHA3-256).

use tiny_keccak::{Hasher, Keccak};

/// Keccak-256 digest of `data`.
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak::v256();
    hasher.update(data);
    let mut out = [0u8; 32];
    hasher.finalize(&mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_matches_known_digest() {
        assert_eq!(
            hex::encode(keccak256(b"")),
            "c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
        );
    }

    #[test]
    fn transfer_selector_matches_known_prefix() {
        let digest = keccak256(b"transfer(address,uint256)");
        assert_eq!(hex::encode(&digest[..4]), "a9059cbb");
    }
}
