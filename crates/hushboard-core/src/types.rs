//! Domain types shared across the messaging core.

use std::{fmt, str::FromStr};

use hushboard_crypto::ADDRESS_SIZE;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// EVM chain identifier.
pub type ChainId = u64;

/// Chain-assigned message identifier.
pub type MessageId = u64;

/// Error parsing an [`Address`] from text.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AddressParseError {
    /// Input is not valid hex.
    #[error("address is not valid hex: {0}")]
    InvalidHex(String),

    /// Input decodes to the wrong number of bytes.
    #[error("address must be {expected} bytes, got {actual}")]
    InvalidLength {
        /// Required length.
        expected: usize,
        /// Decoded length.
        actual: usize,
    },
}

/// 20-byte account or contract address.
///
/// Parses with or without a `0x` prefix, case-insensitively. Displays as
/// lowercase `0x`-prefixed hex.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Address([u8; ADDRESS_SIZE]);

impl Address {
    /// The zero address.
    pub const ZERO: Self = Self([0u8; ADDRESS_SIZE]);

    /// Wrap raw address bytes.
    pub const fn new(bytes: [u8; ADDRESS_SIZE]) -> Self {
        Self(bytes)
    }

    /// Raw address bytes.
    pub fn as_bytes(&self) -> &[u8; ADDRESS_SIZE] {
        &self.0
    }

    /// Check for the zero address.
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; ADDRESS_SIZE]
    }
}

impl From<[u8; ADDRESS_SIZE]> for Address {
    fn from(bytes: [u8; ADDRESS_SIZE]) -> Self {
        Self(bytes)
    }
}

impl FromStr for Address {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let digits = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);

        let bytes = hex::decode(digits).map_err(|e| AddressParseError::InvalidHex(e.to_string()))?;
        let actual = bytes.len();
        let bytes: [u8; ADDRESS_SIZE] = bytes
            .try_into()
            .map_err(|_| AddressParseError::InvalidLength { expected: ADDRESS_SIZE, actual })?;

        Ok(Self(bytes))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// 32-byte on-chain reference to an encrypted value.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Handle([u8; 32]);

impl Handle {
    /// Wrap raw handle bytes.
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Raw handle bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Check for the zero handle (uninitialized ciphertext on-chain).
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }
}

impl From<[u8; 32]> for Handle {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// 32-byte transaction hash.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TxHash([u8; 32]);

impl TxHash {
    /// Wrap raw hash bytes.
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Raw hash bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// Encrypted input ready for submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ciphertext {
    /// Handle the ledger will store.
    pub handle: Handle,
    /// Proof binding the handle to the submitting contract and user.
    pub input_proof: Vec<u8>,
}

/// A message as stored on-chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageRecord {
    /// Chain-assigned identifier.
    pub id: MessageId,
    /// Submitting account.
    pub sender: Address,
    /// Intended reader.
    pub recipient: Address,
    /// Encrypted content.
    pub handle: Handle,
}

/// Confirmed submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmitReceipt {
    /// Transaction that created the message.
    pub tx_hash: TxHash,
    /// Identifier assigned by the contract.
    pub message_id: MessageId,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_parses_with_and_without_prefix() {
        let with: Address = "0x5FbDB2315678afecb367f032d93F642f64180aa3".parse().unwrap();
        let without: Address = "5fbdb2315678afecb367f032d93f642f64180aa3".parse().unwrap();
        assert_eq!(with, without);
        assert_eq!(with.to_string(), "0x5fbdb2315678afecb367f032d93f642f64180aa3");
    }

    #[test]
    fn address_rejects_bad_input() {
        assert!(matches!("0xRecipient".parse::<Address>(), Err(AddressParseError::InvalidHex(_))));
        assert_eq!(
            "0x1234".parse::<Address>(),
            Err(AddressParseError::InvalidLength { expected: 20, actual: 2 })
        );
    }

    #[test]
    fn zero_values() {
        assert!(Address::ZERO.is_zero());
        assert!(Handle::default().is_zero());
        assert!(!Handle::new([1; 32]).is_zero());
    }
}
