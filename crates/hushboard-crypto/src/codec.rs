//! Text packing for 64-bit encrypted words.
//!
//! The message board contract stores one encrypted 64-bit word per message,
//! so a message is at most 8 UTF-8 bytes. Bytes are packed big-endian and
//! right-padded with zeros; decoding strips the padding. NUL is reserved for
//! padding, so text containing it is refused.

use crate::CryptoError;

/// Maximum encoded message length in bytes.
pub const MAX_MESSAGE_BYTES: usize = 8;

/// Pack `text` into a 64-bit word.
///
/// # Errors
///
/// - `MessageTooLong` if the UTF-8 encoding exceeds [`MAX_MESSAGE_BYTES`]
/// - `NulCharacter` if `text` contains `'\0'`
pub fn encode_text(text: &str) -> Result<u64, CryptoError> {
    let bytes = text.as_bytes();
    if bytes.len() > MAX_MESSAGE_BYTES {
        return Err(CryptoError::MessageTooLong { len: bytes.len(), max: MAX_MESSAGE_BYTES });
    }
    if bytes.contains(&0) {
        return Err(CryptoError::NulCharacter);
    }

    let mut word = [0u8; MAX_MESSAGE_BYTES];
    word[..bytes.len()].copy_from_slice(bytes);
    Ok(u64::from_be_bytes(word))
}

/// Unpack a 64-bit word produced by [`encode_text`].
///
/// # Errors
///
/// - `InvalidText` if the unpadded bytes are not valid UTF-8
pub fn decode_text(word: u64) -> Result<String, CryptoError> {
    let bytes = word.to_be_bytes();
    let len = bytes.iter().rposition(|&b| b != 0).map_or(0, |last| last + 1);
    String::from_utf8(bytes[..len].to_vec()).map_err(|_| CryptoError::InvalidText)
}
