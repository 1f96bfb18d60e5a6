//! Utility functions for authentication.

use base64::Engine;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use rand::RngCore;
use rand::rngs::OsRng;

/// Generate `len` bytes from the OS CSPRNG, base64url-encoded without padding.
///
/// # Examples
///
/// ```
/// use passkey_auth::utils::random_token;
///
/// let token = random_token(32);
/// assert_eq!(token.len(), 43);
/// assert!(!token.contains('='));
/// ```
#[must_use]
pub fn random_token(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Encode bytes as base64url without padding.
#[must_use]
pub fn encode_b64url(bytes: impl AsRef<[u8]>) -> String {
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Decode base64url, tolerating padding and the standard alphabet.
///
/// Browsers and native SDKs disagree on the encoding of `clientDataJSON`,
/// so both alphabets are accepted.
///
/// # Examples
///
/// ```
/// use passkey_auth::utils::decode_b64_lenient;
///
/// assert_eq!(decode_b64_lenient("aGk").as_deref(), Some(&b"hi"[..]));
/// assert_eq!(decode_b64_lenient("aGk=").as_deref(), Some(&b"hi"[..]));
/// assert_eq!(decode_b64_lenient("%%%"), None);
/// ```
#[must_use]
pub fn decode_b64_lenient(input: &str) -> Option<Vec<u8>> {
    let trimmed = input.trim_end_matches('=');
    URL_SAFE_NO_PAD
        .decode(trimmed)
        .or_else(|_| STANDARD.decode(input))
        .ok()
}

/// Serde adapter storing byte vectors as base64url strings.
pub mod b64url_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    /// Serialize bytes as a base64url string.
    ///
    /// # Errors
    ///
    /// Propagates serializer errors.
    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::encode_b64url(bytes))
    }

    /// Deserialize bytes from a base64url (or standard base64) string.
    ///
    /// # Errors
    ///
    /// Fails if the string is not valid base64.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        super::decode_b64_lenient(&encoded)
            .ok_or_else(|| serde::de::Error::custom("invalid base64 encoding"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_tokens_are_unique() {
        let a = random_token(32);
        let b = random_token(32);
        assert_ne!(a, b);
    }

    #[test]
    fn test_standard_alphabet_accepted() {
        // 0xfb 0xff encodes to "+/8=" in the standard alphabet
        assert_eq!(decode_b64_lenient("+/8="), Some(vec![0xfb, 0xff]));
        assert_eq!(decode_b64_lenient("-_8"), Some(vec![0xfb, 0xff]));
    }
}
