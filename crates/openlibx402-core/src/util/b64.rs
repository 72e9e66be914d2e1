//! Base64 encoding and decoding for x402 header values.
//!
//! The `X-Payment-Authorization` header carries base64-encoded JSON. Producers
//! emit the URL-safe alphabet with padding; parsers additionally accept the
//! standard alphabet, since older bindings of the protocol emitted it.

use base64::Engine;
use base64::engine::general_purpose::{STANDARD, URL_SAFE};
use std::borrow::Cow;
use std::fmt::Display;

/// A wrapper for base64-encoded byte data.
///
/// This type holds bytes that represent base64-encoded data and provides
/// methods for encoding and decoding. It uses copy-on-write semantics
/// to avoid unnecessary allocations when wrapping header bytes.
///
/// # Example
///
/// ```rust
/// use openlibx402_core::util::Base64Bytes;
///
/// let encoded = Base64Bytes::encode(b"hello world");
/// assert_eq!(encoded.to_string(), "aGVsbG8gd29ybGQ=");
///
/// let decoded = encoded.decode().unwrap();
/// assert_eq!(decoded, b"hello world");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Base64Bytes<'a>(pub Cow<'a, [u8]>);

impl Base64Bytes<'_> {
    /// Encodes raw binary data as URL-safe base64 with padding.
    pub fn encode<T: AsRef<[u8]>>(input: T) -> Base64Bytes<'static> {
        let encoded = URL_SAFE.encode(input.as_ref());
        Base64Bytes(Cow::Owned(encoded.into_bytes()))
    }

    /// Decodes the base64 string bytes to raw binary data.
    ///
    /// Accepts both the URL-safe and the standard alphabet.
    ///
    /// # Errors
    ///
    /// Returns an error if the data is valid under neither alphabet.
    pub fn decode(&self) -> Result<Vec<u8>, base64::DecodeError> {
        URL_SAFE
            .decode(&self.0)
            .or_else(|_| STANDARD.decode(&self.0))
    }
}

impl AsRef<[u8]> for Base64Bytes<'_> {
    fn as_ref(&self) -> &[u8] {
        self.0.as_ref()
    }
}

impl<'a> From<&'a [u8]> for Base64Bytes<'a> {
    fn from(slice: &'a [u8]) -> Self {
        Base64Bytes(Cow::Borrowed(slice))
    }
}

impl<'a> From<&'a str> for Base64Bytes<'a> {
    fn from(s: &'a str) -> Self {
        Base64Bytes(Cow::Borrowed(s.as_bytes()))
    }
}

impl Display for Base64Bytes<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(self.0.as_ref()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_url_safe_with_padding() {
        // 0xfb 0xff maps to characters outside the standard alphabet
        let encoded = Base64Bytes::encode([0xfbu8, 0xff, 0x00]);
        assert_eq!(encoded.to_string(), "-_8A");
    }

    #[test]
    fn decodes_both_alphabets() {
        let url_safe = Base64Bytes::from("-_8A");
        let standard = Base64Bytes::from("+/8A");
        assert_eq!(url_safe.decode().unwrap(), vec![0xfb, 0xff, 0x00]);
        assert_eq!(standard.decode().unwrap(), vec![0xfb, 0xff, 0x00]);
    }

    #[test]
    fn rejects_garbage() {
        assert!(Base64Bytes::from("not base64!!").decode().is_err());
    }
}
