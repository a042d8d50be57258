//! Encoding and hashing transformations.

use super::Transformation;
use std::borrow::Cow;
use std::fmt::Write;

/// Encode the value as standard base64.
pub struct Base64Encode;

impl Transformation for Base64Encode {
    fn transform<'a>(&self, input: &'a str) -> Cow<'a, str> {
        use base64::Engine;
        Cow::Owned(base64::engine::general_purpose::STANDARD.encode(input))
    }

    fn name(&self) -> &'static str {
        "base64Encode"
    }
}

/// Encode each byte as two lowercase hex digits.
pub struct HexEncode;

impl Transformation for HexEncode {
    fn transform<'a>(&self, input: &'a str) -> Cow<'a, str> {
        let mut out = String::with_capacity(input.len() * 2);
        for b in input.bytes() {
            let _ = write!(out, "{:02x}", b);
        }
        Cow::Owned(out)
    }

    fn name(&self) -> &'static str {
        "hexEncode"
    }
}

/// Percent-encode everything outside the unreserved set.
pub struct UrlEncode;

impl Transformation for UrlEncode {
    fn transform<'a>(&self, input: &'a str) -> Cow<'a, str> {
        use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
        let encoded = utf8_percent_encode(input, NON_ALPHANUMERIC).to_string();
        if encoded == input {
            Cow::Borrowed(input)
        } else {
            Cow::Owned(encoded)
        }
    }

    fn name(&self) -> &'static str {
        "urlEncode"
    }
}

/// Replace the value with its hex MD5 digest.
pub struct Md5;

impl Transformation for Md5 {
    fn transform<'a>(&self, input: &'a str) -> Cow<'a, str> {
        use md5::{Digest, Md5 as Md5Hasher};
        let digest = Md5Hasher::digest(input.as_bytes());
        Cow::Owned(format!("{:x}", digest))
    }

    fn name(&self) -> &'static str {
        "md5"
    }
}

/// Replace the value with its hex SHA-1 digest.
pub struct Sha1;

impl Transformation for Sha1 {
    fn transform<'a>(&self, input: &'a str) -> Cow<'a, str> {
        use sha1::{Digest, Sha1 as Sha1Hasher};
        let digest = Sha1Hasher::digest(input.as_bytes());
        Cow::Owned(format!("{:x}", digest))
    }

    fn name(&self) -> &'static str {
        "sha1"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base64_encode() {
        assert_eq!(Base64Encode.transform("hello"), "aGVsbG8=");
    }

    #[test]
    fn test_hex_encode() {
        assert_eq!(HexEncode.transform("AB"), "4142");
    }

    #[test]
    fn test_url_encode() {
        assert_eq!(UrlEncode.transform("a b"), "a%20b");
        assert_eq!(UrlEncode.transform("plain"), "plain");
    }

    #[test]
    fn test_md5() {
        assert_eq!(Md5.transform("hello"), "5d41402abc4b2a76b9719d911017c592");
    }

    #[test]
    fn test_sha1() {
        assert_eq!(
            Sha1.transform("hello"),
            "aaf4c61ddcc5e8a2dabede0f3b482cd9aea9434d"
        );
    }
}
