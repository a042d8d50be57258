//! Transformation functions applied to variable values before operator
//! evaluation.
//!
//! Transformations are pure string functions. A failing decoder returns its
//! input unchanged so the pipeline always produces a value.

mod decode;
mod encode;
mod normalize;
mod pipeline;

pub use decode::*;
pub use encode::*;
pub use normalize::*;
pub use pipeline::TransformationPipeline;

use crate::error::{Error, Result};
use std::borrow::Cow;
use std::sync::Arc;

/// A named, pure string transformation.
pub trait Transformation: Send + Sync {
    /// Apply the transformation.
    fn transform<'a>(&self, input: &'a str) -> Cow<'a, str>;

    /// Registry name of the transformation, preserved for audit output.
    fn name(&self) -> &'static str;
}

/// Look up a transformation by its registry name (case-insensitive).
pub fn create_transformation(name: &str) -> Result<Arc<dyn Transformation>> {
    match name.to_ascii_lowercase().as_str() {
        // Decoding
        "urldecode" => Ok(Arc::new(UrlDecode)),
        "urldecodeuni" => Ok(Arc::new(UrlDecodeUni)),
        "base64decode" => Ok(Arc::new(Base64Decode)),
        "hexdecode" => Ok(Arc::new(HexDecode)),
        "htmlentitydecode" => Ok(Arc::new(HtmlEntityDecode)),

        // Encoding and hashing
        "base64encode" => Ok(Arc::new(Base64Encode)),
        "hexencode" => Ok(Arc::new(HexEncode)),
        "urlencode" => Ok(Arc::new(UrlEncode)),
        "md5" => Ok(Arc::new(Md5)),
        "sha1" => Ok(Arc::new(Sha1)),

        // Normalization
        "lowercase" => Ok(Arc::new(Lowercase)),
        "uppercase" => Ok(Arc::new(Uppercase)),
        "trim" => Ok(Arc::new(Trim)),
        "trimleft" => Ok(Arc::new(TrimLeft)),
        "trimright" => Ok(Arc::new(TrimRight)),
        "compresswhitespace" => Ok(Arc::new(CompressWhitespace)),
        "removewhitespace" => Ok(Arc::new(RemoveWhitespace)),
        "removenulls" => Ok(Arc::new(RemoveNulls)),
        "replacenulls" => Ok(Arc::new(ReplaceNulls)),
        "normalizepath" | "normalisepath" => Ok(Arc::new(NormalizePath)),

        // Special
        "length" => Ok(Arc::new(Length)),
        "none" => Ok(Arc::new(NoneTransform)),

        _ => Err(Error::UnknownTransformation {
            name: name.to_string(),
        }),
    }
}

/// Identity transformation. In a pipeline, `none` resets the chain instead.
pub struct NoneTransform;

impl Transformation for NoneTransform {
    fn transform<'a>(&self, input: &'a str) -> Cow<'a, str> {
        Cow::Borrowed(input)
    }

    fn name(&self) -> &'static str {
        "none"
    }
}

/// Replaces the value with its byte length.
pub struct Length;

impl Transformation for Length {
    fn transform<'a>(&self, input: &'a str) -> Cow<'a, str> {
        Cow::Owned(input.len().to_string())
    }

    fn name(&self) -> &'static str {
        "length"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_is_case_insensitive() {
        assert_eq!(create_transformation("lowerCase").unwrap().name(), "lowercase");
        assert_eq!(create_transformation("urlDecode").unwrap().name(), "urlDecode");
    }

    #[test]
    fn test_unknown_name() {
        assert!(matches!(
            create_transformation("rot13"),
            Err(Error::UnknownTransformation { .. })
        ));
    }

    #[test]
    fn test_length() {
        assert_eq!(Length.transform("abcd"), "4");
        assert_eq!(Length.transform(""), "0");
    }
}
