//! Normalization transformations.

use super::Transformation;
use std::borrow::Cow;

/// Lowercase the value.
pub struct Lowercase;

impl Transformation for Lowercase {
    fn transform<'a>(&self, input: &'a str) -> Cow<'a, str> {
        if input.chars().any(|c| c.is_uppercase()) {
            Cow::Owned(input.to_lowercase())
        } else {
            Cow::Borrowed(input)
        }
    }

    fn name(&self) -> &'static str {
        "lowercase"
    }
}

/// Uppercase the value.
pub struct Uppercase;

impl Transformation for Uppercase {
    fn transform<'a>(&self, input: &'a str) -> Cow<'a, str> {
        if input.chars().any(|c| c.is_lowercase()) {
            Cow::Owned(input.to_uppercase())
        } else {
            Cow::Borrowed(input)
        }
    }

    fn name(&self) -> &'static str {
        "uppercase"
    }
}

/// Strip leading and trailing whitespace.
pub struct Trim;

impl Transformation for Trim {
    fn transform<'a>(&self, input: &'a str) -> Cow<'a, str> {
        Cow::Borrowed(input.trim())
    }

    fn name(&self) -> &'static str {
        "trim"
    }
}

/// Strip leading whitespace.
pub struct TrimLeft;

impl Transformation for TrimLeft {
    fn transform<'a>(&self, input: &'a str) -> Cow<'a, str> {
        Cow::Borrowed(input.trim_start())
    }

    fn name(&self) -> &'static str {
        "trimLeft"
    }
}

/// Strip trailing whitespace.
pub struct TrimRight;

impl Transformation for TrimRight {
    fn transform<'a>(&self, input: &'a str) -> Cow<'a, str> {
        Cow::Borrowed(input.trim_end())
    }

    fn name(&self) -> &'static str {
        "trimRight"
    }
}

/// Collapse whitespace runs into single spaces.
pub struct CompressWhitespace;

impl Transformation for CompressWhitespace {
    fn transform<'a>(&self, input: &'a str) -> Cow<'a, str> {
        if !input.contains(|c: char| c.is_whitespace()) {
            return Cow::Borrowed(input);
        }
        let mut out = String::with_capacity(input.len());
        let mut in_run = false;
        for c in input.chars() {
            if c.is_whitespace() {
                if !in_run {
                    out.push(' ');
                }
                in_run = true;
            } else {
                out.push(c);
                in_run = false;
            }
        }
        Cow::Owned(out)
    }

    fn name(&self) -> &'static str {
        "compressWhitespace"
    }
}

/// Delete all whitespace.
pub struct RemoveWhitespace;

impl Transformation for RemoveWhitespace {
    fn transform<'a>(&self, input: &'a str) -> Cow<'a, str> {
        if !input.contains(|c: char| c.is_whitespace()) {
            return Cow::Borrowed(input);
        }
        Cow::Owned(input.chars().filter(|c| !c.is_whitespace()).collect())
    }

    fn name(&self) -> &'static str {
        "removeWhitespace"
    }
}

/// Delete NUL bytes.
pub struct RemoveNulls;

impl Transformation for RemoveNulls {
    fn transform<'a>(&self, input: &'a str) -> Cow<'a, str> {
        if !input.contains('\0') {
            return Cow::Borrowed(input);
        }
        Cow::Owned(input.replace('\0', ""))
    }

    fn name(&self) -> &'static str {
        "removeNulls"
    }
}

/// Replace NUL bytes with spaces.
pub struct ReplaceNulls;

impl Transformation for ReplaceNulls {
    fn transform<'a>(&self, input: &'a str) -> Cow<'a, str> {
        if !input.contains('\0') {
            return Cow::Borrowed(input);
        }
        Cow::Owned(input.replace('\0', " "))
    }

    fn name(&self) -> &'static str {
        "replaceNulls"
    }
}

/// Resolve `.` and `..` segments and collapse duplicate slashes.
pub struct NormalizePath;

impl Transformation for NormalizePath {
    fn transform<'a>(&self, input: &'a str) -> Cow<'a, str> {
        if !input.contains('.') && !input.contains("//") {
            return Cow::Borrowed(input);
        }
        let absolute = input.starts_with('/');
        let mut segments: Vec<&str> = Vec::new();
        for seg in input.split('/') {
            match seg {
                "" | "." => {}
                ".." => {
                    // Above the root, ".." segments are discarded.
                    segments.pop();
                }
                other => segments.push(other),
            }
        }
        let mut out = if absolute {
            String::from("/")
        } else {
            String::new()
        };
        out.push_str(&segments.join("/"));
        if input.ends_with('/') && !out.ends_with('/') {
            out.push('/');
        }
        Cow::Owned(out)
    }

    fn name(&self) -> &'static str {
        "normalizePath"
    }
}
