//! Ordered transformation pipeline.

use super::{create_transformation, Transformation};
use crate::error::Result;
use std::borrow::Cow;
use std::sync::Arc;

/// An ordered chain of transformations.
///
/// Order is significant and stable: `apply` folds the input through every
/// step; `expand` additionally exposes each intermediate value for
/// multi-match evaluation.
#[derive(Clone, Default)]
pub struct TransformationPipeline {
    steps: Vec<Arc<dyn Transformation>>,
}

impl TransformationPipeline {
    /// Create an empty pipeline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a pipeline from registry names. `none` resets the chain
    /// accumulated so far, matching SecRule `t:none` semantics.
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Result<Self> {
        let mut steps = Vec::with_capacity(names.len());
        for name in names {
            if name.as_ref().eq_ignore_ascii_case("none") {
                steps.clear();
                continue;
            }
            steps.push(create_transformation(name.as_ref())?);
        }
        Ok(Self { steps })
    }

    /// Append a transformation.
    pub fn push(&mut self, step: Arc<dyn Transformation>) {
        self.steps.push(step);
    }

    /// Apply every step in order and return the final value.
    pub fn apply<'a>(&self, input: &'a str) -> Cow<'a, str> {
        let mut current: Cow<'a, str> = Cow::Borrowed(input);
        for step in &self.steps {
            current = match current {
                Cow::Borrowed(s) => step.transform(s),
                Cow::Owned(s) => Cow::Owned(step.transform(&s).into_owned()),
            };
        }
        current
    }

    /// Produce the multi-match sequence: the original value followed by the
    /// value after each step, in pipeline order.
    pub fn expand(&self, input: &str) -> Vec<String> {
        let mut out = Vec::with_capacity(self.steps.len() + 1);
        out.push(input.to_string());
        let mut current = input.to_string();
        for step in &self.steps {
            current = step.transform(&current).into_owned();
            out.push(current.clone());
        }
        out
    }

    /// Registry names of the steps, for audit reproduction.
    pub fn names(&self) -> Vec<&'static str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    /// Whether the pipeline has no steps.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Number of steps.
    pub fn len(&self) -> usize {
        self.steps.len()
    }
}

impl std::fmt::Debug for TransformationPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransformationPipeline")
            .field("steps", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_pipeline_is_identity() {
        let p = TransformationPipeline::new();
        assert_eq!(p.apply("UnChanged"), "UnChanged");
        assert_eq!(p.expand("x"), vec!["x"]);
    }

    #[test]
    fn test_apply_order() {
        let p = TransformationPipeline::from_names(&["urlDecode", "lowercase"]).unwrap();
        assert_eq!(p.apply("HELLO%20WORLD"), "hello world");
    }

    #[test]
    fn test_expand_yields_intermediates() {
        let p = TransformationPipeline::from_names(&["lowercase", "removeWhitespace"]).unwrap();
        let seq = p.expand("DROP TABLE users");
        assert_eq!(
            seq,
            vec!["DROP TABLE users", "drop table users", "droptableusers"]
        );
    }

    #[test]
    fn test_none_resets_chain() {
        let p = TransformationPipeline::from_names(&["lowercase", "none", "uppercase"]).unwrap();
        assert_eq!(p.apply("hello"), "HELLO");
        assert_eq!(p.names(), vec!["uppercase"]);
    }
}
