//! The transform registry: an ordered, composable chain of pure document rewrites.

use crate::{Document, VortexError};

/// A single pure rewrite stage.
///
/// Implementors must not perform I/O or depend on anything but their input (the
/// current wall-clock time is the one documented exception, used by
/// `UpdateModifiedTime` and `AddTimestampIfDropped`). A `Transform` must be safe to
/// invoke concurrently on disjoint documents, since the registry itself holds no
/// per-call state.
pub trait Transform: Send + Sync {
    /// A stable name used in error messages and logs; never shown to end users.
    fn name(&self) -> &'static str;

    /// Rewrite `doc`, returning the new document or the reason this stage refused to.
    fn apply(&self, doc: Document) -> anyhow::Result<Document>;
}

/// An ordered sequence of [`Transform`] stages, built once at process start and
/// thereafter immutable.
pub struct Registry {
    stages: Vec<Box<dyn Transform>>,
}

impl Registry {
    /// An empty registry; stages are added with [`Registry::register`].
    pub fn new() -> Self {
        Self { stages: Vec::new() }
    }

    /// Appends `stage` to the end of the chain.
    pub fn register(&mut self, stage: Box<dyn Transform>) -> &mut Self {
        self.stages.push(stage);
        self
    }

    /// Threads `doc` through every registered stage in order, short-circuiting
    /// on the first error.
    pub fn apply(&self, doc: Document) -> Result<Document, VortexError> {
        let mut current = doc;
        for stage in &self.stages {
            current = stage
                .apply(current)
                .map_err(|source| VortexError::Transform {
                    stage: stage.name(),
                    source,
                })?;
        }
        Ok(current)
    }

    /// Names of the registered stages, in application order. Exposed for tests
    /// and diagnostics rather than control flow.
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct SetField(&'static str, &'static str);
    impl Transform for SetField {
        fn name(&self) -> &'static str {
            "set_field"
        }
        fn apply(&self, mut doc: Document) -> anyhow::Result<Document> {
            doc[self.0] = json!(self.1);
            Ok(doc)
        }
    }

    struct AlwaysFails;
    impl Transform for AlwaysFails {
        fn name(&self) -> &'static str {
            "always_fails"
        }
        fn apply(&self, _doc: Document) -> anyhow::Result<Document> {
            anyhow::bail!("boom")
        }
    }

    #[test]
    fn applies_stages_in_order() {
        let mut registry = Registry::new();
        registry
            .register(Box::new(SetField("a", "1")))
            .register(Box::new(SetField("b", "2")));

        let out = registry.apply(json!({})).unwrap();
        assert_eq!(out, json!({"a": "1", "b": "2"}));
    }

    #[test]
    fn short_circuits_on_first_error() {
        let mut registry = Registry::new();
        registry
            .register(Box::new(SetField("a", "1")))
            .register(Box::new(AlwaysFails))
            .register(Box::new(SetField("b", "2")));

        let err = registry.apply(json!({})).unwrap_err();
        match err {
            VortexError::Transform { stage, .. } => assert_eq!(stage, "always_fails"),
            other => panic!("expected Transform error, got {other:?}"),
        }
    }
}
