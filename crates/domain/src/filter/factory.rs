//! Registry-based filter construction

use serde_json::Value;
use std::collections::{BTreeMap, HashSet};

use super::{
    Filter, FilterChain, FilterError, FilterSpec, TemplateTruncateFilter, WikiCleanupFilter,
};

/// Builds a filter from its name and raw configuration blob
pub type FilterConstructor = fn(&str, &Value) -> Result<Box<dyn Filter>, FilterError>;

/// Registry mapping type tags to filter constructors
///
/// Unknown tags and malformed configuration are soft failures: the filter is
/// skipped with a warning. A template that fails to compile is a hard error.
#[derive(Clone)]
pub struct FilterFactory {
    registry: BTreeMap<String, FilterConstructor>,
}

impl FilterFactory {
    /// Factory with no registered variants
    pub fn empty() -> Self {
        Self {
            registry: BTreeMap::new(),
        }
    }

    /// Factory with the built-in variants and their legacy aliases
    pub fn with_builtin() -> Self {
        let mut factory = Self::empty();
        factory.register(WikiCleanupFilter::KIND, WikiCleanupFilter::construct);
        factory.register("moegirlwiki", WikiCleanupFilter::construct);
        factory.register(TemplateTruncateFilter::KIND, TemplateTruncateFilter::construct);
        factory.register("basic", TemplateTruncateFilter::construct);
        factory
    }

    pub fn register(&mut self, kind: impl Into<String>, constructor: FilterConstructor) {
        self.registry.insert(kind.into(), constructor);
    }

    /// Registered type tags, sorted
    pub fn known_types(&self) -> Vec<&str> {
        self.registry.keys().map(String::as_str).collect()
    }

    fn try_construct(
        &self,
        name: &str,
        kind: &str,
        raw: &Value,
    ) -> Result<Box<dyn Filter>, FilterError> {
        let constructor = self
            .registry
            .get(kind)
            .ok_or_else(|| FilterError::UnknownType {
                name: name.to_string(),
                kind: kind.to_string(),
            })?;
        constructor(name, raw)
    }

    /// Construct one filter
    ///
    /// Returns `Ok(None)` when the type is unknown or the configuration is
    /// malformed, and `Err` only when the filter can never succeed.
    pub fn construct(
        &self,
        name: &str,
        kind: &str,
        raw: &Value,
    ) -> Result<Option<Box<dyn Filter>>, FilterError> {
        self.load(name, kind, raw).map(Result::ok)
    }

    /// Fatal errors in the outer `Result`, skippable ones (already logged) in the inner
    fn load(
        &self,
        name: &str,
        kind: &str,
        raw: &Value,
    ) -> Result<Result<Box<dyn Filter>, FilterError>, FilterError> {
        match self.try_construct(name, kind, raw) {
            Ok(filter) => {
                tracing::info!(filter = %name, kind = %kind, "Filter loaded");
                Ok(Ok(filter))
            }
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                tracing::warn!(filter = %name, kind = %kind, error = %e, "Skipping filter");
                Ok(Err(e))
            }
        }
    }

    /// Build an ordered chain from configuration blobs
    pub fn build_chain(&self, blobs: &[Value]) -> Result<FilterChain, FilterError> {
        let mut chain = FilterChain::default();
        let mut seen = HashSet::new();

        for (index, raw) in blobs.iter().enumerate() {
            let spec = match FilterSpec::from_value(raw) {
                Ok(spec) => spec,
                Err(e) => {
                    let name = raw
                        .get("name")
                        .and_then(Value::as_str)
                        .map(String::from)
                        .unwrap_or_else(|| format!("#{}", index));
                    tracing::warn!(filter = %name, error = %e, "Skipping malformed filter spec");
                    chain.skip(name, e.to_string());
                    continue;
                }
            };

            if !seen.insert(spec.name.clone()) {
                tracing::warn!(filter = %spec.name, "Skipping filter with duplicate name");
                chain.skip(spec.name, "duplicate name");
                continue;
            }

            match self.load(&spec.name, &spec.kind, raw)? {
                Ok(filter) => chain.push(filter),
                Err(e) => chain.skip(spec.name, e.to_string()),
            }
        }

        Ok(chain)
    }
}

impl Default for FilterFactory {
    fn default() -> Self {
        Self::with_builtin()
    }
}
