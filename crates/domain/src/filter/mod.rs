//! Filter pipeline
//!
//! Filters are named transformation stages over ordered sequences of
//! [`FeedItem`]s. They are built from configuration blobs by the
//! [`FilterFactory`] and applied in order by a [`FilterChain`].

mod factory;
mod template;
mod wiki;

pub use factory::{FilterConstructor, FilterFactory};
pub use template::{DEFAULT_MAX_LENGTH, ELLIPSIS, TemplateTruncateFilter, truncate_graphemes};
pub use wiki::{MarkupError, WikiCleanupFilter, clean_markup};

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::model::FeedItem;

/// A named transformation stage
///
/// Implementations must preserve the relative order of the items they emit.
pub trait Filter: Send + Sync {
    /// Name given at construction; never changes
    fn name(&self) -> &str;

    /// Type tag of the variant
    fn kind(&self) -> &'static str;

    fn process(&self, items: Vec<FeedItem>) -> Vec<FeedItem>;
}

/// Filter construction errors
#[derive(Debug, Error)]
pub enum FilterError {
    #[error("Unknown filter type '{kind}' for filter '{name}'")]
    UnknownType { name: String, kind: String },
    #[error("Invalid configuration for filter '{name}': {message}")]
    Config { name: String, message: String },
    #[error("Template for filter '{name}' failed to compile: {message}")]
    TemplateCompile { name: String, message: String },
}

impl FilterError {
    /// Whether this error must abort construction instead of skipping the filter
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::TemplateCompile { .. })
    }
}

/// Common header of every filter configuration blob
#[derive(Debug, Clone, Deserialize)]
pub struct FilterSpec {
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
}

impl FilterSpec {
    pub fn from_value(raw: &Value) -> Result<Self, serde_json::Error> {
        Self::deserialize(raw)
    }
}

/// A filter that was left out of a chain, and why
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedFilter {
    pub name: String,
    pub reason: String,
}

/// Ordered sequence of filters; each consumes the previous one's output
#[derive(Default)]
pub struct FilterChain {
    filters: Vec<Box<dyn Filter>>,
    skipped: Vec<SkippedFilter>,
}

impl FilterChain {
    pub fn new(filters: Vec<Box<dyn Filter>>) -> Self {
        Self {
            filters,
            skipped: vec![],
        }
    }

    pub(crate) fn push(&mut self, filter: Box<dyn Filter>) {
        self.filters.push(filter);
    }

    pub(crate) fn skip(&mut self, name: impl Into<String>, reason: impl Into<String>) {
        self.skipped.push(SkippedFilter {
            name: name.into(),
            reason: reason.into(),
        });
    }

    /// Names of the loaded filters, in application order
    pub fn names(&self) -> Vec<&str> {
        self.filters.iter().map(|f| f.name()).collect()
    }

    /// `(name, kind)` of the loaded filters, in application order
    pub fn describe(&self) -> Vec<(&str, &'static str)> {
        self.filters.iter().map(|f| (f.name(), f.kind())).collect()
    }

    pub fn skipped(&self) -> &[SkippedFilter] {
        &self.skipped
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Run the items through every filter in order
    pub fn apply(&self, items: Vec<FeedItem>) -> Vec<FeedItem> {
        self.filters.iter().fold(items, |items, filter| {
            let before = items.len();
            let out = filter.process(items);
            tracing::debug!(
                filter = %filter.name(),
                kind = filter.kind(),
                input = before,
                output = out.len(),
                "Applied filter"
            );
            out
        })
    }
}
