//! Template rendering with grapheme-safe truncation

use handlebars::Handlebars;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::format_description::well_known::Rfc3339;
use unicode_segmentation::UnicodeSegmentation;

use super::{Filter, FilterError};
use crate::model::{FeedItem, Media};

/// Limit used when `maxLength` is omitted or zero
pub const DEFAULT_MAX_LENGTH: usize = 120;

/// Marker appended to truncated output
pub const ELLIPSIS: &str = "…";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TemplateTruncateConfig {
    format: String,
    #[serde(default, alias = "maxlength", alias = "max_length")]
    max_length: Option<usize>,
}

#[derive(Serialize)]
struct TemplateContext<'a> {
    title: &'a str,
    content: &'a str,
    link: &'a str,
    timestamp: String,
    source: &'a str,
    media_url: Option<&'a str>,
}

impl<'a> TemplateContext<'a> {
    fn from_item(item: &'a FeedItem) -> Self {
        Self {
            title: &item.title,
            content: &item.content,
            link: &item.link,
            timestamp: item.published_at.format(&Rfc3339).unwrap_or_default(),
            source: &item.source,
            media_url: match &item.media {
                Some(Media::Url(url)) => Some(url),
                _ => None,
            },
        }
    }
}

/// Renders each item through a template and truncates the result
///
/// The template is compiled once at construction. Rendered output replaces the
/// item content and never exceeds `max_length` grapheme clusters.
pub struct TemplateTruncateFilter {
    name: String,
    registry: Handlebars<'static>,
    max_length: usize,
}

impl std::fmt::Debug for TemplateTruncateFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemplateTruncateFilter")
            .field("name", &self.name)
            .field("max_length", &self.max_length)
            .finish()
    }
}

impl TemplateTruncateFilter {
    pub const KIND: &'static str = "template-truncate";

    /// Compile `format`; fails if the template syntax is invalid
    pub fn new(
        name: impl Into<String>,
        format: &str,
        max_length: Option<usize>,
    ) -> Result<Self, FilterError> {
        let name = name.into();
        let mut registry = Handlebars::new();
        registry.register_escape_fn(handlebars::no_escape);
        registry.set_strict_mode(false);
        registry
            .register_template_string(&name, format)
            .map_err(|e| FilterError::TemplateCompile {
                name: name.clone(),
                message: e.to_string(),
            })?;

        let max_length = match max_length {
            Some(0) | None => DEFAULT_MAX_LENGTH,
            Some(n) => n,
        };

        Ok(Self {
            name,
            registry,
            max_length,
        })
    }

    /// Factory entry point
    pub fn construct(name: &str, raw: &Value) -> Result<Box<dyn Filter>, FilterError> {
        let config =
            TemplateTruncateConfig::deserialize(raw).map_err(|e| FilterError::Config {
                name: name.to_string(),
                message: e.to_string(),
            })?;
        Ok(Box::new(Self::new(name, &config.format, config.max_length)?))
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }

    /// Render and truncate a single item
    pub fn render(&self, item: &FeedItem) -> Result<String, handlebars::RenderError> {
        let rendered = self
            .registry
            .render(&self.name, &TemplateContext::from_item(item))?;
        Ok(truncate_graphemes(&rendered, self.max_length))
    }
}

impl Filter for TemplateTruncateFilter {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        Self::KIND
    }

    fn process(&self, items: Vec<FeedItem>) -> Vec<FeedItem> {
        items
            .into_iter()
            .filter_map(|item| match self.render(&item) {
                Ok(content) => Some(item.with_content(content)),
                Err(e) => {
                    tracing::warn!(
                        filter = %self.name,
                        link = %item.link,
                        error = %e,
                        "Dropping item that failed to render"
                    );
                    None
                }
            })
            .collect()
    }
}

/// Cut `text` to at most `max` grapheme clusters, ending with [`ELLIPSIS`] when cut
pub fn truncate_graphemes(text: &str, max: usize) -> String {
    if text.graphemes(true).count() <= max {
        return text.to_string();
    }
    if max == 0 {
        return String::new();
    }

    let kept: String = text.graphemes(true).take(max - 1).collect();
    format!("{}{}", kept.trim_end(), ELLIPSIS)
}
