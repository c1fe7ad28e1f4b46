//! Wiki markup cleanup filter

use regex::Regex;
use serde_json::Value;

use super::{Filter, FilterError};
use crate::model::FeedItem;

/// Interwiki prefixes that are not language codes
const INTERWIKI_PREFIXES: &[&str] = &[
    "wikipedia", "wp", "commons", "meta", "mw", "moegirl", "wiktionary",
];

/// Language editions that interlanguage links point at
const LANGUAGE_CODES: &[&str] = &[
    "ar", "bg", "ca", "cs", "da", "de", "el", "en", "eo", "es", "et", "fa", "fi", "fr", "he",
    "hi", "hr", "hu", "id", "it", "ja", "ko", "lt", "lv", "ms", "nl", "no", "pl", "pt", "ro",
    "ru", "sk", "sl", "sr", "sv", "th", "tr", "uk", "vi", "yue", "zh",
];

/// Namespaces whose links are page metadata rather than prose
const META_NAMESPACES: &[&str] = &[
    "category", "file", "image", "分类", "分類", "文件", "檔案", "图像",
];

/// Markup that cannot be cleaned safely
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MarkupError {
    #[error("unclosed template transclusion")]
    UnclosedTemplate,
    #[error("unclosed wiki link")]
    UnclosedLink,
    #[error("unexpected '{0}'")]
    Unbalanced(&'static str),
}

/// Strips wiki artifacts from item content
///
/// Template transclusions and interlanguage links are removed, ordinary links
/// collapse to their label. Items with malformed markup are dropped.
pub struct WikiCleanupFilter {
    name: String,
    language_code: Regex,
    emphasis: Regex,
    spaces: Regex,
    blank_lines: Regex,
}

impl WikiCleanupFilter {
    pub const KIND: &'static str = "wiki-cleanup";

    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            language_code: Regex::new(r"^[a-z]{2,3}(-[a-z]{2,8})*$").expect("Valid regex"),
            emphasis: Regex::new(r"'{2,}").expect("Valid regex"),
            spaces: Regex::new(r"[ \t]{2,}").expect("Valid regex"),
            blank_lines: Regex::new(r"\n{3,}").expect("Valid regex"),
        }
    }

    /// Factory entry point; this variant takes no extra fields
    pub fn construct(name: &str, _raw: &Value) -> Result<Box<dyn Filter>, FilterError> {
        Ok(Box::new(Self::new(name)))
    }

    /// Known language edition (`ja`, `zh-hans`) or interwiki prefix
    fn is_interwiki(&self, prefix: &str) -> bool {
        let prefix = prefix.trim().to_lowercase();
        if INTERWIKI_PREFIXES.contains(&prefix.as_str()) {
            return true;
        }
        let primary = prefix.split('-').next().unwrap_or_default();
        self.language_code.is_match(&prefix) && LANGUAGE_CODES.contains(&primary)
    }

    fn clean(&self, text: &str) -> Result<String, MarkupError> {
        clean_with(text, &|prefix| self.is_interwiki(prefix)).map(|s| self.tidy(&s))
    }

    /// Drop emphasis quotes and the blank space removed markup leaves behind
    fn tidy(&self, text: &str) -> String {
        let text = self.emphasis.replace_all(text, "");
        let text = self.spaces.replace_all(&text, " ");
        let text: String = text
            .lines()
            .map(str::trim_end)
            .collect::<Vec<_>>()
            .join("\n");
        self.blank_lines.replace_all(&text, "\n\n").trim().to_string()
    }
}

impl Filter for WikiCleanupFilter {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        Self::KIND
    }

    fn process(&self, items: Vec<FeedItem>) -> Vec<FeedItem> {
        items
            .into_iter()
            .filter_map(|item| match self.clean(&item.content) {
                Ok(content) => Some(item.with_content(content)),
                Err(e) => {
                    tracing::warn!(
                        filter = %self.name,
                        link = %item.link,
                        error = %e,
                        "Dropping item with malformed wiki markup"
                    );
                    None
                }
            })
            .collect()
    }
}

/// Clean markup with the built-in language and interwiki prefixes
pub fn clean_markup(text: &str) -> Result<String, MarkupError> {
    WikiCleanupFilter::new("").clean(text)
}

fn clean_with(text: &str, is_interwiki: &dyn Fn(&str) -> bool) -> Result<String, MarkupError> {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(pos) = next_token(rest) {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];

        if tail.starts_with("{{") {
            let end = matching_close(tail, "{{", "}}").ok_or(MarkupError::UnclosedTemplate)?;
            rest = &tail[end..];
        } else if tail.starts_with("[[") {
            let end = matching_close(tail, "[[", "]]").ok_or(MarkupError::UnclosedLink)?;
            out.push_str(&render_link(&tail[2..end - 2], is_interwiki)?);
            rest = &tail[end..];
        } else if tail.starts_with("}}") {
            return Err(MarkupError::Unbalanced("}}"));
        } else {
            return Err(MarkupError::Unbalanced("]]"));
        }
    }

    out.push_str(rest);
    Ok(out)
}

fn next_token(text: &str) -> Option<usize> {
    ["{{", "}}", "[[", "]]"]
        .iter()
        .filter_map(|token| text.find(token))
        .min()
}

/// Byte offset just past the close that balances the open at the start of `text`
fn matching_close(text: &str, open: &str, close: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut i = 0;

    loop {
        let next_open = text[i..].find(open).map(|p| p + i);
        let next_close = text[i..].find(close).map(|p| p + i);

        match (next_open, next_close) {
            (Some(o), Some(c)) if o < c => {
                depth += 1;
                i = o + open.len();
            }
            (_, Some(c)) => {
                depth = depth.checked_sub(1)?;
                i = c + close.len();
                if depth == 0 {
                    return Some(i);
                }
            }
            (_, None) => return None,
        }
    }
}

fn render_link(inner: &str, is_interwiki: &dyn Fn(&str) -> bool) -> Result<String, MarkupError> {
    let (target, label) = match inner.split_once('|') {
        Some((target, label)) => (target.trim(), Some(label)),
        None => (inner.trim(), None),
    };

    // Leading colon: an inline link into another wiki or namespace
    if let Some(stripped) = target.strip_prefix(':') {
        let display = match label {
            Some(label) => label,
            None => stripped
                .split_once(':')
                .map(|(_, page)| page)
                .unwrap_or(stripped),
        };
        return clean_with(display, is_interwiki);
    }

    if let Some((prefix, _)) = target.split_once(':') {
        let lowered = prefix.trim().to_lowercase();
        if is_interwiki(prefix) || META_NAMESPACES.contains(&lowered.as_str()) {
            return Ok(String::new());
        }
    }

    clean_with(label.unwrap_or(target), is_interwiki)
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::OffsetDateTime;

    fn item(content: &str) -> FeedItem {
        FeedItem {
            source: "wiki".to_string(),
            title: "Page".to_string(),
            content: content.to_string(),
            link: "https://zh.moegirl.org.cn/Page".to_string(),
            published_at: OffsetDateTime::UNIX_EPOCH,
            media: None,
            repost_of: None,
        }
    }

    #[test]
    fn test_removes_templates_including_nested() {
        let cleaned = clean_markup("Intro {{Infobox|name={{lang|ja|名前}}}} text").unwrap();
        assert_eq!(cleaned, "Intro text");
    }

    #[test]
    fn test_removes_interlanguage_links() {
        let cleaned = clean_markup("Body.\n[[en:Page]]\n[[ja:ページ]]").unwrap();
        assert_eq!(cleaned, "Body.");
    }

    #[test]
    fn test_titles_with_colons_are_kept() {
        let cleaned = clean_markup("See [[Re:从零开始的异世界生活]] now.").unwrap();
        assert_eq!(cleaned, "See Re:从零开始的异世界生活 now.");

        let cleaned = clean_markup("[[Fate:Zero|Zero]] and [[zh-hans:页面]]").unwrap();
        assert_eq!(cleaned, "Zero and");
    }

    #[test]
    fn test_links_collapse_to_label() {
        let cleaned = clean_markup("See [[Target|the label]] and [[Other]].").unwrap();
        assert_eq!(cleaned, "See the label and Other.");
    }

    #[test]
    fn test_inline_interwiki_keeps_page_name() {
        let cleaned = clean_markup("Read [[:wikipedia:Rust]] or [[:en:Rust|this]].").unwrap();
        assert_eq!(cleaned, "Read Rust or this.");
    }

    #[test]
    fn test_category_and_emphasis_are_stripped() {
        let cleaned = clean_markup("'''Bold''' and ''italic''[[Category:Stuff]]").unwrap();
        assert_eq!(cleaned, "Bold and italic");
    }

    #[test]
    fn test_malformed_markup_errors() {
        assert_eq!(
            clean_markup("broken {{template"),
            Err(MarkupError::UnclosedTemplate)
        );
        assert_eq!(clean_markup("broken [[link"), Err(MarkupError::UnclosedLink));
        assert_eq!(
            clean_markup("stray }} here"),
            Err(MarkupError::Unbalanced("}}"))
        );
    }

    #[test]
    fn test_process_drops_only_malformed_items() {
        let filter = WikiCleanupFilter::new("wiki");
        let out = filter.process(vec![
            item("first {{stub}}"),
            item("second {{broken"),
            item("third [[Link]]"),
        ]);

        assert_eq!(out.len(), 2);
        assert_eq!(out[0].content, "first");
        assert_eq!(out[1].content, "third Link");
    }

    #[test]
    fn test_plain_text_is_unchanged() {
        let filter = WikiCleanupFilter::new("wiki");
        let out = filter.process(vec![item("nothing to clean")]);
        assert_eq!(out[0].content, "nothing to clean");
        assert_eq!(filter.name(), "wiki");
    }
}
