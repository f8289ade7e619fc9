//! Message content filters
//!
//! Sensitive-content detection (keywords and regex patterns loaded from a CSV
//! list) and keyword matching for canned replies.

use crate::error::Result;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::path::Path;
use tracing::{info, warn};

/// Runs of whitespace, collapsed before keyword matching so multi-word
/// keywords still match across line breaks
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("Invalid whitespace regex"));

/// Lowercase and collapse whitespace
pub fn normalize(text: &str) -> String {
    WHITESPACE.replace_all(text.trim(), " ").to_lowercase()
}

/// True if the normalized text contains any of the keywords
pub fn contains_any_keyword<S: AsRef<str>>(text: &str, keywords: &[S]) -> bool {
    let normalized = normalize(text);
    keywords
        .iter()
        .map(|k| normalize(k.as_ref()))
        .any(|k| !k.is_empty() && normalized.contains(&k))
}

#[derive(Debug, Deserialize)]
struct TermRow {
    #[serde(rename = "type")]
    term_type: String,
    term: String,
}

/// Keywords and regex patterns that mark a message for human handling.
/// Loaded once at startup, immutable afterwards.
#[derive(Debug, Clone, Default)]
pub struct SensitiveTermSet {
    keywords: Vec<String>,
    patterns: Vec<Regex>,
}

impl SensitiveTermSet {
    /// Build from in-memory lists; invalid patterns are skipped with a warning
    pub fn from_terms<K, P>(keywords: &[K], patterns: &[P]) -> Self
    where
        K: AsRef<str>,
        P: AsRef<str>,
    {
        let keywords = keywords
            .iter()
            .map(|k| normalize(k.as_ref()))
            .filter(|k| !k.is_empty())
            .collect();

        let patterns = patterns
            .iter()
            .filter_map(|p| {
                match Regex::new(p.as_ref()) {
                    Ok(re) => Some(re),
                    Err(e) => {
                        warn!("Invalid sensitive pattern '{}': {}", p.as_ref(), e);
                        None
                    }
                }
            })
            .collect();

        Self { keywords, patterns }
    }

    /// Load from a CSV file with `type,term` columns (`keyword` or `pattern`).
    /// A missing file yields an empty set.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            warn!(path = %path.display(), "Sensitive terms file not found, escalation disabled");
            return Ok(Self::default());
        }

        let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_path(path)?;

        let mut keywords = Vec::new();
        let mut patterns = Vec::new();
        for row in reader.deserialize::<TermRow>() {
            let row = row?;
            match row.term_type.to_lowercase().as_str() {
                "keyword" => keywords.push(row.term),
                "pattern" => patterns.push(row.term),
                other => warn!("Unknown sensitive term type '{}' for '{}'", other, row.term),
            }
        }

        let set = Self::from_terms(&keywords, &patterns);
        info!(keywords = set.keywords.len(), patterns = set.patterns.len(), "Loaded sensitive terms");
        Ok(set)
    }

    /// The first keyword or pattern the message matches
    pub fn matched_term(&self, message: &str) -> Option<&str> {
        let normalized = normalize(message);

        if let Some(keyword) = self.keywords.iter().find(|k| normalized.contains(k.as_str())) {
            return Some(keyword.as_str());
        }

        // Patterns see the lowercased body with its original whitespace
        let lowered = message.to_lowercase();
        self.patterns
            .iter()
            .find(|p| p.is_match(&lowered))
            .map(|p| p.as_str())
    }

    pub fn is_sensitive(&self, message: &str) -> bool {
        self.matched_term(message).is_some()
    }

    pub fn len(&self) -> usize {
        self.keywords.len() + self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keywords.is_empty() && self.patterns.is_empty()
    }
}
