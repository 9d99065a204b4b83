//! Immutable pattern table and the two local matchers built on it

use crate::collaborators::{LocalMatch, LocalMatcher};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Default similarity a typo match must reach
pub const DEFAULT_TYPO_THRESHOLD: f64 = 0.8;

/// Confidence ceiling for typo matches so they never outrank exact ones
const TYPO_CONFIDENCE_CAP: f64 = 0.95;

/// One phrase to command mapping
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternRecord {
    /// Canonical natural-language phrase
    pub phrase: String,
    /// Command it resolves to
    pub command: String,
    /// What the command does
    #[serde(default)]
    pub explanation: String,
    /// Platforms this record applies to; empty means all
    #[serde(default)]
    pub platforms: Vec<String>,
    /// Additional phrases resolving to the same command
    #[serde(default)]
    pub aliases: Vec<String>,
}

impl PatternRecord {
    /// Whether this record applies to `platform`
    #[must_use]
    pub fn applies_to(&self, platform: &str) -> bool {
        self.platforms.is_empty() || self.platforms.iter().any(|p| p == platform)
    }

    fn phrases(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.phrase.as_str()).chain(self.aliases.iter().map(String::as_str))
    }
}

/// Loaded-once, shareable table of pattern records.
///
/// Phrases are canonicalized on construction; cloning shares the records.
#[derive(Debug, Clone, Default)]
pub struct PatternTable {
    records: Arc<[PatternRecord]>,
}

impl PatternTable {
    /// Build a table, canonicalizing every phrase and alias
    #[must_use]
    pub fn new(records: Vec<PatternRecord>) -> Self {
        let records: Vec<PatternRecord> = records
            .into_iter()
            .map(|mut r| {
                r.phrase = canonical(&r.phrase);
                r.aliases = r.aliases.iter().map(|a| canonical(a)).collect();
                r.platforms = r.platforms.iter().map(|p| p.to_lowercase()).collect();
                r
            })
            .filter(|r| !r.phrase.is_empty() && !r.command.trim().is_empty())
            .collect();
        Self {
            records: records.into(),
        }
    }

    /// All records
    #[must_use]
    pub fn records(&self) -> &[PatternRecord] {
        &self.records
    }

    /// Number of records
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the table has no records
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Lowercase, trim, drop trailing punctuation and collapse whitespace
#[must_use]
pub fn canonical(input: &str) -> String {
    nlcli_cache::normalize(input)
        .trim_end_matches(['?', '.', '!'])
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Matches phrases exactly after canonicalization
#[derive(Debug, Clone)]
pub struct ExactMatcher {
    table: PatternTable,
    index: HashMap<String, Vec<usize>>,
}

impl ExactMatcher {
    /// Index `table` for exact lookups
    #[must_use]
    pub fn new(table: PatternTable) -> Self {
        let mut index: HashMap<String, Vec<usize>> = HashMap::new();
        for (i, record) in table.records().iter().enumerate() {
            for phrase in record.phrases() {
                index.entry(phrase.to_string()).or_default().push(i);
            }
        }
        Self { table, index }
    }
}

impl LocalMatcher for ExactMatcher {
    fn find(&self, input: &str, platform: &str) -> Option<LocalMatch> {
        let records = self.table.records();
        let record = self
            .index
            .get(&canonical(input))?
            .iter()
            .map(|&i| &records[i])
            .find(|r| r.applies_to(platform))?;
        Some(LocalMatch {
            command: record.command.clone(),
            explanation: record.explanation.clone(),
            confidence: 1.0,
            source: "exact".to_string(),
        })
    }
}

/// Matches phrases within an edit-distance similarity threshold
#[derive(Debug, Clone)]
pub struct TypoMatcher {
    table: PatternTable,
    threshold: f64,
}

impl TypoMatcher {
    /// Matcher over `table` with the default threshold
    #[must_use]
    pub fn new(table: PatternTable) -> Self {
        Self {
            table,
            threshold: DEFAULT_TYPO_THRESHOLD,
        }
    }

    /// Override the similarity threshold
    #[must_use]
    pub const fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }
}

impl LocalMatcher for TypoMatcher {
    fn find(&self, input: &str, platform: &str) -> Option<LocalMatch> {
        let input = canonical(input);
        if input.is_empty() {
            return None;
        }

        let mut best: Option<(&PatternRecord, f64)> = None;
        for record in self.table.records().iter().filter(|r| r.applies_to(platform)) {
            for phrase in record.phrases() {
                let score = similarity(&input, phrase);
                if score >= self.threshold && best.is_none_or(|(_, s)| score > s) {
                    best = Some((record, score));
                }
            }
        }

        let (record, score) = best?;
        tracing::debug!(input = %input, phrase = %record.phrase, score, "Typo match");
        Some(LocalMatch {
            command: record.command.clone(),
            explanation: record.explanation.clone(),
            confidence: score.min(TYPO_CONFIDENCE_CAP),
            source: "typo".to_string(),
        })
    }
}

/// `1 - distance / longest`, in `[0, 1]`
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn similarity(a: &str, b: &str) -> f64 {
    let longest = a.chars().count().max(b.chars().count());
    if longest == 0 {
        return 1.0;
    }
    1.0 - levenshtein(a, b) as f64 / longest as f64
}

fn levenshtein(a: &str, b: &str) -> usize {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();
    let m = a_chars.len();
    let n = b_chars.len();

    if m == 0 {
        return n;
    }
    if n == 0 {
        return m;
    }

    let mut prev: Vec<usize> = (0..=n).collect();
    let mut curr = vec![0; n + 1];

    for i in 1..=m {
        curr[0] = i;
        for j in 1..=n {
            let cost = usize::from(a_chars[i - 1] != b_chars[j - 1]);
            curr[j] = (prev[j] + 1).min(curr[j - 1] + 1).min(prev[j - 1] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[n]
}
