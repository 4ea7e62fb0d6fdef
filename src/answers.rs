//! Answer lookup
//!
//! A preloaded question/answer book matched against transcript text. Matching
//! runs in priority order: exact normalized match, bidirectional substring
//! containment, then edit-distance similarity with a floor. Always returns an
//! answer; unmatched transcripts get the book's default response.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use crate::{Error, Result};

/// Answer book bundled into the binary
const EMBEDDED_BOOK: &str = include_str!("../answers/default.toml");

/// Similarity floor for edit-distance matching
const SIMILARITY_FLOOR: f64 = 0.5;

#[derive(Debug, Deserialize)]
struct BookFile {
    default_answer: String,
    #[serde(default)]
    entries: Vec<BookEntry>,
}

#[derive(Debug, Deserialize)]
struct BookEntry {
    question: String,
    answer: String,
}

/// Loaded question/answer mapping, stateless after construction
#[derive(Debug)]
pub struct AnswerBook {
    entries: HashMap<String, String>,
    default_answer: String,
}

impl AnswerBook {
    /// Load the book from a TOML file
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or parsed, or if the
    /// default answer is empty
    pub fn from_path(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let book = Self::from_toml(&raw)?;
        tracing::info!(path = %path.display(), entries = book.len(), "answer book loaded");
        Ok(book)
    }

    /// Load the answer book bundled into the binary
    ///
    /// # Errors
    ///
    /// Returns error if the embedded book fails to parse
    pub fn embedded() -> Result<Self> {
        let book = Self::from_toml(EMBEDDED_BOOK)?;
        tracing::debug!(entries = book.len(), "embedded answer book loaded");
        Ok(book)
    }

    fn from_toml(raw: &str) -> Result<Self> {
        let file: BookFile = toml::from_str(raw)?;

        if file.default_answer.trim().is_empty() {
            return Err(Error::Answers("default answer must not be empty".to_string()));
        }

        let entries = file
            .entries
            .into_iter()
            .map(|e| (normalize(&e.question), e.answer))
            .collect();

        Ok(Self {
            entries,
            default_answer: file.default_answer,
        })
    }

    /// Number of entries in the book
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the book has no entries
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether a transcript matched an entry rather than the default
    #[must_use]
    pub fn has_answer(&self, text: &str) -> bool {
        self.lookup(text).is_some()
    }

    /// Look up an answer for a transcript; never returns an empty string
    #[must_use]
    pub fn get_answer(&self, text: &str) -> &str {
        self.lookup(text).unwrap_or(&self.default_answer)
    }

    fn lookup(&self, text: &str) -> Option<&str> {
        let query = normalize(text);
        if query.is_empty() {
            return None;
        }

        if let Some(answer) = self.entries.get(&query) {
            tracing::debug!(%query, "answer matched exactly");
            return Some(answer);
        }

        for (question, answer) in &self.entries {
            if question.contains(&query) || query.contains(question) {
                tracing::debug!(%query, matched = %question, "answer matched by containment");
                return Some(answer);
            }
        }

        let mut best: Option<(&str, &str, f64)> = None;
        for (question, answer) in &self.entries {
            let score = similarity(&query, question);
            if score >= SIMILARITY_FLOOR
                && best.is_none_or(|(_, _, best_score)| score > best_score)
            {
                best = Some((question, answer, score));
            }
        }

        if let Some((question, answer, score)) = best {
            tracing::debug!(%query, matched = %question, score, "answer matched by similarity");
            return Some(answer);
        }

        tracing::debug!(%query, "no answer matched, using default");
        None
    }
}

/// Lowercase, strip punctuation, collapse whitespace
fn normalize(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c.is_whitespace() {
                c
            } else {
                ' '
            }
        })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Normalized edit-distance similarity: `1 - distance / max(len1, len2)`
#[allow(clippy::cast_precision_loss)]
fn similarity(a: &str, b: &str) -> f64 {
    let max_len = a.chars().count().max(b.chars().count());
    if max_len == 0 {
        return 1.0;
    }
    1.0 - levenshtein(a, b) as f64 / max_len as f64
}

/// Levenshtein distance over chars, two-row dynamic programming
fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();

    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];

    for (i, &ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, &cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn book() -> AnswerBook {
        AnswerBook::from_toml(
            r#"
            default_answer = "I don't know that one yet."

            [[entries]]
            question = "what is this"
            answer = "This is a voice assistant demo."

            [[entries]]
            question = "what time is it"
            answer = "Time to get a watch."
            "#,
        )
        .unwrap()
    }

    #[test]
    fn exact_match_after_normalization() {
        let book = book();
        assert_eq!(
            book.get_answer("What is THIS?!"),
            "This is a voice assistant demo."
        );
    }

    #[test]
    fn substring_containment_both_directions() {
        let book = book();
        // Query contains an entry question
        assert_eq!(
            book.get_answer("hey, what time is it right now"),
            "Time to get a watch."
        );
        // Entry question contains the query
        assert_eq!(book.get_answer("time is it"), "Time to get a watch.");
    }

    #[test]
    fn similarity_match_above_floor() {
        let book = book();
        // One substitution away from "what is this"
        assert_eq!(
            book.get_answer("what es this"),
            "This is a voice assistant demo."
        );
    }

    #[test]
    fn unmatched_falls_back_to_default() {
        let book = book();
        assert_eq!(
            book.get_answer("recite the complete works of shakespeare"),
            "I don't know that one yet."
        );
        assert!(!book.has_answer("recite the complete works of shakespeare"));
    }

    #[test]
    fn empty_query_gets_default() {
        let book = book();
        assert_eq!(book.get_answer("  ...  "), "I don't know that one yet.");
    }

    #[test]
    fn embedded_book_parses() {
        let book = AnswerBook::embedded().unwrap();
        assert!(!book.is_empty());
        assert!(!book.get_answer("anything at all").is_empty());
    }

    #[test]
    fn levenshtein_basics() {
        assert_eq!(levenshtein("kitten", "sitting"), 3);
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("same", "same"), 0);
    }

    #[test]
    fn empty_default_rejected() {
        let result = AnswerBook::from_toml(r#"default_answer = "  ""#);
        assert!(result.is_err());
    }
}
