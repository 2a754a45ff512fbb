//! Final results and how they are handed to storage.
//!
//! The pipeline never talks to a database. It parses the model's final text
//! into the shape each operation needs and passes it to a [`ResultStore`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{GenerationError, GenerationResult};
use crate::events::{DocumentId, OperationType};
use crate::quiz::{QuizConfig, QuizQuestion};

/// A term and its definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyTerm {
    pub term: String,
    pub definition: String,
}

/// Persistence capability supplied by the host application.
///
/// Each method stores one result record and returns its identifier.
#[async_trait]
pub trait ResultStore: Send + Sync {
    async fn save_summary(&self, document_id: DocumentId, summary: &str) -> anyhow::Result<i64>;

    async fn save_key_points(
        &self,
        document_id: DocumentId,
        points: &[String],
    ) -> anyhow::Result<i64>;

    async fn save_key_terms(
        &self,
        document_id: DocumentId,
        terms: &[KeyTerm],
    ) -> anyhow::Result<i64>;

    async fn save_quiz(
        &self,
        document_id: DocumentId,
        config: &QuizConfig,
        questions: &[QuizQuestion],
    ) -> anyhow::Result<i64>;
}

/// Parse the final text of a text operation and store it.
pub async fn persist_text_result(
    store: &dyn ResultStore,
    document_id: DocumentId,
    operation: OperationType,
    text: &str,
) -> GenerationResult<i64> {
    let saved = match operation {
        OperationType::Summary => {
            let summary = text.trim();
            if summary.is_empty() {
                return Err(GenerationError::InvalidContent(
                    "Model returned an empty summary".to_string(),
                ));
            }
            store.save_summary(document_id, summary).await
        }
        OperationType::KeyPoints => {
            let points = parse_key_points(text);
            if points.is_empty() {
                return Err(GenerationError::InvalidContent(
                    "Model returned no key points".to_string(),
                ));
            }
            store.save_key_points(document_id, &points).await
        }
        OperationType::KeyTerms => {
            let terms = parse_key_terms(text);
            if terms.is_empty() {
                return Err(GenerationError::InvalidContent(
                    "Model returned no key terms".to_string(),
                ));
            }
            store.save_key_terms(document_id, &terms).await
        }
        OperationType::Quiz => {
            return Err(GenerationError::InvalidContent(
                "Quiz results must be validated before saving".to_string(),
            ))
        }
    };

    saved.map_err(|e| GenerationError::Persist(e.to_string()))
}

/// Pull list items out of model output.
///
/// Accepts `-`, `*`, `•` bullets and `1.` / `1)` numbering. If the output has
/// no list markers at all, each non-empty line is taken as a point.
pub fn parse_key_points(text: &str) -> Vec<String> {
    let lines: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();

    let items: Vec<String> = lines
        .iter()
        .filter_map(|line| strip_list_marker(line))
        .map(|item| strip_emphasis(item).to_string())
        .filter(|item| !item.is_empty())
        .collect();

    if !items.is_empty() {
        return items;
    }

    lines
        .into_iter()
        .filter(|l| !l.ends_with(':'))
        .map(|l| strip_emphasis(l).to_string())
        .filter(|l| !l.is_empty())
        .collect()
}

/// Pull `term: definition` pairs out of model output.
///
/// Also accepts `term - definition` and `term — definition`. Lines without a
/// separator are skipped.
pub fn parse_key_terms(text: &str) -> Vec<KeyTerm> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .filter_map(|line| {
            let line = strip_list_marker(line).unwrap_or(line);
            let (term, definition) = split_term(line)?;
            let term = strip_emphasis(term.trim()).trim().to_string();
            let definition = strip_emphasis(definition.trim()).trim().to_string();
            if term.is_empty() || definition.is_empty() {
                return None;
            }
            Some(KeyTerm { term, definition })
        })
        .collect()
}

fn split_term(line: &str) -> Option<(&str, &str)> {
    // A colon wins; it may sit inside bold markers ("**Term:** def").
    if let Some(idx) = line.find(':') {
        let (term, rest) = line.split_at(idx);
        let rest = rest[1..].trim_start_matches('*');
        return Some((term, rest));
    }
    for sep in [" — ", " – ", " - "] {
        if let Some(idx) = line.find(sep) {
            return Some((&line[..idx], &line[idx + sep.len()..]));
        }
    }
    None
}

fn strip_list_marker(line: &str) -> Option<&str> {
    for bullet in ["- ", "* ", "• "] {
        if let Some(rest) = line.strip_prefix(bullet) {
            return Some(rest.trim());
        }
    }

    let digits = line.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits > 0 {
        let rest = &line[digits..];
        if let Some(rest) = rest.strip_prefix(". ").or_else(|| rest.strip_prefix(") ")) {
            return Some(rest.trim());
        }
    }
    None
}

fn strip_emphasis(text: &str) -> &str {
    text.trim_matches(|c| c == '*' || c == '_').trim()
}
