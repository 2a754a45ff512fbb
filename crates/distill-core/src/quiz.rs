//! Quiz generation with output validation.
//!
//! Quiz output is machine-read, so every attempt is checked in two stages:
//!
//! 1. Structure: the text must hold a JSON array of candidate items, possibly
//!    inside a markdown code fence or a `{"questions": [...]}` wrapper.
//! 2. Semantics: each item is checked against the rules for its type and
//!    dropped on its own if it fails.
//!
//! An attempt is accepted when at least one item survives. Otherwise the model
//! is asked again with a retry prompt that names the failure, up to
//! `max_retries` extra attempts. Transport failures are not retried here; the
//! client already applied its own policy before they reach this loop.

use std::future::Future;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{GenerationError, GenerationResult};
use crate::events::{finish_job, DocumentId, EventSink, JobOutcome, OperationType, StreamEvent};
use crate::llm::{generate_text, ModelConfig, TextGenerator};
use crate::prompts::{quiz_prompt, quiz_retry_prompt};

/// Minimum number of options for a multiple-choice item
const MIN_CHOICES: usize = 4;

// ============================================================================
// Configuration and item types
// ============================================================================

/// What the caller asked for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QuizConfig {
    pub question_count: u32,
    /// Comma-separated list, e.g. `"multiple_choice,true_false"`
    pub question_types: String,
    pub difficulty: String,
}

impl Default for QuizConfig {
    fn default() -> Self {
        Self {
            question_count: 5,
            question_types: "multiple_choice,true_false,short_answer".to_string(),
            difficulty: "medium".to_string(),
        }
    }
}

impl QuizConfig {
    pub fn new(question_count: u32, question_types: &str, difficulty: &str) -> Self {
        Self {
            question_count,
            question_types: question_types.to_string(),
            difficulty: difficulty.to_string(),
        }
    }

    /// Question types the caller accepts.
    ///
    /// Unknown names are ignored. An empty or entirely unknown list allows
    /// every type.
    pub fn allowed_types(&self) -> Vec<QuestionType> {
        let mut types: Vec<QuestionType> = self
            .question_types
            .split(',')
            .filter_map(|name| name.parse().ok())
            .collect();
        types.dedup();

        if types.is_empty() {
            QuestionType::ALL.to_vec()
        } else {
            types
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    MultipleChoice,
    TrueFalse,
    ShortAnswer,
}

impl QuestionType {
    pub const ALL: [QuestionType; 3] = [
        QuestionType::MultipleChoice,
        QuestionType::TrueFalse,
        QuestionType::ShortAnswer,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionType::MultipleChoice => "multiple_choice",
            QuestionType::TrueFalse => "true_false",
            QuestionType::ShortAnswer => "short_answer",
        }
    }
}

impl FromStr for QuestionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "multiple_choice" | "mcq" => Ok(QuestionType::MultipleChoice),
            "true_false" | "truefalse" | "boolean" => Ok(QuestionType::TrueFalse),
            "short_answer" | "short" => Ok(QuestionType::ShortAnswer),
            other => Err(format!("Unknown question type: {}", other)),
        }
    }
}

/// A validated quiz item, ready to persist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizQuestion {
    #[serde(rename = "type")]
    pub question_type: QuestionType,
    pub question: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
    pub correct_answer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

/// A candidate item as the model wrote it.
#[derive(Debug, Deserialize)]
struct RawQuestion {
    #[serde(rename = "type", alias = "question_type", alias = "questionType")]
    question_type: String,
    question: String,
    #[serde(default)]
    options: Vec<String>,
    #[serde(default, alias = "correctAnswer", alias = "answer")]
    correct_answer: Value,
    #[serde(default)]
    explanation: Option<String>,
}

// ============================================================================
// Validation
// ============================================================================

/// Structural stage: extract candidate items from raw model output.
pub fn parse_candidates(text: &str) -> Result<Vec<Value>, String> {
    let body = strip_code_fence(text);

    let parsed = serde_json::from_str::<Value>(body)
        .ok()
        .or_else(|| slice_between(body, '[', ']').and_then(|s| serde_json::from_str(s).ok()))
        .or_else(|| slice_between(body, '{', '}').and_then(|s| serde_json::from_str(s).ok()));

    let items = match parsed {
        Some(Value::Array(items)) => items,
        Some(Value::Object(mut map)) => match map.remove("questions") {
            Some(Value::Array(items)) => items,
            _ => return Err("Response object has no \"questions\" array".to_string()),
        },
        _ => return Err("Response was not a JSON array of questions".to_string()),
    };

    if items.is_empty() {
        return Err("Response contained no questions".to_string());
    }
    Ok(items)
}

fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string ("json") on the opening fence line.
    let rest = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => rest,
    };
    rest.trim_end().trim_end_matches("```").trim()
}

fn slice_between(text: &str, open: char, close: char) -> Option<&str> {
    let start = text.find(open)?;
    let end = text.rfind(close)?;
    (end > start).then(|| &text[start..=end])
}

/// Semantic stage for one candidate item.
pub fn validate_question(
    candidate: Value,
    allowed: &[QuestionType],
) -> Result<QuizQuestion, String> {
    let raw: RawQuestion =
        serde_json::from_value(candidate).map_err(|e| format!("Malformed question: {}", e))?;

    let question_type: QuestionType = raw.question_type.parse()?;
    if !allowed.contains(&question_type) {
        return Err(format!("Question type {} was not requested", question_type.as_str()));
    }

    let question = raw.question.trim().to_string();
    if question.is_empty() {
        return Err("Question text is empty".to_string());
    }

    let answer = match &raw.correct_answer {
        Value::String(s) => s.trim().to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        _ => return Err("Question has no correct answer".to_string()),
    };

    let (options, correct_answer) = match question_type {
        QuestionType::MultipleChoice => {
            let options: Vec<String> = raw
                .options
                .iter()
                .map(|o| o.trim().to_string())
                .filter(|o| !o.is_empty())
                .collect();
            if options.len() < MIN_CHOICES {
                return Err(format!(
                    "Multiple choice question has {} options, needs at least {}",
                    options.len(),
                    MIN_CHOICES
                ));
            }
            if !options.contains(&answer) {
                return Err(format!("Correct answer {:?} is not one of the options", answer));
            }
            (options, answer)
        }
        QuestionType::TrueFalse => {
            let canonical = match answer.to_ascii_lowercase().as_str() {
                "true" => "True",
                "false" => "False",
                _ => return Err(format!("True/false answer {:?} is not true or false", answer)),
            };
            (
                vec!["True".to_string(), "False".to_string()],
                canonical.to_string(),
            )
        }
        QuestionType::ShortAnswer => {
            if answer.is_empty() {
                return Err("Short answer is empty".to_string());
            }
            (Vec::new(), answer)
        }
    };

    let explanation = raw
        .explanation
        .map(|e| e.trim().to_string())
        .filter(|e| !e.is_empty());

    Ok(QuizQuestion {
        question_type,
        question,
        options,
        correct_answer,
        explanation,
    })
}

/// Run both validation stages over a complete response.
///
/// Returns the surviving items, at most `question_count` of them, or the
/// reason the whole response was rejected.
pub fn validate_response(text: &str, config: &QuizConfig) -> Result<Vec<QuizQuestion>, String> {
    let candidates = parse_candidates(text)?;
    let total = candidates.len();
    let allowed = config.allowed_types();

    let mut questions: Vec<QuizQuestion> = candidates
        .into_iter()
        .enumerate()
        .filter_map(|(index, candidate)| match validate_question(candidate, &allowed) {
            Ok(question) => Some(question),
            Err(reason) => {
                tracing::debug!(index, reason = %reason, "Dropped quiz item");
                None
            }
        })
        .collect();

    if questions.is_empty() {
        return Err(format!("None of the {} questions passed validation", total));
    }

    if config.question_count > 0 {
        questions.truncate(config.question_count as usize);
    }
    Ok(questions)
}

// ============================================================================
// Retry loop
// ============================================================================

/// State carried between quiz attempts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryableJob {
    pub prompt: String,
    /// Zero-based attempt number
    pub attempt: u32,
    pub last_failure: Option<String>,
}

impl RetryableJob {
    pub fn new(prompt: String) -> Self {
        Self {
            prompt,
            attempt: 0,
            last_failure: None,
        }
    }

    /// Move to the next attempt with an amended prompt.
    pub fn retry_with(&mut self, prompt: String, reason: String) {
        self.prompt = prompt;
        self.attempt += 1;
        self.last_failure = Some(reason);
    }
}

/// Generate, validate and persist a quiz, ending in exactly one terminal event.
///
/// `persist` is only called with validated questions.
#[allow(clippy::too_many_arguments)]
pub async fn run_quiz<P, Fut>(
    generator: &dyn TextGenerator,
    model: &ModelConfig,
    max_retries: u32,
    document_id: DocumentId,
    text: &str,
    config: &QuizConfig,
    sink: &dyn EventSink,
    persist: P,
) -> JobOutcome
where
    P: FnOnce(Vec<QuizQuestion>) -> Fut,
    Fut: Future<Output = GenerationResult<i64>>,
{
    let generated =
        generate_valid_quiz(generator, model, max_retries, document_id, text, config, sink).await;

    let result = match generated {
        Ok(questions) => persist(questions).await,
        Err(e) => Err(e),
    };

    finish_job(sink, document_id, OperationType::Quiz, result)
}

async fn generate_valid_quiz(
    generator: &dyn TextGenerator,
    model: &ModelConfig,
    max_retries: u32,
    document_id: DocumentId,
    text: &str,
    config: &QuizConfig,
    sink: &dyn EventSink,
) -> GenerationResult<Vec<QuizQuestion>> {
    let mut job = RetryableJob::new(quiz_prompt(config, text));

    loop {
        let output = generate_text(generator, model.request(job.prompt.clone()), |increment| {
            sink.emit(StreamEvent::increment(document_id, OperationType::Quiz, increment));
        })
        .await?;

        match validate_response(&output, config) {
            Ok(questions) => {
                tracing::info!(
                    document_id,
                    attempt = job.attempt,
                    questions = questions.len(),
                    "Quiz output validated"
                );
                return Ok(questions);
            }
            Err(reason) => {
                tracing::warn!(
                    document_id,
                    attempt = job.attempt,
                    max_retries,
                    reason = %reason,
                    "Quiz output failed validation"
                );

                if job.attempt >= max_retries {
                    return Err(GenerationError::RetriesExhausted {
                        attempts: job.attempt + 1,
                        reason,
                    });
                }

                let prompt = quiz_retry_prompt(config, text, &reason);
                job.retry_with(prompt, reason);
            }
        }
    }
}
