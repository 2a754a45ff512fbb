//! Shared test doubles.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use futures::StreamExt;

use crate::error::{GenerationError, GenerationResult};
use crate::events::{DocumentId, EventSink, StreamEvent};
use crate::llm::{GenerationRequest, TextGenerator, TextStream};
use crate::quiz::{QuizConfig, QuizQuestion};
use crate::results::{KeyTerm, ResultStore};

/// Scripted outcome of one generation call.
#[derive(Debug, Clone)]
pub enum Step {
    /// Stream these increments, then finish cleanly
    Text(Vec<String>),
    /// Fail before any text arrives
    Fail(GenerationError),
    /// Stream these increments, then fail
    Partial(Vec<String>, GenerationError),
}

impl Step {
    pub fn text(parts: &[&str]) -> Self {
        Step::Text(parts.iter().map(|s| s.to_string()).collect())
    }
}

/// Generator that replays a script, one step per call.
///
/// The last step repeats once the script runs out.
pub struct ScriptedGenerator {
    steps: Mutex<VecDeque<Step>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            steps: Mutex::new(steps.into()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(&self, request: GenerationRequest) -> GenerationResult<TextStream> {
        self.prompts.lock().unwrap().push(request.prompt);

        let step = {
            let mut steps = self.steps.lock().unwrap();
            if steps.len() > 1 {
                steps.pop_front().unwrap()
            } else {
                steps.front().cloned().expect("script is empty")
            }
        };

        match step {
            Step::Text(parts) => Ok(futures::stream::iter(parts.into_iter().map(Ok)).boxed()),
            Step::Fail(e) => Err(e),
            Step::Partial(parts, e) => Ok(futures::stream::iter(
                parts.into_iter().map(Ok).chain(std::iter::once(Err(e))),
            )
            .boxed()),
        }
    }
}

/// Sink that keeps every event.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<StreamEvent>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<StreamEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn terminal_events(&self) -> Vec<StreamEvent> {
        self.events().into_iter().filter(|e| e.done).collect()
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: StreamEvent) {
        self.events.lock().unwrap().push(event);
    }
}

/// Generator whose stream never produces anything.
pub struct StalledGenerator;

#[async_trait]
impl TextGenerator for StalledGenerator {
    async fn generate(&self, _request: GenerationRequest) -> GenerationResult<TextStream> {
        Ok(futures::stream::pending::<GenerationResult<String>>().boxed())
    }
}

/// A record written to [`MemoryStore`].
#[derive(Debug, Clone, PartialEq)]
pub enum Saved {
    Summary(String),
    KeyPoints(Vec<String>),
    KeyTerms(Vec<KeyTerm>),
    Quiz(Vec<QuizQuestion>),
}

/// Result store that keeps records in memory. Ids start at 1.
#[derive(Default)]
pub struct MemoryStore {
    saved: Mutex<Vec<(DocumentId, Saved)>>,
}

impl MemoryStore {
    pub fn saved(&self) -> Vec<(DocumentId, Saved)> {
        self.saved.lock().unwrap().clone()
    }

    fn push(&self, document_id: DocumentId, record: Saved) -> i64 {
        let mut saved = self.saved.lock().unwrap();
        saved.push((document_id, record));
        saved.len() as i64
    }
}

#[async_trait]
impl ResultStore for MemoryStore {
    async fn save_summary(&self, document_id: DocumentId, summary: &str) -> anyhow::Result<i64> {
        Ok(self.push(document_id, Saved::Summary(summary.to_string())))
    }

    async fn save_key_points(
        &self,
        document_id: DocumentId,
        points: &[String],
    ) -> anyhow::Result<i64> {
        Ok(self.push(document_id, Saved::KeyPoints(points.to_vec())))
    }

    async fn save_key_terms(
        &self,
        document_id: DocumentId,
        terms: &[KeyTerm],
    ) -> anyhow::Result<i64> {
        Ok(self.push(document_id, Saved::KeyTerms(terms.to_vec())))
    }

    async fn save_quiz(
        &self,
        document_id: DocumentId,
        _config: &QuizConfig,
        questions: &[QuizQuestion],
    ) -> anyhow::Result<i64> {
        Ok(self.push(document_id, Saved::Quiz(questions.to_vec())))
    }
}
