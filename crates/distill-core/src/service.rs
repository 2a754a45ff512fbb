//! Fire-and-forget job submission.
//!
//! The host submits a [`GenerationJob`] and gets a [`JobTicket`] back at once.
//! The job runs on the tokio runtime and reports through the caller's
//! [`EventSink`]; its last event is always terminal, including when the
//! service is shut down mid-job.

use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::chunker::TextChunker;
use crate::config::GenerationSettings;
use crate::error::{GenerationError, GenerationResult};
use crate::events::{finish_job, DocumentId, EventSink, JobOutcome, OperationType};
use crate::llm::{GenerationRequest, ModelConfig, TextGenerator, TextStream};
use crate::orchestrator::{run_chunked, run_single, ChunkedJob};
use crate::prompts::{fill, prompt_set};
use crate::quiz::{run_quiz, QuizConfig};
use crate::results::{persist_text_result, ResultStore};

/// Everything needed to run one job.
#[derive(Debug, Clone)]
pub struct GenerationJob {
    pub document_id: DocumentId,
    pub operation: OperationType,
    /// Full source text of the document
    pub text: String,
    pub model: ModelConfig,
    /// Only read for quiz jobs; defaults apply when absent
    pub quiz: Option<QuizConfig>,
}

impl GenerationJob {
    pub fn new(
        document_id: DocumentId,
        operation: OperationType,
        text: impl Into<String>,
        model: ModelConfig,
    ) -> Self {
        Self {
            document_id,
            operation,
            text: text.into(),
            model,
            quiz: None,
        }
    }

    pub fn with_quiz(mut self, config: QuizConfig) -> Self {
        self.quiz = Some(config);
        self
    }

    /// Reject jobs that cannot run before anything is spawned.
    fn validate(&self) -> GenerationResult<()> {
        if self.text.trim().is_empty() {
            return Err(GenerationError::NoSourceText);
        }
        Ok(())
    }
}

/// Handle returned when a job is accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobTicket {
    pub job_id: Uuid,
    pub document_id: DocumentId,
    pub operation: OperationType,
}

/// Runs generation jobs against one model backend and one result store.
#[derive(Clone)]
pub struct GenerationService {
    generator: Arc<dyn TextGenerator>,
    store: Arc<dyn ResultStore>,
    settings: Arc<GenerationSettings>,
    cancel: CancellationToken,
}

impl GenerationService {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        store: Arc<dyn ResultStore>,
        settings: GenerationSettings,
    ) -> Self {
        Self {
            generator,
            store,
            settings: Arc::new(settings),
            cancel: CancellationToken::new(),
        }
    }

    pub fn settings(&self) -> &GenerationSettings {
        &self.settings
    }

    /// Start a job in the background.
    ///
    /// Fails synchronously, without emitting events, if the job has no source
    /// text or the service has been shut down.
    pub fn submit(
        &self,
        job: GenerationJob,
        sink: Arc<dyn EventSink>,
    ) -> GenerationResult<JobTicket> {
        job.validate()?;
        if self.cancel.is_cancelled() {
            return Err(GenerationError::Cancelled);
        }

        let ticket = JobTicket {
            job_id: Uuid::new_v4(),
            document_id: job.document_id,
            operation: job.operation,
        };

        tracing::info!(
            job_id = %ticket.job_id,
            document_id = ticket.document_id,
            operation = %ticket.operation,
            chars = job.text.chars().count(),
            "Generation job submitted"
        );

        let service = self.clone();
        tokio::spawn(async move {
            service.execute(job, sink.as_ref()).await;
        });

        Ok(ticket)
    }

    /// Run a job on the current task and wait for it.
    pub async fn run(&self, job: GenerationJob, sink: &dyn EventSink) -> JobOutcome {
        if let Err(e) = job.validate() {
            return finish_job(sink, job.document_id, job.operation, Err(e));
        }
        self.execute(job, sink).await
    }

    /// Cancel every running job. Later submissions are rejected.
    pub fn shutdown(&self) {
        tracing::info!("Shutting down generation service");
        self.cancel.cancel();
    }

    pub fn is_shut_down(&self) -> bool {
        self.cancel.is_cancelled()
    }

    async fn execute(&self, job: GenerationJob, sink: &dyn EventSink) -> JobOutcome {
        let GenerationJob {
            document_id,
            operation,
            text,
            model,
            quiz,
        } = job;

        let cancellable = Cancellable {
            inner: self.generator.as_ref(),
            cancel: self.cancel.clone(),
        };
        let generator: &dyn TextGenerator = &cancellable;
        let store = self.store.as_ref();

        let Some(prompts) = prompt_set(operation) else {
            // Quiz output is validated as a whole, so it always runs single-pass.
            let config = quiz.unwrap_or_default();
            let config_ref = &config;
            return run_quiz(
                generator,
                &model,
                self.settings.quiz_max_retries,
                document_id,
                &text,
                config_ref,
                sink,
                |questions| async move {
                    store
                        .save_quiz(document_id, config_ref, &questions)
                        .await
                        .map_err(|e| GenerationError::Persist(e.to_string()))
                },
            )
            .await;
        };

        let persist = |output: String| async move {
            persist_text_result(store, document_id, operation, &output).await
        };

        let chunker = TextChunker::from_settings(&self.settings);
        if chunker.needs_chunking(&text) {
            let chunks = chunker.split(&text);
            tracing::info!(
                document_id,
                operation = %operation,
                chunks = chunks.len(),
                "Splitting long document"
            );
            let job = ChunkedJob::new(document_id, operation, chunks, prompts);
            run_chunked(generator, &model, job, sink, persist).await
        } else {
            let prompt = fill(prompts.single, &[("text", text.as_str())]);
            run_single(generator, &model, document_id, operation, prompt, sink, persist).await
        }
    }
}

/// Ends a generation call with [`GenerationError::Cancelled`] once the
/// service shuts down.
///
/// Only model calls are cut short. A result that is already being saved is
/// saved and reported as completed.
struct Cancellable<'a> {
    inner: &'a dyn TextGenerator,
    cancel: CancellationToken,
}

#[async_trait]
impl TextGenerator for Cancellable<'_> {
    async fn generate(&self, request: GenerationRequest) -> GenerationResult<TextStream> {
        let stream = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(GenerationError::Cancelled),
            opened = self.inner.generate(request) => opened?,
        };

        let cancel = self.cancel.clone();
        Ok(futures::stream::unfold(
            Some((stream, cancel)),
            |state| async move {
                let (mut stream, cancel) = state?;
                let next = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => None,
                    item = stream.next() => Some(item),
                };
                match next {
                    None => Some((Err(GenerationError::Cancelled), None)),
                    Some(item) => item.map(|item| (item, Some((stream, cancel)))),
                }
            },
        )
        .boxed())
    }
}
