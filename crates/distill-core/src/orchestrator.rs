//! Running text operations against the model.
//!
//! Short documents go through [`run_single`]: one call, then persist. Long
//! documents go through [`run_chunked`], a sequential map-reduce:
//!
//! ```text
//! chunk 0 ──► call ──┐
//! chunk 1 ──► call ──┤
//!   ...              ├──► combine call ──► persist ──► terminal event
//! chunk N-1 ─► call ─┘
//! ```
//!
//! Chunks are processed strictly in order. Any failure skips the remaining
//! work, discards all chunk results and ends the job with an error event.

use std::future::Future;

use crate::chunker::Chunk;
use crate::error::{GenerationError, GenerationResult};
use crate::events::{finish_job, DocumentId, EventSink, JobOutcome, OperationType, StreamEvent};
use crate::llm::{generate_text, ModelConfig, TextGenerator};
use crate::prompts::{fill, label_chunks, PromptSet};

/// A long document prepared for map-reduce generation.
///
/// Consumed by [`run_chunked`].
#[derive(Debug, Clone)]
pub struct ChunkedJob {
    pub document_id: DocumentId,
    pub operation: OperationType,
    pub chunks: Vec<Chunk>,
    /// Prompt for one chunk; `{text}` is replaced by the chunk
    pub per_chunk_template: String,
    /// Prompt for the reduce call; `{chunks}` is replaced by the labelled chunk outputs
    pub combine_template: String,
}

impl ChunkedJob {
    pub fn new(
        document_id: DocumentId,
        operation: OperationType,
        chunks: Vec<Chunk>,
        prompts: PromptSet,
    ) -> Self {
        Self {
            document_id,
            operation,
            chunks,
            per_chunk_template: prompts.per_chunk.to_string(),
            combine_template: prompts.combine.to_string(),
        }
    }
}

/// Run a chunked job to its terminal event.
///
/// `persist` receives the combined text and is only called if every chunk and
/// the combine call succeeded.
pub async fn run_chunked<P, Fut>(
    generator: &dyn TextGenerator,
    model: &ModelConfig,
    job: ChunkedJob,
    sink: &dyn EventSink,
    persist: P,
) -> JobOutcome
where
    P: FnOnce(String) -> Fut,
    Fut: Future<Output = GenerationResult<i64>>,
{
    let document_id = job.document_id;
    let operation = job.operation;

    let result = match map_reduce(generator, model, job, sink).await {
        Ok(combined) => persist(combined).await,
        Err(e) => Err(e),
    };

    finish_job(sink, document_id, operation, result)
}

async fn map_reduce(
    generator: &dyn TextGenerator,
    model: &ModelConfig,
    job: ChunkedJob,
    sink: &dyn EventSink,
) -> GenerationResult<String> {
    let ChunkedJob {
        document_id,
        operation,
        chunks,
        per_chunk_template,
        combine_template,
    } = job;

    if chunks.is_empty() {
        return Err(GenerationError::NoSourceText);
    }

    let total = chunks.len();
    let mut results = Vec::with_capacity(total);

    for (index, chunk) in chunks.iter().enumerate() {
        tracing::debug!(
            document_id,
            operation = %operation,
            chunk_index = index,
            total_chunks = total,
            "Generating chunk"
        );

        let prompt = fill(&per_chunk_template, &[("text", chunk.text.as_str())]);
        let text = generate_text(generator, model.request(prompt), |increment| {
            sink.emit(StreamEvent::increment(document_id, operation, increment).at_chunk(index, total));
        })
        .await?;

        results.push(text);
    }

    tracing::debug!(
        document_id,
        operation = %operation,
        total_chunks = total,
        "Combining chunk results"
    );

    let labelled = label_chunks(&results);
    let prompt = fill(&combine_template, &[("chunks", labelled.as_str())]);
    generate_text(generator, model.request(prompt), |increment| {
        sink.emit(StreamEvent::increment(document_id, operation, increment).at_chunk(total, total));
    })
    .await
}

/// Run a single-call job to its terminal event.
pub async fn run_single<P, Fut>(
    generator: &dyn TextGenerator,
    model: &ModelConfig,
    document_id: DocumentId,
    operation: OperationType,
    prompt: String,
    sink: &dyn EventSink,
    persist: P,
) -> JobOutcome
where
    P: FnOnce(String) -> Fut,
    Fut: Future<Output = GenerationResult<i64>>,
{
    let generated = generate_text(generator, model.request(prompt), |increment| {
        sink.emit(StreamEvent::increment(document_id, operation, increment));
    })
    .await;

    let result = match generated {
        Ok(text) => persist(text).await,
        Err(e) => Err(e),
    };

    finish_job(sink, document_id, operation, result)
}
