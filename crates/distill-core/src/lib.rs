//! Distill Core - AI generation pipeline for long documents
//!
//! This crate turns document text into summaries, key points, key terms and
//! quizzes using a locally hosted streaming model server:
//! - Streaming generation client with transport retries (reqwest)
//! - Boundary-aware text chunking and map-reduce orchestration
//! - Quiz output validation with a bounded retry loop
//! - Sequential parsing queue with crash recovery
//!
//! Storage and document parsing are supplied by the host through the
//! [`ResultStore`] and [`DocumentProcessor`] traits.

pub mod chunker;
pub mod config;
pub mod error;
pub mod events;
pub mod llm;
pub mod orchestrator;
pub mod prompts;
pub mod queue;
pub mod quiz;
pub mod results;
pub mod service;

#[cfg(test)]
mod test_support;

pub use chunker::{Chunk, TextChunker};
pub use config::GenerationSettings;
pub use error::{GenerationError, GenerationResult};
pub use events::{DocumentId, EventSink, JobOutcome, NoOpSink, OperationType, StreamEvent};
pub use llm::{GenerationRequest, ModelConfig, OllamaClient, TextGenerator};
pub use queue::{
    recover_interrupted, DocumentProcessor, InMemoryStatusStore, ParseQueue, ParseStatus,
    ParseStatusStore,
};
pub use quiz::{QuestionType, QuizConfig, QuizQuestion};
pub use results::{KeyTerm, ResultStore};
pub use service::{GenerationJob, GenerationService, JobTicket};
