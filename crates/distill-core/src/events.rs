//! Progress events emitted to the external observer.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::error::{GenerationError, GenerationResult};

/// Identifier the host application uses for a document.
pub type DocumentId = i64;

/// Kind of artifact a generation job produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationType {
    Summary,
    KeyPoints,
    KeyTerms,
    Quiz,
}

impl OperationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationType::Summary => "summary",
            OperationType::KeyPoints => "key_points",
            OperationType::KeyTerms => "key_terms",
            OperationType::Quiz => "quiz",
        }
    }
}

impl std::fmt::Display for OperationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OperationType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "summary" => Ok(OperationType::Summary),
            "key_points" => Ok(OperationType::KeyPoints),
            "key_terms" => Ok(OperationType::KeyTerms),
            "quiz" => Ok(OperationType::Quiz),
            other => Err(format!("Unknown operation type: {}", other)),
        }
    }
}

/// The single notification type for every generation job.
///
/// Exactly one event per job has `done == true` and it is always the last.
/// `error` is only set on that terminal event. `chunk_index == total_chunks`
/// marks the combining phase of a chunked job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamEvent {
    pub document_id: DocumentId,
    pub operation_type: OperationType,
    pub chunk: String,
    pub done: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk_index: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_chunks: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_id: Option<i64>,
}

impl StreamEvent {
    /// A text increment.
    pub fn increment(document_id: DocumentId, operation: OperationType, text: &str) -> Self {
        Self {
            document_id,
            operation_type: operation,
            chunk: text.to_string(),
            done: false,
            chunk_index: None,
            total_chunks: None,
            error: None,
            result_id: None,
        }
    }

    /// Attach chunk progress to an increment.
    pub fn at_chunk(mut self, chunk_index: usize, total_chunks: usize) -> Self {
        self.chunk_index = Some(chunk_index);
        self.total_chunks = Some(total_chunks);
        self
    }

    /// Terminal event for a successful job.
    pub fn completed(
        document_id: DocumentId,
        operation: OperationType,
        result_id: Option<i64>,
    ) -> Self {
        Self {
            done: true,
            result_id,
            ..Self::increment(document_id, operation, "")
        }
    }

    /// Terminal event for a failed job.
    pub fn failed(document_id: DocumentId, operation: OperationType, error: &str) -> Self {
        let error = if error.trim().is_empty() {
            "Generation failed".to_string()
        } else {
            error.to_string()
        };
        Self {
            done: true,
            error: Some(error),
            ..Self::increment(document_id, operation, "")
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.done
    }
}

/// Receiver of job events.
///
/// Implementations must not block; events are emitted from inside the job task.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: StreamEvent);
}

impl EventSink for mpsc::UnboundedSender<StreamEvent> {
    fn emit(&self, event: StreamEvent) {
        if self.send(event).is_err() {
            tracing::debug!("Event receiver dropped");
        }
    }
}

/// Increments are dropped when the channel is full. A terminal event is
/// delivered from a spawned task instead, after everything already queued.
impl EventSink for mpsc::Sender<StreamEvent> {
    fn emit(&self, event: StreamEvent) {
        match self.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) if event.is_terminal() => {
                let Ok(runtime) = tokio::runtime::Handle::try_current() else {
                    tracing::warn!("No runtime to deliver terminal event");
                    return;
                };
                let tx = self.clone();
                runtime.spawn(async move {
                    if tx.send(event).await.is_err() {
                        tracing::debug!("Event receiver dropped");
                    }
                });
            }
            Err(TrySendError::Full(_)) => {
                tracing::warn!("Event channel full, dropped increment");
            }
            Err(TrySendError::Closed(_)) => {
                tracing::debug!("Event receiver dropped");
            }
        }
    }
}

/// How a job ended
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Completed { result_id: i64 },
    Failed(GenerationError),
}

impl JobOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, JobOutcome::Completed { .. })
    }
}

/// Emit the terminal event for a job and convert the result to an outcome.
///
/// Every job path ends here, so each job gets exactly one terminal event.
pub fn finish_job(
    sink: &dyn EventSink,
    document_id: DocumentId,
    operation: OperationType,
    result: GenerationResult<i64>,
) -> JobOutcome {
    match result {
        Ok(result_id) => {
            tracing::info!(
                document_id,
                operation = %operation,
                result_id,
                "Generation job completed"
            );
            sink.emit(StreamEvent::completed(document_id, operation, Some(result_id)));
            JobOutcome::Completed { result_id }
        }
        Err(e) => {
            tracing::error!(
                document_id,
                operation = %operation,
                code = e.code(),
                error = %e,
                "Generation job failed"
            );
            sink.emit(StreamEvent::failed(document_id, operation, &e.to_string()));
            JobOutcome::Failed(e)
        }
    }
}

/// No-op sink for callers that only care about the outcome
pub struct NoOpSink;

impl EventSink for NoOpSink {
    fn emit(&self, _event: StreamEvent) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serializes_camel_case_without_empty_options() {
        let event = StreamEvent::increment(7, OperationType::KeyPoints, "abc").at_chunk(1, 3);
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["documentId"], 7);
        assert_eq!(json["operationType"], "key_points");
        assert_eq!(json["chunkIndex"], 1);
        assert_eq!(json["totalChunks"], 3);
        assert!(json.get("error").is_none());
        assert!(json.get("resultId").is_none());
    }

    #[test]
    fn test_failed_event_uses_fallback_message() {
        let event = StreamEvent::failed(1, OperationType::Summary, "");
        assert!(event.done);
        assert_eq!(event.error.as_deref(), Some("Generation failed"));
    }

    #[tokio::test]
    async fn test_bounded_sink_keeps_terminal_event_when_full() {
        let (tx, mut rx) = mpsc::channel::<StreamEvent>(1);
        tx.emit(StreamEvent::increment(3, OperationType::Summary, "first"));
        tx.emit(StreamEvent::increment(3, OperationType::Summary, "second"));
        let outcome = finish_job(&tx, 3, OperationType::Summary, Ok(5));
        assert!(outcome.is_completed());

        let first = rx.recv().await.unwrap();
        assert_eq!(first.chunk, "first");
        assert!(!first.done);

        let last = rx.recv().await.unwrap();
        assert!(last.done);
        assert_eq!(last.result_id, Some(5));
    }

    #[test]
    fn test_operation_type_parse() {
        assert_eq!("key-terms".parse::<OperationType>(), Ok(OperationType::KeyTerms));
        assert_eq!("QUIZ".parse::<OperationType>(), Ok(OperationType::Quiz));
        assert!("outline".parse::<OperationType>().is_err());
    }

    #[test]
    fn test_finish_job_emits_one_terminal_event() {
        let (tx, mut rx) = mpsc::unbounded_channel();

        let outcome = finish_job(&tx, 4, OperationType::Summary, Err(GenerationError::NoSourceText));

        assert_eq!(outcome, JobOutcome::Failed(GenerationError::NoSourceText));
        let event = rx.try_recv().unwrap();
        assert!(event.done);
        assert_eq!(
            event.error.as_deref(),
            Some("No source text available for this document")
        );
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unbounded_sender_sink() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        tx.emit(StreamEvent::completed(3, OperationType::Quiz, Some(11)));

        let event = rx.recv().await.unwrap();
        assert!(event.is_terminal());
        assert_eq!(event.result_id, Some(11));
    }
}
