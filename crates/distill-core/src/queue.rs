//! Sequential parsing queue.
//!
//! Text extraction (PDF parsing, OCR) is expensive and contends for local
//! resources, so documents are parsed one at a time in enqueue order. A single
//! drain loop runs while the queue is non-empty; enqueueing while it runs only
//! appends.
//!
//! Each document is processed on its own task so a panic fails that document
//! alone. Failures are recorded and the loop moves on.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, Notify, RwLock};

use crate::events::DocumentId;

/// Parse state of a document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum ParseStatus {
    /// Waiting in the queue
    Pending,
    /// Being parsed now
    InProgress,
    /// Text extracted
    Completed,
    /// Parsing failed
    Failed { error: String },
}

/// Extracts text for one document.
#[async_trait]
pub trait DocumentProcessor: Send + Sync {
    async fn process(&self, document_id: DocumentId) -> anyhow::Result<()>;
}

/// Durable record of parse states, used to recover after a crash.
#[async_trait]
pub trait ParseStatusStore: Send + Sync {
    async fn set_status(&self, document_id: DocumentId, status: ParseStatus) -> anyhow::Result<()>;

    /// Documents currently in `status`, in ascending id order.
    async fn with_status(&self, status: &ParseStatus) -> anyhow::Result<Vec<DocumentId>>;
}

/// Status store kept in memory.
#[derive(Clone, Default)]
pub struct InMemoryStatusStore {
    statuses: Arc<RwLock<HashMap<DocumentId, ParseStatus>>>,
}

impl InMemoryStatusStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, document_id: DocumentId) -> Option<ParseStatus> {
        self.statuses.read().await.get(&document_id).cloned()
    }
}

#[async_trait]
impl ParseStatusStore for InMemoryStatusStore {
    async fn set_status(&self, document_id: DocumentId, status: ParseStatus) -> anyhow::Result<()> {
        self.statuses.write().await.insert(document_id, status);
        Ok(())
    }

    async fn with_status(&self, status: &ParseStatus) -> anyhow::Result<Vec<DocumentId>> {
        let statuses = self.statuses.read().await;
        let mut ids: Vec<DocumentId> = statuses
            .iter()
            .filter(|(_, s)| *s == status)
            .map(|(id, _)| *id)
            .collect();
        ids.sort_unstable();
        Ok(ids)
    }
}

/// Reset documents left `in_progress` by an interrupted run back to `pending`.
///
/// Returns the reset ids so the caller can enqueue them again. Running it twice
/// is harmless: the second run finds nothing to reset.
pub async fn recover_interrupted(store: &dyn ParseStatusStore) -> anyhow::Result<Vec<DocumentId>> {
    let interrupted = store.with_status(&ParseStatus::InProgress).await?;

    for &document_id in &interrupted {
        store.set_status(document_id, ParseStatus::Pending).await?;
    }

    if !interrupted.is_empty() {
        tracing::info!(count = interrupted.len(), "Recovered interrupted parse jobs");
    }
    Ok(interrupted)
}

#[derive(Default)]
struct QueueState {
    pending: VecDeque<DocumentId>,
    /// Whether a drain loop is running
    draining: bool,
}

/// FIFO queue that parses one document at a time.
#[derive(Clone)]
pub struct ParseQueue {
    state: Arc<Mutex<QueueState>>,
    idle: Arc<Notify>,
    processor: Arc<dyn DocumentProcessor>,
    statuses: Option<Arc<dyn ParseStatusStore>>,
}

impl ParseQueue {
    pub fn new(processor: Arc<dyn DocumentProcessor>) -> Self {
        Self {
            state: Arc::new(Mutex::new(QueueState::default())),
            idle: Arc::new(Notify::new()),
            processor,
            statuses: None,
        }
    }

    /// Record status changes in `store` as documents move through the queue.
    pub fn with_status_store(mut self, store: Arc<dyn ParseStatusStore>) -> Self {
        self.statuses = Some(store);
        self
    }

    /// Append a document and start the drain loop if it is not running.
    pub async fn enqueue(&self, document_id: DocumentId) {
        self.record(document_id, ParseStatus::Pending).await;

        let start_drain = {
            let mut state = self.state.lock().await;
            state.pending.push_back(document_id);
            tracing::debug!(
                document_id,
                queued = state.pending.len(),
                "Document queued for parsing"
            );
            !std::mem::replace(&mut state.draining, true)
        };

        if start_drain {
            let queue = self.clone();
            tokio::spawn(async move { queue.drain().await });
        }
    }

    /// Re-enqueue the work an interrupted run left behind: documents it was
    /// parsing first, then documents still waiting in its queue.
    ///
    /// Call once at startup, before enqueueing new documents. Does nothing
    /// without a status store.
    pub async fn resume_interrupted(&self) -> anyhow::Result<Vec<DocumentId>> {
        let Some(store) = &self.statuses else {
            return Ok(Vec::new());
        };

        let mut resumed = recover_interrupted(store.as_ref()).await?;
        let waiting = store.with_status(&ParseStatus::Pending).await?;
        for document_id in waiting {
            if !resumed.contains(&document_id) {
                resumed.push(document_id);
            }
        }

        for &document_id in &resumed {
            self.enqueue(document_id).await;
        }
        if !resumed.is_empty() {
            tracing::info!(count = resumed.len(), "Resuming unfinished parses");
        }
        Ok(resumed)
    }

    /// Wait until the queue is empty and no document is being parsed.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let state = self.state.lock().await;
                if !state.draining && state.pending.is_empty() {
                    return;
                }
            }

            notified.await;
        }
    }

    pub async fn pending_len(&self) -> usize {
        self.state.lock().await.pending.len()
    }

    pub async fn is_draining(&self) -> bool {
        self.state.lock().await.draining
    }

    async fn drain(&self) {
        loop {
            let next = {
                let mut state = self.state.lock().await;
                match state.pending.pop_front() {
                    Some(document_id) => document_id,
                    None => {
                        state.draining = false;
                        break;
                    }
                }
            };

            self.process_one(next).await;
        }

        tracing::debug!("Parse queue drained");
        self.idle.notify_waiters();
    }

    async fn process_one(&self, document_id: DocumentId) {
        self.record(document_id, ParseStatus::InProgress).await;
        tracing::info!(document_id, "Parsing document");

        let processor = self.processor.clone();
        let result = tokio::spawn(async move { processor.process(document_id).await }).await;

        let status = match result {
            Ok(Ok(())) => {
                tracing::info!(document_id, "Document parsed");
                ParseStatus::Completed
            }
            Ok(Err(e)) => {
                tracing::error!(document_id, error = %e, "Failed to parse document");
                ParseStatus::Failed {
                    error: e.to_string(),
                }
            }
            Err(e) => {
                tracing::error!(document_id, error = %e, "Parse task panicked");
                ParseStatus::Failed {
                    error: "Parsing task panicked".to_string(),
                }
            }
        };

        self.record(document_id, status).await;
    }

    async fn record(&self, document_id: DocumentId, status: ParseStatus) {
        let Some(store) = &self.statuses else {
            return;
        };
        if let Err(e) = store.set_status(document_id, status).await {
            tracing::warn!(document_id, error = %e, "Failed to record parse status");
        }
    }
}
