//! Document parsing for the `parse` command.
//!
//! [`ParseLedger`] maps document ids to source files and keeps their parse
//! status in `parse_status.json`, so documents left `in_progress` by a killed
//! run are picked up again on the next start. [`TextExtractor`] is the queue's
//! processor: it extracts the text and writes `texts/<id>.txt`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, bail, Context};
use async_trait::async_trait;
use distill_core::{DocumentId, DocumentProcessor, ParseStatus, ParseStatusStore};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::extract::extract_text;

/// One document known to the ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParseRecord {
    pub source: PathBuf,
    #[serde(flatten)]
    pub status: ParseStatus,
}

/// Parse status persisted to a JSON file
pub struct ParseLedger {
    path: PathBuf,
    records: RwLock<BTreeMap<DocumentId, ParseRecord>>,
}

impl ParseLedger {
    /// Open the ledger at `path`; a missing file is an empty ledger.
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let records = if path.exists() {
            let raw = std::fs::read_to_string(path).context("Failed to read parse ledger")?;
            serde_json::from_str(&raw).context("Failed to parse parse ledger")?
        } else {
            BTreeMap::new()
        };

        Ok(Self {
            path: path.to_path_buf(),
            records: RwLock::new(records),
        })
    }

    /// Add a source file as a new pending document and return its id.
    pub async fn register(&self, source: &Path) -> anyhow::Result<DocumentId> {
        let mut records = self.records.write().await;
        let id = records.keys().next_back().map_or(1, |last| last + 1);
        records.insert(
            id,
            ParseRecord {
                source: source.to_path_buf(),
                status: ParseStatus::Pending,
            },
        );
        self.persist(&records).await?;
        Ok(id)
    }

    pub async fn get(&self, document_id: DocumentId) -> Option<ParseRecord> {
        self.records.read().await.get(&document_id).cloned()
    }

    async fn persist(&self, records: &BTreeMap<DocumentId, ParseRecord>) -> anyhow::Result<()> {
        let json = serde_json::to_vec_pretty(records)?;
        tokio::fs::write(&self.path, json)
            .await
            .with_context(|| format!("Failed to write {}", self.path.display()))
    }
}

#[async_trait]
impl ParseStatusStore for ParseLedger {
    async fn set_status(&self, document_id: DocumentId, status: ParseStatus) -> anyhow::Result<()> {
        let mut records = self.records.write().await;
        let record = records
            .get_mut(&document_id)
            .ok_or_else(|| anyhow!("Unknown document {}", document_id))?;
        record.status = status;
        self.persist(&records).await
    }

    async fn with_status(&self, status: &ParseStatus) -> anyhow::Result<Vec<DocumentId>> {
        let records = self.records.read().await;
        Ok(records
            .iter()
            .filter(|(_, record)| &record.status == status)
            .map(|(id, _)| *id)
            .collect())
    }
}

/// Extracts a document's text into the texts directory.
pub struct TextExtractor {
    ledger: Arc<ParseLedger>,
    texts_dir: PathBuf,
}

impl TextExtractor {
    pub fn new(ledger: Arc<ParseLedger>, texts_dir: PathBuf) -> Self {
        Self { ledger, texts_dir }
    }
}

#[async_trait]
impl DocumentProcessor for TextExtractor {
    async fn process(&self, document_id: DocumentId) -> anyhow::Result<()> {
        let record = self
            .ledger
            .get(document_id)
            .await
            .ok_or_else(|| anyhow!("Unknown document {}", document_id))?;

        let source = record.source.clone();
        let extracted = tokio::task::spawn_blocking(move || extract_text(&source)).await??;
        if extracted.text.trim().is_empty() {
            bail!("No text could be extracted from {}", record.source.display());
        }

        let target = self.texts_dir.join(format!("{}.txt", document_id));
        tokio::fs::write(&target, &extracted.text)
            .await
            .with_context(|| format!("Failed to write {}", target.display()))?;

        tracing::info!(
            document_id,
            source = %record.source.display(),
            chars = extracted.text.chars().count(),
            pages = ?extracted.page_count,
            "Extracted document text"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use distill_core::ParseQueue;

    use super::*;
    use crate::extract::tests::create_test_pdf;

    #[tokio::test]
    async fn test_ledger_assigns_ids_and_persists() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("parse_status.json");

        let ledger = ParseLedger::open(&path).unwrap();
        assert_eq!(ledger.register(Path::new("/docs/a.pdf")).await.unwrap(), 1);
        assert_eq!(ledger.register(Path::new("/docs/b.txt")).await.unwrap(), 2);
        ledger.set_status(1, ParseStatus::InProgress).await.unwrap();

        let reopened = ParseLedger::open(&path).unwrap();
        assert_eq!(
            reopened.with_status(&ParseStatus::InProgress).await.unwrap(),
            vec![1]
        );
        assert_eq!(reopened.register(Path::new("/docs/c.txt")).await.unwrap(), 3);
        assert!(reopened.set_status(42, ParseStatus::Completed).await.is_err());
    }

    #[tokio::test]
    async fn test_queue_extracts_text_and_records_status() {
        let tmp = tempfile::tempdir().unwrap();
        let texts_dir = tmp.path().join("texts");
        std::fs::create_dir_all(&texts_dir).unwrap();

        let pdf = tmp.path().join("slides.pdf");
        std::fs::write(&pdf, create_test_pdf(&["Cell biology"])).unwrap();
        let notes = tmp.path().join("notes.txt");
        std::fs::write(&notes, "Mitochondria produce ATP.").unwrap();
        let empty = tmp.path().join("empty.txt");
        std::fs::write(&empty, "   ").unwrap();

        let ledger = Arc::new(ParseLedger::open(&tmp.path().join("parse_status.json")).unwrap());
        let extractor = Arc::new(TextExtractor::new(ledger.clone(), texts_dir.clone()));
        let queue = ParseQueue::new(extractor).with_status_store(ledger.clone());

        for source in [&pdf, &notes, &empty] {
            let id = ledger.register(source).await.unwrap();
            queue.enqueue(id).await;
        }
        queue.wait_idle().await;

        assert_eq!(ledger.get(1).await.unwrap().status, ParseStatus::Completed);
        assert_eq!(ledger.get(2).await.unwrap().status, ParseStatus::Completed);
        assert!(matches!(
            ledger.get(3).await.unwrap().status,
            ParseStatus::Failed { .. }
        ));

        let text = std::fs::read_to_string(texts_dir.join("2.txt")).unwrap();
        assert_eq!(text, "Mitochondria produce ATP.");
        assert!(texts_dir.join("1.txt").exists());
        assert!(!texts_dir.join("3.txt").exists());
    }

    #[tokio::test]
    async fn test_record_serializes_status_inline() {
        let record = ParseRecord {
            source: PathBuf::from("/docs/a.pdf"),
            status: ParseStatus::Failed {
                error: "bad".into(),
            },
        };
        let json = serde_json::to_value(&record).unwrap();

        assert_eq!(json["source"], "/docs/a.pdf");
        assert_eq!(json["status"], "failed");
        assert_eq!(json["error"], "bad");
    }
}
