//! JSON-file result store.
//!
//! Each result is one pretty-printed file `results/<id>.json`. Ids increase
//! monotonically and continue from the highest existing file after a restart.

use std::path::{Path, PathBuf};

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use distill_core::{DocumentId, KeyTerm, QuizConfig, QuizQuestion, ResultStore};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

/// Payload of a saved result, tagged by operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum ResultContent {
    Summary {
        summary: String,
    },
    KeyPoints {
        points: Vec<String>,
    },
    KeyTerms {
        terms: Vec<KeyTerm>,
    },
    Quiz {
        config: QuizConfig,
        questions: Vec<QuizQuestion>,
    },
}

/// A result record as written to disk
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredResult {
    pub id: i64,
    pub document_id: DocumentId,
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub content: ResultContent,
}

pub struct JsonResultStore {
    dir: PathBuf,
    /// Highest id handed out so far
    last_id: Mutex<i64>,
}

impl JsonResultStore {
    /// Open (or create) a store in `dir`.
    pub fn open(dir: &Path) -> anyhow::Result<Self> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create results directory {}", dir.display()))?;

        let mut last_id = 0;
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(id) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.parse::<i64>().ok())
            {
                last_id = last_id.max(id);
            }
        }

        tracing::debug!(dir = %dir.display(), last_id, "Opened result store");

        Ok(Self {
            dir: dir.to_path_buf(),
            last_id: Mutex::new(last_id),
        })
    }

    fn path(&self, id: i64) -> PathBuf {
        self.dir.join(format!("{}.json", id))
    }

    async fn save(&self, document_id: DocumentId, content: ResultContent) -> anyhow::Result<i64> {
        let mut last_id = self.last_id.lock().await;
        let id = *last_id + 1;

        let record = StoredResult {
            id,
            document_id,
            created_at: Utc::now(),
            content,
        };
        let json = serde_json::to_vec_pretty(&record)?;

        let path = self.path(id);
        tokio::fs::write(&path, json)
            .await
            .with_context(|| format!("Failed to write result {}", path.display()))?;

        *last_id = id;
        tracing::debug!(id, document_id, "Saved result");
        Ok(id)
    }

    /// Read a result back.
    pub async fn get(&self, id: i64) -> anyhow::Result<Option<StoredResult>> {
        let path = self.path(id);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("Failed to read result {}", path.display())),
        }
    }
}

#[async_trait]
impl ResultStore for JsonResultStore {
    async fn save_summary(&self, document_id: DocumentId, summary: &str) -> anyhow::Result<i64> {
        self.save(
            document_id,
            ResultContent::Summary {
                summary: summary.to_string(),
            },
        )
        .await
    }

    async fn save_key_points(
        &self,
        document_id: DocumentId,
        points: &[String],
    ) -> anyhow::Result<i64> {
        self.save(
            document_id,
            ResultContent::KeyPoints {
                points: points.to_vec(),
            },
        )
        .await
    }

    async fn save_key_terms(
        &self,
        document_id: DocumentId,
        terms: &[KeyTerm],
    ) -> anyhow::Result<i64> {
        self.save(
            document_id,
            ResultContent::KeyTerms {
                terms: terms.to_vec(),
            },
        )
        .await
    }

    async fn save_quiz(
        &self,
        document_id: DocumentId,
        config: &QuizConfig,
        questions: &[QuizQuestion],
    ) -> anyhow::Result<i64> {
        self.save(
            document_id,
            ResultContent::Quiz {
                config: config.clone(),
                questions: questions.to_vec(),
            },
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use distill_core::QuestionType;

    use super::*;

    #[tokio::test]
    async fn test_ids_increase_and_survive_reopen() {
        let tmp = tempfile::tempdir().unwrap();
        let store = JsonResultStore::open(tmp.path()).unwrap();

        assert_eq!(store.save_summary(1, "A summary.").await.unwrap(), 1);
        assert_eq!(
            store
                .save_key_points(1, &["One".to_string(), "Two".to_string()])
                .await
                .unwrap(),
            2
        );

        let reopened = JsonResultStore::open(tmp.path()).unwrap();
        let id = reopened
            .save_key_terms(
                2,
                &[KeyTerm {
                    term: "Osmosis".into(),
                    definition: "Water movement.".into(),
                }],
            )
            .await
            .unwrap();
        assert_eq!(id, 3);
    }

    #[tokio::test]
    async fn test_quiz_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let store = JsonResultStore::open(tmp.path()).unwrap();
        let questions = vec![QuizQuestion {
            question_type: QuestionType::TrueFalse,
            question: "The sun is a star.".into(),
            options: vec!["True".into(), "False".into()],
            correct_answer: "True".into(),
            explanation: None,
        }];

        let id = store
            .save_quiz(4, &QuizConfig::default(), &questions)
            .await
            .unwrap();
        let stored = store.get(id).await.unwrap().unwrap();

        assert_eq!(stored.document_id, 4);
        assert_eq!(
            stored.content,
            ResultContent::Quiz {
                config: QuizConfig::default(),
                questions,
            }
        );
        assert!(store.get(99).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_record_is_tagged_by_operation() {
        let tmp = tempfile::tempdir().unwrap();
        let store = JsonResultStore::open(tmp.path()).unwrap();
        let id = store.save_summary(9, "Text.").await.unwrap();

        let raw = std::fs::read_to_string(tmp.path().join(format!("{}.json", id))).unwrap();
        let json: serde_json::Value = serde_json::from_str(&raw).unwrap();

        assert_eq!(json["operation"], "summary");
        assert_eq!(json["summary"], "Text.");
        assert!(json["created_at"].is_string());
    }
}
