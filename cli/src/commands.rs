//! Command implementations.
//!
//! stdout carries machine-readable output only: JSON lines for `generate` and
//! `parse`, pretty JSON for `config`. Logs go to stderr.

use std::path::PathBuf;
use std::sync::Arc;

use distill_core::{
    DocumentId, GenerationJob, GenerationService, GenerationSettings, ModelConfig, OllamaClient,
    OperationType, ParseQueue, ParseStatus, StreamEvent,
};
use serde::Serialize;
use tokio::sync::mpsc;

use crate::cli::GenerateArgs;
use crate::config::Config;
use crate::error::{CommandError, CommandResult, ResultExt};
use crate::parse::{ParseLedger, TextExtractor};
use crate::store::JsonResultStore;

// ============================================================================
// generate
// ============================================================================

pub async fn generate(config: &Config, args: GenerateArgs) -> CommandResult<()> {
    let mut settings = config.load_settings();
    if let Some(endpoint) = &args.endpoint {
        settings.endpoint = endpoint.clone();
    }
    if let Some(model) = &args.model {
        settings.model = model.clone();
    }

    let text = read_document(&args.file).await?;

    let store = Arc::new(JsonResultStore::open(&config.results_dir)?);
    let generator = Arc::new(OllamaClient::new(&settings));
    let model = ModelConfig::from(&settings);
    let service = GenerationService::new(generator, store, settings);

    let mut job = GenerationJob::new(args.document_id, args.operation, text, model);
    if args.operation == OperationType::Quiz {
        job = job.with_quiz(args.quiz_config());
    }

    let (tx, mut rx) = mpsc::unbounded_channel::<StreamEvent>();
    let ticket = service.submit(job, Arc::new(tx))?;
    tracing::info!(
        job_id = %ticket.job_id,
        document_id = ticket.document_id,
        operation = %ticket.operation,
        "Streaming job events"
    );

    loop {
        tokio::select! {
            event = rx.recv() => {
                let Some(event) = event else {
                    return Err(CommandError::internal("Event stream closed before the job finished"));
                };
                print_json_line(&event)?;
                if event.done {
                    return match event.error {
                        Some(message) => Err(CommandError::generation_failed(message)),
                        None => Ok(()),
                    };
                }
            }
            _ = tokio::signal::ctrl_c(), if !service.is_shut_down() => {
                tracing::warn!("Interrupted, cancelling job");
                service.shutdown();
            }
        }
    }
}

async fn read_document(path: &std::path::Path) -> CommandResult<String> {
    if !path.exists() {
        return Err(CommandError::file_not_found(path));
    }
    tokio::fs::read_to_string(path).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::InvalidData {
            CommandError::InvalidUtf8 {
                message: format!("{} is not UTF-8 text; run `distill parse` first", path.display()),
            }
        } else {
            e.into()
        }
    })
}

// ============================================================================
// parse
// ============================================================================

/// One line of `parse` output
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ParseReport {
    document_id: DocumentId,
    source: PathBuf,
    #[serde(flatten)]
    status: ParseStatus,
}

pub async fn parse(config: &Config, files: Vec<PathBuf>) -> CommandResult<()> {
    let mut sources = Vec::with_capacity(files.len());
    for file in &files {
        if !file.exists() {
            return Err(CommandError::file_not_found(file));
        }
        sources.push(std::fs::canonicalize(file)?);
    }

    let ledger = Arc::new(ParseLedger::open(&config.data_dir.join("parse_status.json"))?);
    let extractor = Arc::new(TextExtractor::new(ledger.clone(), config.texts_dir.clone()));
    let queue = ParseQueue::new(extractor).with_status_store(ledger.clone());

    let mut ids = queue.resume_interrupted().await?;
    for source in &sources {
        let id = ledger.register(source).await?;
        queue.enqueue(id).await;
        ids.push(id);
    }

    queue.wait_idle().await;

    let mut failed = 0;
    for id in ids {
        let Some(record) = ledger.get(id).await else {
            continue;
        };
        if matches!(record.status, ParseStatus::Failed { .. }) {
            failed += 1;
        }
        print_json_line(&ParseReport {
            document_id: id,
            source: record.source,
            status: record.status,
        })?;
    }

    if failed > 0 {
        return Err(CommandError::external(format!(
            "{} document(s) failed to parse",
            failed
        )));
    }
    Ok(())
}

// ============================================================================
// config
// ============================================================================

pub fn show_or_update_config(
    config: &Config,
    endpoint: Option<String>,
    model: Option<String>,
) -> CommandResult<GenerationSettings> {
    let mut settings = config.load_settings();

    if endpoint.is_some() || model.is_some() {
        if let Some(endpoint) = endpoint {
            settings.endpoint = endpoint;
        }
        if let Some(model) = model {
            settings.model = model;
        }
        settings.save(&config.settings_file)?;
        tracing::info!(path = %config.settings_file.display(), "Settings saved");
    }

    let json = serde_json::to_string_pretty(&settings).internal_err()?;
    println!("{}", json);
    Ok(settings)
}

fn print_json_line<T: Serialize>(value: &T) -> CommandResult<()> {
    let line = serde_json::to_string(value).internal_err()?;
    println!("{}", line);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_update_persists() {
        let tmp = tempfile::tempdir().unwrap();
        let config = Config::with_data_dir(tmp.path());
        config.ensure_dirs().unwrap();

        let settings =
            show_or_update_config(&config, None, Some("mistral".to_string())).unwrap();
        assert_eq!(settings.model, "mistral");

        let shown = show_or_update_config(&config, None, None).unwrap();
        assert_eq!(shown.model, "mistral");
        assert_eq!(shown.endpoint, distill_core::config::DEFAULT_ENDPOINT);
    }

    #[tokio::test]
    async fn test_read_document_missing_file() {
        let tmp = tempfile::tempdir().unwrap();
        let err = read_document(&tmp.path().join("missing.txt")).await.unwrap_err();

        assert!(matches!(err, CommandError::FileNotFound { .. }));
    }

    #[tokio::test]
    async fn test_read_document_rejects_binary() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("slides.pdf");
        std::fs::write(&path, [0x25, 0x50, 0x44, 0x46, 0xff, 0xfe]).unwrap();

        let err = read_document(&path).await.unwrap_err();
        assert!(matches!(err, CommandError::InvalidUtf8 { .. }));
    }

    #[tokio::test]
    async fn test_parse_writes_texts() {
        let tmp = tempfile::tempdir().unwrap();
        let config = Config::with_data_dir(tmp.path().join("data"));
        config.ensure_dirs().unwrap();

        let notes = tmp.path().join("notes.txt");
        std::fs::write(&notes, "Enzymes lower activation energy.").unwrap();

        parse(&config, vec![notes]).await.unwrap();

        let text = std::fs::read_to_string(config.text_path(1)).unwrap();
        assert_eq!(text, "Enzymes lower activation energy.");
    }

    #[tokio::test]
    async fn test_parse_reports_failures() {
        let tmp = tempfile::tempdir().unwrap();
        let config = Config::with_data_dir(tmp.path().join("data"));
        config.ensure_dirs().unwrap();

        let blank = tmp.path().join("blank.txt");
        std::fs::write(&blank, "\n").unwrap();

        let err = parse(&config, vec![blank]).await.unwrap_err();
        assert!(matches!(err, CommandError::ExternalError { .. }));
    }
}
