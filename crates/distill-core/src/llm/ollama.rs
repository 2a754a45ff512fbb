//! Streaming client for a local Ollama-style generate endpoint.
//!
//! One POST per call with `{model, prompt, stream: true}`. The response body is
//! newline-delimited JSON, each line shaped `{response, done}`.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{BoxStream, StreamExt};
use serde::{Deserialize, Serialize};

use super::{truncate_prompt, GenerationRequest, TextGenerator, TextStream};
use crate::config::GenerationSettings;
use crate::error::{GenerationError, GenerationResult};

/// Streaming generation client for a locally hosted model server
pub struct OllamaClient {
    client: reqwest::Client,
    timeout: Duration,
    max_prompt_chars: usize,
    max_retries: u32,
}

impl OllamaClient {
    pub fn new(settings: &GenerationSettings) -> Self {
        Self {
            client: reqwest::Client::new(),
            timeout: settings.request_timeout(),
            max_prompt_chars: settings.max_prompt_chars,
            max_retries: settings.transport_retries,
        }
    }

    /// Override the request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Send the request, retrying transient failures immediately.
    async fn send_with_retry(
        &self,
        body: &GenerateBody<'_>,
        endpoint: &str,
    ) -> GenerationResult<reqwest::Response> {
        let mut attempt = 0;
        loop {
            match self.send_once(body, endpoint).await {
                Ok(response) => return Ok(response),
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    attempt += 1;
                    tracing::warn!(
                        attempt,
                        max_retries = self.max_retries,
                        error = %e,
                        "Transient failure talking to model server, retrying"
                    );
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn send_once(
        &self,
        body: &GenerateBody<'_>,
        endpoint: &str,
    ) -> GenerationResult<reqwest::Response> {
        let response = self
            .client
            .post(endpoint)
            .timeout(self.timeout)
            .json(body)
            .send()
            .await
            .map_err(|e| classify(e, self.timeout))?;

        let status = response.status();
        if !status.is_success() {
            let raw = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorBody>(&raw)
                .map(|e| e.error)
                .unwrap_or(raw);
            return Err(GenerationError::Http {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response)
    }
}

#[async_trait]
impl TextGenerator for OllamaClient {
    async fn generate(&self, request: GenerationRequest) -> GenerationResult<TextStream> {
        let prompt = truncate_prompt(&request.prompt, self.max_prompt_chars);
        let body = GenerateBody {
            model: &request.model,
            prompt: &prompt,
            stream: true,
        };

        tracing::debug!(
            endpoint = %request.endpoint,
            model = %request.model,
            prompt_chars = prompt.chars().count(),
            "Opening generation stream"
        );

        let response = self.send_with_retry(&body, &request.endpoint).await?;
        let decoder = LineDecoder::new(response.bytes_stream().boxed(), self.timeout);

        Ok(futures::stream::unfold(decoder, |mut decoder| async move {
            decoder.next_increment().await.map(|item| (item, decoder))
        })
        .boxed())
    }
}

fn classify(err: reqwest::Error, timeout: Duration) -> GenerationError {
    if err.is_timeout() {
        GenerationError::Timeout(timeout)
    } else {
        GenerationError::from(err)
    }
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Serialize)]
struct GenerateBody<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct GenerateChunk {
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

/// What one protocol line contributed.
#[derive(Debug, PartialEq)]
enum Line {
    Text { text: String, done: bool },
    Error(String),
    Skip,
}

fn parse_line(raw: &[u8]) -> Line {
    let line = String::from_utf8_lossy(raw);
    let line = line.trim();
    if line.is_empty() {
        return Line::Skip;
    }

    match serde_json::from_str::<GenerateChunk>(line) {
        Ok(GenerateChunk {
            error: Some(error), ..
        }) => Line::Error(error),
        Ok(chunk) => Line::Text {
            text: chunk.response,
            done: chunk.done,
        },
        Err(e) => {
            tracing::warn!(error = %e, line = %line, "Skipping malformed stream line");
            Line::Skip
        }
    }
}

// ============================================================================
// Body decoding
// ============================================================================

/// Splits the response body into lines and turns them into increments.
struct LineDecoder {
    body: BoxStream<'static, reqwest::Result<Bytes>>,
    buffer: Vec<u8>,
    pending: VecDeque<GenerationResult<String>>,
    yielded: usize,
    finished: bool,
    timeout: Duration,
}

impl LineDecoder {
    fn new(body: BoxStream<'static, reqwest::Result<Bytes>>, timeout: Duration) -> Self {
        Self {
            body,
            buffer: Vec::new(),
            pending: VecDeque::new(),
            yielded: 0,
            finished: false,
            timeout,
        }
    }

    async fn next_increment(&mut self) -> Option<GenerationResult<String>> {
        loop {
            if let Some(item) = self.pending.pop_front() {
                match item {
                    Ok(text) => {
                        self.yielded += 1;
                        return Some(Ok(text));
                    }
                    Err(e) => {
                        self.pending.clear();
                        self.finished = true;
                        return Some(Err(e));
                    }
                }
            }

            if self.finished {
                return None;
            }

            match self.body.next().await {
                Some(Ok(bytes)) => {
                    self.buffer.extend_from_slice(&bytes);
                    self.drain_lines();
                }
                Some(Err(e)) => {
                    self.finished = true;
                    return Some(Err(self.body_error(e)));
                }
                None => {
                    // Transport closed; the last line may lack a newline.
                    let rest = std::mem::take(&mut self.buffer);
                    self.accept(parse_line(&rest));
                    self.finished = true;
                }
            }
        }
    }

    fn drain_lines(&mut self) {
        while !self.finished {
            let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') else {
                break;
            };
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            self.accept(parse_line(&line));
        }
    }

    fn accept(&mut self, line: Line) {
        match line {
            Line::Text { text, done } => {
                if !text.is_empty() {
                    self.pending.push_back(Ok(text));
                }
                if done {
                    self.finished = true;
                    self.buffer.clear();
                }
            }
            Line::Error(message) => {
                self.pending.push_back(Err(GenerationError::InvalidContent(message)));
                self.finished = true;
            }
            Line::Skip => {}
        }
    }

    /// The server already accepted the request, so a broken body is never
    /// treated as transient, even before the first increment.
    fn body_error(&self, err: reqwest::Error) -> GenerationError {
        if err.is_timeout() {
            return GenerationError::Timeout(self.timeout);
        }
        tracing::warn!(increments = self.yielded, error = %err, "Response body broke off");
        GenerationError::StreamInterrupted(err.to_string())
    }
}
