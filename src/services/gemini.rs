// src/services/gemini.rs
//! Client for the Generative Language API (`generateContent` and
//! `streamGenerateContent` over Server-Sent Events).

use std::time::Duration;

use async_trait::async_trait;
use futures_util::TryStreamExt;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncBufReadExt;
use tokio_util::{io::StreamReader, sync::CancellationToken};
use tracing::debug;

use super::session::{ChatModel, FragmentStream};
use crate::config::Config;
use crate::error::UpstreamError;
use crate::message::ChatTurn;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Serialize)]
struct GenerateContentRequest<'a> {
    contents: &'a [ChatTurn],
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
    error: Option<ApiErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    #[serde(default)]
    code: u16,
    #[serde(default)]
    message: String,
}

#[derive(Deserialize)]
struct ApiErrorEnvelope {
    error: ApiErrorDetail,
}

impl GenerateContentResponse {
    /// Text of the first candidate, parts joined without a separator.
    ///
    /// `Ok(None)` when the chunk carries no text at all.
    fn text(self) -> Result<Option<String>, UpstreamError> {
        if let Some(err) = self.error {
            return Err(UpstreamError::Api { status: err.code, message: err.message });
        }
        if let Some(reason) = self.prompt_feedback.and_then(|f| f.block_reason) {
            return Err(UpstreamError::Blocked(reason));
        }

        let Some(content) = self.candidates.into_iter().next().and_then(|c| c.content) else {
            return Ok(None);
        };
        let texts: Vec<String> = content.parts.into_iter().filter_map(|p| p.text).collect();
        if texts.is_empty() { Ok(None) } else { Ok(Some(texts.concat())) }
    }
}

pub struct GeminiClient {
    http: reqwest::Client,
    api_base: String,
    model: String,
    api_key: String,
    request_timeout: Duration,
}

impl std::fmt::Debug for GeminiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiClient")
            .field("api_base", &self.api_base)
            .field("model", &self.model)
            .field("api_key", &"[REDACTED]")
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl GeminiClient {
    pub fn new(config: &Config) -> Result<Self, UpstreamError> {
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;

        Ok(Self {
            http,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
            request_timeout: config.request_timeout,
        })
    }

    fn api_url(&self, stream: bool) -> String {
        if stream {
            format!("{}/models/{}:streamGenerateContent?alt=sse", self.api_base, self.model)
        } else {
            format!("{}/models/{}:generateContent", self.api_base, self.model)
        }
    }

    async fn post(
        &self,
        url: &str,
        contents: &[ChatTurn],
        timeout: Option<Duration>,
    ) -> Result<reqwest::Response, UpstreamError> {
        let mut request = self
            .http
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .json(&GenerateContentRequest { contents });
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        let response = request.send().await.map_err(|e| self.map_transport(e))?;
        check_status(response).await
    }

    fn map_transport(&self, e: reqwest::Error) -> UpstreamError {
        if e.is_timeout() {
            UpstreamError::Timeout(self.request_timeout)
        } else {
            UpstreamError::from(e)
        }
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, UpstreamError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        return Err(UpstreamError::RateLimited);
    }

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ApiErrorEnvelope>(&body)
        .map(|env| env.error.message)
        .unwrap_or(body);
    Err(UpstreamError::Api { status: status.as_u16(), message })
}

#[async_trait]
impl ChatModel for GeminiClient {
    async fn generate_content(&self, contents: &[ChatTurn]) -> Result<String, UpstreamError> {
        debug!(model = %self.model, turns = contents.len(), "generateContent");

        let response = self
            .post(&self.api_url(false), contents, Some(self.request_timeout))
            .await?;
        let parsed: GenerateContentResponse =
            response.json().await.map_err(|e| self.map_transport(e))?;

        parsed
            .text()?
            .ok_or_else(|| UpstreamError::InvalidResponse("no text in first candidate".to_string()))
    }

    async fn stream_generate_content(
        &self,
        contents: &[ChatTurn],
        cancel: CancellationToken,
    ) -> Result<FragmentStream, UpstreamError> {
        debug!(model = %self.model, turns = contents.len(), "streamGenerateContent");

        let response = tokio::time::timeout(
            self.request_timeout,
            self.post(&self.api_url(true), contents, None),
        )
        .await
        .map_err(|_| UpstreamError::Timeout(self.request_timeout))??;

        Ok(sse_fragments(response, self.request_timeout, cancel))
    }
}

/// Turn an SSE response into a pull-driven fragment stream.
///
/// Each `data:` event is a JSON chunk; chunks without text are skipped.
/// Waiting for any single line is bounded by `idle_timeout`.
fn sse_fragments(
    response: reqwest::Response,
    idle_timeout: Duration,
    cancel: CancellationToken,
) -> FragmentStream {
    let token = cancel.clone();
    let bytes = response.bytes_stream().map_err(std::io::Error::other);
    let mut lines = tokio::io::BufReader::new(StreamReader::new(bytes)).lines();

    let fragments = async_stream::try_stream! {
        let mut data = String::new();
        loop {
            let next = tokio::select! {
                _ = token.cancelled() => {
                    debug!("fragment stream cancelled");
                    break;
                }
                next = tokio::time::timeout(idle_timeout, lines.next_line()) => next,
            };
            let line = next
                .map_err(|_| UpstreamError::Timeout(idle_timeout))?
                .map_err(|e| UpstreamError::Network(e.to_string()))?;

            let event = match line {
                Some(line) => match parse_sse_line(&line, &mut data) {
                    Some(event) => event,
                    None => continue,
                },
                None if data.is_empty() => break,
                None => std::mem::take(&mut data),
            };

            if let Some(text) = chunk_text(&event)? {
                yield text;
            }
        }
    };

    FragmentStream::new(fragments, cancel)
}

/// Feed one SSE line; returns the accumulated event data on a blank line.
fn parse_sse_line(line: &str, data: &mut String) -> Option<String> {
    if line.is_empty() {
        return if data.is_empty() { None } else { Some(std::mem::take(data)) };
    }
    // id:, event:, retry: and comments carry nothing for us
    if let Some(value) = line.strip_prefix("data:") {
        if !data.is_empty() {
            data.push('\n');
        }
        data.push_str(value.strip_prefix(' ').unwrap_or(value));
    }
    None
}

fn chunk_text(event: &str) -> Result<Option<String>, UpstreamError> {
    let chunk: GenerateContentResponse =
        serde_json::from_str(event).map_err(|e| UpstreamError::Decode(e.to_string()))?;
    chunk.text()
}
