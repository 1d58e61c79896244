//! Gemini API client for page generation and copywriting.

use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use eventsource_stream::Eventsource;
use futures::{StreamExt, stream::BoxStream};
use reqwest::{Client, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_MODEL: &str = "gemini-flash-latest";

#[derive(Debug, Clone, Error)]
pub enum GeminiApiError {
    #[error("network error: {0}")]
    Transport(String),
    #[error("timeout")]
    Timeout,
    #[error("http {status}: {body}")]
    Http { status: u16, body: String },
    #[error("rate limited")]
    RateLimited,
    #[error("invalid api key")]
    InvalidApiKey,
    #[error("json error: {0}")]
    Serde(String),
    #[error("prompt blocked: {0}")]
    Blocked(String),
    #[error("upstream error {code}: {message}")]
    Upstream { code: i64, message: String },
    #[error("missing api key: GEMINI_API_KEY environment variable not set")]
    MissingApiKey,
}

impl GeminiApiError {
    /// Returns true if the error is transient and should be retried.
    pub fn should_retry(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Timeout | Self::RateLimited => true,
            Self::Http { status, .. } => (500..=599).contains(status),
            _ => false,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content<'a>>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

impl<'a> GenerateContentRequest<'a> {
    fn new(system: Option<&'a str>, prompt: &'a str) -> Self {
        Self {
            contents: vec![Content {
                role: Some("user"),
                parts: vec![Part { text: prompt }],
            }],
            system_instruction: system.map(|text| Content {
                role: None,
                parts: vec![Part { text }],
            }),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    pub prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub content: Option<CandidateContent>,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CandidateContent {
    #[serde(default)]
    pub parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
pub struct ResponsePart {
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptFeedback {
    pub block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

/// One `data:` payload of a streamed response.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum StreamChunk {
    Error { error: ErrorBody },
    Response(GenerateContentResponse),
}

impl GenerateContentResponse {
    /// Concatenated text parts of the first candidate.
    pub fn text(&self) -> String {
        self.candidates
            .first()
            .and_then(|candidate| candidate.content.as_ref())
            .map(|content| {
                content
                    .parts
                    .iter()
                    .filter_map(|part| part.text.as_deref())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn into_text(self) -> Result<String, GeminiApiError> {
        if let Some(reason) = self
            .prompt_feedback
            .as_ref()
            .and_then(|feedback| feedback.block_reason.clone())
        {
            return Err(GeminiApiError::Blocked(reason));
        }
        let text = self.text();
        if text.is_empty()
            && let Some(reason) = self
                .candidates
                .first()
                .and_then(|candidate| candidate.finish_reason.as_deref())
                .filter(|reason| *reason == "SAFETY")
        {
            return Err(GeminiApiError::Blocked(reason.to_string()));
        }
        Ok(text)
    }
}

/// Text carried by one SSE event, `None` when the event has no text.
fn parse_stream_chunk(data: &str) -> Result<Option<String>, GeminiApiError> {
    let chunk: StreamChunk =
        serde_json::from_str(data).map_err(|e| GeminiApiError::Serde(e.to_string()))?;
    match chunk {
        StreamChunk::Error { error } => Err(GeminiApiError::Upstream {
            code: error.code,
            message: error.message,
        }),
        StreamChunk::Response(response) => {
            let text = response.into_text()?;
            Ok((!text.is_empty()).then_some(text))
        }
    }
}

/// Gemini API client
#[derive(Debug, Clone)]
pub struct GeminiApiClient {
    http: Client,
    api_key: Option<SecretString>,
    model: String,
    base_url: String,
}

impl GeminiApiClient {
    const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
    const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

    /// A missing key is reported on first use rather than here, so the rest of
    /// the service can run without one.
    pub fn new(
        api_key: Option<SecretString>,
        model: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Result<Self, GeminiApiError> {
        // No overall timeout: generation streams stay open as long as the
        // model keeps producing.
        let http = Client::builder()
            .connect_timeout(Self::CONNECT_TIMEOUT)
            .user_agent(concat!("site-builder/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| GeminiApiError::Transport(e.to_string()))?;

        Ok(Self {
            http,
            api_key,
            model: model.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self, method: &str) -> String {
        format!("{}/models/{}:{}", self.base_url, self.model, method)
    }

    fn api_key(&self) -> Result<&str, GeminiApiError> {
        self.api_key
            .as_ref()
            .map(|key| key.expose_secret())
            .ok_or(GeminiApiError::MissingApiKey)
    }

    /// Single-shot completion, retried on transient failures.
    pub async fn complete(
        &self,
        system: Option<&str>,
        prompt: &str,
    ) -> Result<String, GeminiApiError> {
        let request = GenerateContentRequest::new(system, prompt);

        let response = (|| async { self.send_request(&request).await })
            .retry(
                &ExponentialBuilder::default()
                    .with_min_delay(Duration::from_secs(1))
                    .with_max_delay(Duration::from_secs(30))
                    .with_max_times(3)
                    .with_jitter(),
            )
            .when(|e: &GeminiApiError| e.should_retry())
            .notify(|e, dur| {
                warn!(
                    "Gemini API call failed, retrying after {:.2}s: {}",
                    dur.as_secs_f64(),
                    e
                )
            })
            .await?;

        response.into_text()
    }

    async fn send_request(
        &self,
        request: &GenerateContentRequest<'_>,
    ) -> Result<GenerateContentResponse, GeminiApiError> {
        let res = self
            .http
            .post(self.endpoint("generateContent"))
            .header("x-goog-api-key", self.api_key()?)
            .timeout(Self::REQUEST_TIMEOUT)
            .json(request)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        check_status(res)
            .await?
            .json::<GenerateContentResponse>()
            .await
            .map_err(|e| GeminiApiError::Serde(e.to_string()))
    }

    /// Starts a streamed generation. Failures before the first byte come back
    /// as `Err`; later failures end the returned stream with one `Err` item.
    ///
    /// The stream owns the upstream response, so dropping it aborts the read.
    pub async fn stream_text(
        &self,
        system: &str,
        prompt: &str,
    ) -> Result<BoxStream<'static, Result<String, GeminiApiError>>, GeminiApiError> {
        let request = GenerateContentRequest::new(Some(system), prompt);
        let res = self
            .http
            .post(self.endpoint("streamGenerateContent"))
            .query(&[("alt", "sse")])
            .header("x-goog-api-key", self.api_key()?)
            .json(&request)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        let res = check_status(res).await?;

        let stream = async_stream::stream! {
            let mut events = Box::pin(res.bytes_stream().eventsource());
            while let Some(event) = events.next().await {
                match event {
                    Ok(event) => match parse_stream_chunk(&event.data) {
                        Ok(Some(text)) => yield Ok(text),
                        Ok(None) => {}
                        Err(e) => {
                            yield Err(e);
                            break;
                        }
                    },
                    Err(e) => {
                        yield Err(GeminiApiError::Transport(e.to_string()));
                        break;
                    }
                }
            }
        };

        Ok(stream.boxed())
    }
}

async fn check_status(res: Response) -> Result<Response, GeminiApiError> {
    match res.status() {
        s if s.is_success() => Ok(res),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(GeminiApiError::InvalidApiKey),
        StatusCode::TOO_MANY_REQUESTS => Err(GeminiApiError::RateLimited),
        s => {
            let status = s.as_u16();
            let body = res.text().await.unwrap_or_default();
            Err(GeminiApiError::Http { status, body })
        }
    }
}

fn map_reqwest_error(e: reqwest::Error) -> GeminiApiError {
    if e.is_timeout() {
        GeminiApiError::Timeout
    } else {
        GeminiApiError::Transport(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_shape() {
        let request = GenerateContentRequest::new(Some("be terse"), "a bakery site");
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "contents": [{ "role": "user", "parts": [{ "text": "a bakery site" }] }],
                "systemInstruction": { "parts": [{ "text": "be terse" }] },
            })
        );
    }

    #[test]
    fn test_parse_text_chunk() {
        let data = r#"{"candidates":[{"content":{"parts":[{"text":"<html>"},{"text":"<head>"}],"role":"model"},"index":0}]}"#;
        assert_eq!(
            parse_stream_chunk(data).unwrap().as_deref(),
            Some("<html><head>")
        );
    }

    #[test]
    fn test_parse_chunk_without_text() {
        let data = r#"{"candidates":[{"finishReason":"STOP","index":0}],"usageMetadata":{"totalTokenCount":12}}"#;
        assert_eq!(parse_stream_chunk(data).unwrap(), None);
    }

    #[test]
    fn test_parse_error_chunk() {
        let data = r#"{"error":{"code":503,"message":"The model is overloaded.","status":"UNAVAILABLE"}}"#;
        assert!(matches!(
            parse_stream_chunk(data),
            Err(GeminiApiError::Upstream { code: 503, .. })
        ));
    }

    #[test]
    fn test_parse_blocked_prompt() {
        let data = r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#;
        assert!(matches!(
            parse_stream_chunk(data),
            Err(GeminiApiError::Blocked(reason)) if reason == "SAFETY"
        ));
    }

    #[test]
    fn test_parse_garbage() {
        assert!(matches!(
            parse_stream_chunk("not json"),
            Err(GeminiApiError::Serde(_))
        ));
    }

    #[test]
    fn test_retry_classification() {
        assert!(GeminiApiError::Timeout.should_retry());
        assert!(GeminiApiError::Http { status: 503, body: String::new() }.should_retry());
        assert!(!GeminiApiError::Http { status: 400, body: String::new() }.should_retry());
        assert!(!GeminiApiError::MissingApiKey.should_retry());
    }

    #[tokio::test]
    async fn test_missing_key_reported_on_use() {
        let client = GeminiApiClient::new(None, DEFAULT_MODEL, DEFAULT_BASE_URL).unwrap();
        assert!(matches!(
            client.complete(None, "hi").await,
            Err(GeminiApiError::MissingApiKey)
        ));
        assert!(matches!(
            client.stream_text("system", "hi").await,
            Err(GeminiApiError::MissingApiKey)
        ));
    }
}
