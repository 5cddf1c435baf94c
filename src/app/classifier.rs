//! Vision classifier client.
//!
//! Sends the image URL with a fixed rubric prompt to a vision-capable chat
//! completion endpoint, retries rate-limit and server errors with exponential
//! backoff, and turns the (untrusted) model output into a clamped [`Analysis`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use url::Url;

use crate::domain::moderation::{clamp_unit, Analysis, Category, CategoryScores};

const MAX_TOKENS: u32 = 500;
const TEMPERATURE: f32 = 0.1;
const IMAGE_DETAIL: &str = "low";

pub const RUBRIC_PROMPT: &str = r#"You are a content moderator for a photo sharing app where users post one photo per day.

Review the attached image and score it against each policy category below.

Categories:
- nsfw: nudity, sexual content or sexually suggestive poses
- violence: gore, weapons used against people, physical harm, graphic injury
- hate: hate symbols, slurs, or imagery attacking a protected group
- harassment: content targeting, mocking or doxxing a specific person
- self_harm: self-injury, suicide, or eating disorder promotion
- drugs: illegal drug use, paraphernalia or sale
- illegal: other clearly illegal activity (child exploitation, trafficking, fraud)

Score every category with a confidence between 0.0 and 1.0:
- 0.0-0.3: no violation
- 0.3-0.5: unlikely violation, borderline
- 0.5-0.7: possible violation, needs a human look
- 0.7-0.9: likely violation
- 0.9-1.0: clear violation

Respond with a single JSON object and nothing else:
{
  "is_safe": true,
  "overall_confidence": 0.0,
  "categories": {
    "nsfw": 0.0,
    "violence": 0.0,
    "hate": 0.0,
    "harassment": 0.0,
    "self_harm": 0.0,
    "drugs": 0.0,
    "illegal": 0.0
  },
  "reasoning": "one or two sentences"
}

overall_confidence is your confidence that the image violates policy at all."#;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ClassifierError {
    #[error("classifier returned transient status {status}")]
    Transient { status: u16 },
    #[error("malformed classifier response: {0}")]
    Malformed(String),
    #[error("classifier still failing after {attempts} attempts (last status {last_status})")]
    ExhaustedRetries { attempts: u32, last_status: u16 },
    #[error("classifier request failed: {0}")]
    Request(String),
    #[error("classifier api error ({status}): {body}")]
    Api { status: u16, body: String },
    #[error("invalid image url: {0}")]
    InvalidImageUrl(String),
}

impl ClassifierError {
    pub fn retryable(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }
}

/// Anything able to score an image. Injected into the decision engine.
#[async_trait]
pub trait VisionClassifier: Send + Sync {
    async fn analyze(&self, image_url: &str) -> Result<Analysis, ClassifierError>;

    /// Version recorded on results when no analysis came back.
    fn model_version(&self) -> String;
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
    pub temperature: f32,
    pub response_format: ResponseFormat,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: Vec<ContentPart>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrlContent },
}

#[derive(Debug, Clone, Serialize)]
pub struct ImageUrlContent {
    pub url: String,
    pub detail: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResponseFormat {
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

/// One HTTP round trip to the completion endpoint.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn send(&self, request: &ChatRequest) -> Result<TransportResponse, ClassifierError>;
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Delay after the zero-based `attempt` failed.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt)
    }
}

pub struct ClassifierClient<T> {
    transport: T,
    model: String,
    retry: RetryPolicy,
}

impl<T: ChatTransport> ClassifierClient<T> {
    pub fn new(transport: T, model: impl Into<String>) -> Self {
        Self {
            transport,
            model: model.into(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn build_request(&self, image_url: &str) -> ChatRequest {
        ChatRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: vec![
                    ContentPart::Text {
                        text: RUBRIC_PROMPT.to_string(),
                    },
                    ContentPart::ImageUrl {
                        image_url: ImageUrlContent {
                            url: image_url.to_string(),
                            detail: IMAGE_DETAIL.to_string(),
                        },
                    },
                ],
            }],
            max_tokens: MAX_TOKENS,
            temperature: TEMPERATURE,
            response_format: ResponseFormat {
                kind: "json_object".to_string(),
            },
        }
    }

    async fn send_with_retry(&self, request: &ChatRequest) -> Result<TransportResponse, ClassifierError> {
        let mut last_status = 0;
        for attempt in 0..self.retry.max_attempts {
            let response = self.transport.send(request).await?;
            let err = match check_status(&response) {
                Ok(()) => return Ok(response),
                Err(err) => err,
            };
            if !err.retryable() {
                return Err(err);
            }

            last_status = response.status;
            if attempt + 1 < self.retry.max_attempts {
                let delay = self.retry.delay_for(attempt);
                tracing::warn!(
                    error = %err,
                    attempt = attempt + 1,
                    max_attempts = self.retry.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    "classifier transient failure, backing off"
                );
                tokio::time::sleep(delay).await;
            }
        }

        Err(ClassifierError::ExhaustedRetries {
            attempts: self.retry.max_attempts,
            last_status,
        })
    }
}

#[async_trait]
impl<T: ChatTransport> VisionClassifier for ClassifierClient<T> {
    async fn analyze(&self, image_url: &str) -> Result<Analysis, ClassifierError> {
        validate_image_url(image_url)?;

        let started = Instant::now();
        let request = self.build_request(image_url);
        let response = self.send_with_retry(&request).await?;

        let completion: ChatCompletion = serde_json::from_str(&response.body)
            .map_err(|err| ClassifierError::Malformed(format!("invalid completion body: {}", err)))?;
        let content = completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| ClassifierError::Malformed("completion has no content".to_string()))?;

        let parsed = parse_analysis(&content)?;
        Ok(Analysis {
            is_safe: parsed.is_safe,
            overall_confidence: parsed.overall_confidence,
            categories: parsed.categories,
            reasoning: parsed.reasoning,
            model_version: completion.model.unwrap_or_else(|| self.model.clone()),
            processing_time_ms: started.elapsed().as_millis() as i64,
        })
    }

    fn model_version(&self) -> String {
        self.model.clone()
    }
}

#[derive(Deserialize)]
struct ChatCompletion {
    model: Option<String>,
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedAnalysis {
    pub is_safe: bool,
    pub overall_confidence: f64,
    pub categories: CategoryScores,
    pub reasoning: String,
}

fn is_transient(status: u16) -> bool {
    status == 429 || (500..600).contains(&status)
}

fn check_status(response: &TransportResponse) -> Result<(), ClassifierError> {
    match response.status {
        200..=299 => Ok(()),
        status if is_transient(status) => Err(ClassifierError::Transient { status }),
        status => Err(ClassifierError::Api {
            status,
            body: truncate(&response.body, 500),
        }),
    }
}

fn validate_image_url(image_url: &str) -> Result<(), ClassifierError> {
    let parsed = Url::parse(image_url)
        .map_err(|err| ClassifierError::InvalidImageUrl(format!("{}: {}", image_url, err)))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(ClassifierError::InvalidImageUrl(format!(
            "unsupported scheme {}",
            other
        ))),
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

/// Find the first balanced `{...}` in free-form text, ignoring braces inside
/// JSON strings.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }

    None
}

/// Validate and clamp the model's verdict.
pub fn parse_analysis(text: &str) -> Result<ParsedAnalysis, ClassifierError> {
    let json = extract_json_object(text)
        .ok_or_else(|| ClassifierError::Malformed("no JSON object found in response".to_string()))?;
    let value: Value = serde_json::from_str(json)
        .map_err(|err| ClassifierError::Malformed(format!("invalid JSON: {}", err)))?;

    let is_safe = value
        .get("is_safe")
        .and_then(Value::as_bool)
        .ok_or_else(|| ClassifierError::Malformed("missing boolean is_safe".to_string()))?;
    let overall_confidence = value
        .get("overall_confidence")
        .and_then(Value::as_f64)
        .ok_or_else(|| ClassifierError::Malformed("missing numeric overall_confidence".to_string()))?;
    let raw_categories = value
        .get("categories")
        .and_then(Value::as_object)
        .ok_or_else(|| ClassifierError::Malformed("missing categories object".to_string()))?;

    let mut categories = CategoryScores::default();
    for category in Category::ALL {
        let score = raw_categories
            .get(category.as_str())
            .and_then(Value::as_f64)
            .unwrap_or(0.0);
        categories.set(category, score);
    }

    let reasoning = value
        .get("reasoning")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    Ok(ParsedAnalysis {
        is_safe,
        overall_confidence: clamp_unit(overall_confidence),
        categories,
        reasoning,
    })
}
