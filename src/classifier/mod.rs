pub mod shape;

use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::batch::InputBatch;
use crate::taxonomy::TrackRecord;

pub use shape::{ResponseShape, decode_tracks, extract_track_list};

#[derive(Error, Debug)]
pub enum ClassifyError {
    #[error("HTTP request failed for {id}: {source}")]
    Http {
        id: String,
        #[source]
        source: ureq::Error,
    },
    #[error("Service returned no message content for {0}")]
    NoContent(String),
    #[error("Service returned invalid JSON for {id}: {source}")]
    InvalidJson {
        id: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("Failed to encode batch {id}: {source}")]
    Encode {
        id: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Outcome of one successful service call.
#[derive(Debug, Default)]
pub struct Classified {
    pub tracks: Vec<TrackRecord>,
    /// Entries the service returned that didn't decode into a valid record.
    pub rejected: usize,
}

/// Anything that can turn a batch of file references into track records.
pub trait Classifier {
    fn classify(&self, batch: &InputBatch) -> Result<Classified, ClassifyError>;
}

/// Turn the service's message content into records.
pub fn decode_response(batch_id: &str, content: &str) -> Result<Classified, ClassifyError> {
    let value: serde_json::Value =
        serde_json::from_str(content).map_err(|source| ClassifyError::InvalidJson {
            id: batch_id.to_string(),
            source,
        })?;
    let items = extract_track_list(value);
    let (tracks, rejected) = decode_tracks(batch_id, items);
    Ok(Classified { tracks, rejected })
}

/// Settings for [`ChatClassifier`].
#[derive(Debug, Clone)]
pub struct ChatSettings {
    /// Base URL of an OpenAI-compatible API, e.g. `https://api.openai.com/v1`.
    pub api_base: String,
    pub api_key: String,
    pub model: String,
    pub instructions: String,
    /// Sleep after every call, successful or not.
    pub pacing: Duration,
    /// Request temperature 0.
    pub deterministic: bool,
    pub timeout: Option<Duration>,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    response_format: ResponseFormat,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

/// Chat completions response (partial, we only need the first message).
#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    content: Option<String>,
}

/// How the classifier waits out its pacing interval.
pub type Pause = Box<dyn Fn(Duration) + Send + Sync>;

/// Classifier backed by an OpenAI-compatible `/chat/completions` endpoint.
pub struct ChatClassifier {
    agent: ureq::Agent,
    settings: ChatSettings,
    pause: Pause,
}

impl ChatClassifier {
    pub fn new(settings: ChatSettings) -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(settings.timeout)
            .build()
            .into();
        Self {
            agent,
            settings,
            pause: Box::new(thread::sleep),
        }
    }

    /// Replace the blocking sleep between calls.
    pub fn with_pause(mut self, pause: impl Fn(Duration) + Send + Sync + 'static) -> Self {
        self.pause = Box::new(pause);
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.settings.api_base.trim_end_matches('/'))
    }

    fn build_request<'a>(&'a self, user_content: &'a str) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.settings.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &self.settings.instructions,
                },
                ChatMessage {
                    role: "user",
                    content: user_content,
                },
            ],
            response_format: ResponseFormat {
                kind: "json_object",
            },
            temperature: self.settings.deterministic.then_some(0.0),
        }
    }

    /// Send one request and return the raw message content.
    fn request(&self, batch: &InputBatch) -> Result<String, ClassifyError> {
        let records =
            serde_json::to_string(&batch.records).map_err(|source| ClassifyError::Encode {
                id: batch.id.clone(),
                source,
            })?;
        let user_content = user_message(&records);
        let body = self.build_request(&user_content);

        let url = self.endpoint();
        log::debug!("POST {url} ({} records, model {})", batch.records.len(), self.settings.model);

        let http = |source| ClassifyError::Http {
            id: batch.id.clone(),
            source,
        };
        let response: ChatResponse = self
            .agent
            .post(url.as_str())
            .header("Authorization", format!("Bearer {}", self.settings.api_key))
            .send_json(&body)
            .map_err(http)?
            .body_mut()
            .read_json()
            .map_err(http)?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ClassifyError::NoContent(batch.id.clone()))
    }
}

impl Classifier for ChatClassifier {
    fn classify(&self, batch: &InputBatch) -> Result<Classified, ClassifyError> {
        let content = self.request(batch);

        // Rate limit: fixed pause between sequential requests
        if !self.settings.pacing.is_zero() {
            (self.pause)(self.settings.pacing);
        }

        decode_response(&batch.id, &content?)
    }
}

fn user_message(records_json: &str) -> String {
    format!("Classify this list of audio files: {records_json}")
}
