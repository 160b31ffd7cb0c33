use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use mooai_core::config::LlmConfig;
use mooai_core::domain::turn::{ContentPart, Role, Turn, TurnContent};

use crate::llm::{Completion, CompletionRequest, LlmClient, LlmError, ModelInput};

const STRUCTURED_FORMAT_NAME: &str = "structured_response";

/// Client for the OpenAI Responses API (`POST {base_url}/responses`).
#[derive(Clone)]
pub struct OpenAiResponsesClient {
    client: Client,
    base_url: String,
    api_key: SecretString,
    model: String,
}

impl OpenAiResponsesClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: SecretString,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(timeout)
            .build()
            .unwrap_or_else(|error| {
                warn!(error = %error, "failed to build tuned http client, using defaults");
                Client::new()
            });

        Self { client, base_url: base_url.into(), api_key, model: model.into() }
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| LlmError::Transport("llm.api_key is not configured".to_owned()))?;
        Ok(Self::new(
            config.base_url.clone(),
            api_key,
            config.model.clone(),
            Duration::from_secs(config.timeout_secs),
        ))
    }

    fn build_body(&self, request: &CompletionRequest) -> Value {
        let input = match &request.input {
            ModelInput::Message(message) => Value::String(message.clone()),
            ModelInput::Turns(turns) => Value::Array(turns.iter().map(turn_to_input).collect()),
        };

        let mut body = json!({
            "model": self.model,
            "input": input,
        });

        if let Some(instructions) = &request.instructions {
            body["instructions"] = Value::String(instructions.clone());
        }
        if let Some(previous_response_id) = &request.previous_response_id {
            body["previous_response_id"] = Value::String(previous_response_id.clone());
        }
        if request.structured {
            body["text"] = json!({ "format": structured_format() });
        }

        body
    }
}

fn turn_to_input(turn: &Turn) -> Value {
    let content = match &turn.content {
        TurnContent::Text(text) => Value::String(text.clone()),
        TurnContent::Parts(parts) => Value::Array(
            parts.iter().filter_map(|part| part_to_input(turn.role, part)).collect(),
        ),
    };
    json!({ "role": turn.role.as_str(), "content": content })
}

fn part_to_input(role: Role, part: &ContentPart) -> Option<Value> {
    match (role, part) {
        (Role::User, ContentPart::Text { value }) => {
            Some(json!({ "type": "input_text", "text": value }))
        }
        (Role::Assistant, ContentPart::Text { value }) => {
            Some(json!({ "type": "output_text", "text": value }))
        }
        (Role::User, ContentPart::Image { .. }) => {
            Some(json!({ "type": "input_image", "image_url": part.data_url() }))
        }
        (Role::User, ContentPart::Document { filename, .. }) => Some(json!({
            "type": "input_file",
            "filename": filename,
            "file_data": part.data_url(),
        })),
        // The backend only accepts binary inputs on user turns.
        (Role::Assistant, _) => {
            debug!("dropping binary content part from assistant turn");
            None
        }
    }
}

/// JSON schema for the structured reply. Strict mode requires every key, so the
/// optional ones are nullable instead of omitted.
fn structured_format() -> Value {
    json!({
        "type": "json_schema",
        "name": STRUCTURED_FORMAT_NAME,
        "strict": true,
        "schema": {
            "type": "object",
            "additionalProperties": false,
            "required": ["thread_title", "message_title", "response", "followups"],
            "properties": {
                "thread_title": {
                    "type": ["string", "null"],
                    "description": "Title for the thread, used to update the assistant thread title"
                },
                "message_title": {
                    "type": ["string", "null"],
                    "description": "Title for the message, displayed as a header above the response"
                },
                "response": {
                    "type": "string",
                    "description": "The main response content in markdown format"
                },
                "followups": {
                    "type": ["array", "null"],
                    "items": { "type": "string" },
                    "description": "Suggested follow-up prompts for the user"
                }
            }
        }
    })
}

#[derive(Debug, Deserialize)]
struct ResponsesPayload {
    id: Option<String>,
    #[serde(default)]
    output: Vec<OutputItem>,
    error: Option<ApiErrorBody>,
}

#[derive(Debug, Deserialize)]
struct OutputItem {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    content: Vec<OutputContent>,
}

#[derive(Debug, Deserialize)]
struct OutputContent {
    #[serde(rename = "type")]
    kind: String,
    text: Option<String>,
    refusal: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorEnvelope {
    error: Option<ApiErrorBody>,
}

fn collect_output_text(payload: &ResponsesPayload) -> String {
    payload
        .output
        .iter()
        .filter(|item| item.kind == "message")
        .flat_map(|item| item.content.iter())
        .filter_map(|content| match content.kind.as_str() {
            "output_text" => content.text.as_deref(),
            "refusal" => content.refusal.as_deref(),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("")
}

#[async_trait]
impl LlmClient for OpenAiResponsesClient {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion, LlmError> {
        let url = format!("{}/responses", self.base_url.trim_end_matches('/'));
        let body = self.build_body(&request);

        debug!(
            url = %url,
            model = %self.model,
            structured = request.structured,
            has_previous_response = request.previous_response_id.is_some(),
            "sending model request"
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(self.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|error| LlmError::Transport(error.to_string()))?;

        let status = response.status();
        let raw = response.text().await.map_err(|error| LlmError::Transport(error.to_string()))?;

        if !status.is_success() {
            let message = serde_json::from_str::<ApiErrorEnvelope>(&raw)
                .ok()
                .and_then(|envelope| envelope.error)
                .and_then(|error| error.message)
                .unwrap_or(raw);
            return Err(LlmError::Api { status: status.as_u16(), message });
        }

        let payload: ResponsesPayload =
            serde_json::from_str(&raw).map_err(|error| LlmError::Decode(error.to_string()))?;

        if let Some(error) = payload.error.as_ref().and_then(|error| error.message.clone()) {
            return Err(LlmError::Api { status: status.as_u16(), message: error });
        }

        let text = collect_output_text(&payload);
        if text.is_empty() {
            return Err(LlmError::EmptyOutput);
        }

        Ok(Completion { text, response_id: payload.id })
    }
}
