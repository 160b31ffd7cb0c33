use async_trait::async_trait;
use thiserror::Error;

use mooai_core::domain::turn::Turn;

/// What the model sees as input for one call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ModelInput {
    /// Full conversation replay, oldest turn first.
    Turns(Vec<Turn>),
    /// Only the newest user message; earlier context lives behind a continuation handle.
    Message(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompletionRequest {
    pub input: ModelInput,
    pub instructions: Option<String>,
    pub previous_response_id: Option<String>,
    pub structured: bool,
}

impl CompletionRequest {
    pub fn turns(turns: Vec<Turn>) -> Self {
        Self {
            input: ModelInput::Turns(turns),
            instructions: None,
            previous_response_id: None,
            structured: false,
        }
    }

    pub fn message(message: impl Into<String>) -> Self {
        Self {
            input: ModelInput::Message(message.into()),
            instructions: None,
            previous_response_id: None,
            structured: false,
        }
    }

    pub fn with_instructions(mut self, instructions: Option<String>) -> Self {
        self.instructions = instructions;
        self
    }

    pub fn with_previous_response_id(mut self, previous_response_id: Option<String>) -> Self {
        self.previous_response_id = previous_response_id;
        self
    }

    pub fn structured(mut self, structured: bool) -> Self {
        self.structured = structured;
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Completion {
    pub text: String,
    /// Continuation handle for the next call, when the backend issues one.
    pub response_id: Option<String>,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum LlmError {
    #[error("model transport failure: {0}")]
    Transport(String),
    #[error("model backend returned {status}: {message}")]
    Api { status: u16, message: String },
    #[error("could not decode model response: {0}")]
    Decode(String),
    #[error("model returned no output text")]
    EmptyOutput,
    #[error("structured output did not match the expected shape: {0}")]
    InvalidStructuredOutput(String),
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion, LlmError>;
}
