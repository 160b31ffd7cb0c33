use serde::{Deserialize, Serialize};

pub const ERROR_MESSAGE_TITLE: &str = "Error Encountered";

/// Apology shown in place of a model answer when the backend call fails.
pub fn apology(error: &str) -> String {
    format!("I'm sorry, I encountered an error while generating a response: {error}")
}

/// Model output carrying presentation hints beyond the answer text.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuredResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_title: Option<String>,
    pub response: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub followups: Option<Vec<String>>,
}

impl StructuredResult {
    pub fn degraded(error: &str) -> Self {
        Self {
            thread_title: None,
            message_title: Some(ERROR_MESSAGE_TITLE.to_owned()),
            response: apology(error),
            followups: None,
        }
    }

    /// Follow-ups in the shape the platform expects; empty when there are none.
    pub fn suggested_prompts(&self) -> Vec<SuggestedPrompt> {
        self.followups
            .iter()
            .flatten()
            .filter(|followup| !followup.trim().is_empty())
            .map(|followup| SuggestedPrompt::same(followup.clone()))
            .collect()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuggestedPrompt {
    pub title: String,
    pub message: String,
}

impl SuggestedPrompt {
    pub fn same(text: impl Into<String>) -> Self {
        let text = text.into();
        Self { title: text.clone(), message: text }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AgentReply {
    Text(String),
    Structured(StructuredResult),
}
