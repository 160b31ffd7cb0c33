use std::sync::Arc;

use thiserror::Error;
use tracing::{error, info};

use mooai_core::domain::conversation::ConversationKey;
use mooai_core::domain::reply::{apology, AgentReply, StructuredResult};
use mooai_core::domain::turn::Turn;
use mooai_core::prompts::SYSTEM_INSTRUCTIONS;
use mooai_db::repositories::RepositoryError;

use crate::context::ContextStore;
use crate::llm::{CompletionRequest, LlmClient, LlmError};

#[derive(Debug, Error)]
pub enum InvokeError {
    #[error("refusing to call the model without any turns")]
    EmptyConversation,
    #[error("refusing to call the model with an empty message")]
    EmptyMessage,
    #[error(transparent)]
    Store(#[from] RepositoryError),
}

/// Issues exactly one model call per invocation and never retries.
///
/// Model failures come back as degraded replies rather than errors. Only contract
/// violations by the caller and Context Store failures surface as `InvokeError`.
pub struct AgentInvoker {
    llm: Arc<dyn LlmClient>,
    context: Arc<ContextStore>,
}

impl AgentInvoker {
    pub fn new(llm: Arc<dyn LlmClient>, context: Arc<ContextStore>) -> Self {
        Self { llm, context }
    }

    pub fn context(&self) -> &Arc<ContextStore> {
        &self.context
    }

    /// Stateless mode: the whole conversation goes to the model.
    pub async fn invoke(
        &self,
        turns: &[Turn],
        system_instructions: Option<&str>,
        structured: bool,
    ) -> Result<AgentReply, InvokeError> {
        if turns.is_empty() {
            return Err(InvokeError::EmptyConversation);
        }

        let request = CompletionRequest::turns(turns.to_vec())
            .with_instructions(Some(system_instructions.unwrap_or(SYSTEM_INSTRUCTIONS).to_owned()))
            .structured(structured);

        let outcome = self.llm.complete(request).await.and_then(|completion| {
            if structured {
                parse_structured(&completion.text).map(AgentReply::Structured)
            } else {
                Ok(AgentReply::Text(completion.text))
            }
        });

        match outcome {
            Ok(reply) => {
                info!(
                    event_name = "agent.invoke.completed",
                    turns = turns.len(),
                    structured,
                    "model reply received"
                );
                Ok(reply)
            }
            Err(llm_error) => {
                error!(
                    event_name = "agent.invoke.failed",
                    error = %llm_error,
                    turns = turns.len(),
                    structured,
                    "model call failed, returning degraded reply"
                );
                Ok(degraded(&llm_error, structured))
            }
        }
    }

    /// Continuation mode: only `message` is sent, along with the stored handle.
    ///
    /// The new handle is persisted before the text is returned. The read, the call,
    /// and the write hold the conversation's lease so concurrent turns in one thread
    /// cannot lose each other's handle.
    pub async fn invoke_single(
        &self,
        key: &ConversationKey,
        message: &str,
        system_instructions: Option<&str>,
    ) -> Result<String, InvokeError> {
        if message.trim().is_empty() {
            return Err(InvokeError::EmptyMessage);
        }

        let lease = self.context.lease(key).await;
        let previous_response_id = lease.get().await?;

        let request = CompletionRequest::message(message)
            .with_instructions(Some(system_instructions.unwrap_or(SYSTEM_INSTRUCTIONS).to_owned()))
            .with_previous_response_id(previous_response_id.clone());

        match self.llm.complete(request).await {
            Ok(completion) => {
                if let Some(response_id) = completion.response_id.as_deref() {
                    lease.put(response_id).await?;
                }
                info!(
                    event_name = "agent.invoke_single.completed",
                    conversation = %key,
                    resumed = previous_response_id.is_some(),
                    "model reply received"
                );
                Ok(completion.text)
            }
            Err(llm_error) => {
                error!(
                    event_name = "agent.invoke_single.failed",
                    conversation = %key,
                    error = %llm_error,
                    "model call failed, returning apology"
                );
                Ok(apology(&llm_error.to_string()))
            }
        }
    }
}

fn degraded(error: &LlmError, structured: bool) -> AgentReply {
    let detail = error.to_string();
    if structured {
        AgentReply::Structured(StructuredResult::degraded(&detail))
    } else {
        AgentReply::Text(apology(&detail))
    }
}

/// Decodes a structured reply. A missing `response` field is rejected.
pub fn parse_structured(text: &str) -> Result<StructuredResult, LlmError> {
    let trimmed = text.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|inner| inner.strip_suffix("```"))
        .map(str::trim)
        .unwrap_or(trimmed);

    serde_json::from_str::<StructuredResult>(body)
        .map_err(|error| LlmError::InvalidStructuredOutput(error.to_string()))
}
