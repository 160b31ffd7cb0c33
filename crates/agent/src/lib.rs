//! Agent runtime for the MooAI Slack assistant.
//!
//! This crate owns everything between a normalized conversation and the model:
//! - `llm` defines the model capability (`LlmClient`) and its request/response types
//! - `openai` implements that capability against the OpenAI Responses API
//! - `context` persists continuation handles per conversation (`ContextStore`)
//! - `invoker` issues one model call per turn and degrades failures into apologies
//!
//! # Continuation modes
//!
//! A deployment either replays the full thread on every call (stateless) or sends
//! only the newest message together with the stored continuation handle. The two
//! are never combined for one request.

pub mod context;
pub mod invoker;
pub mod llm;
pub mod openai;

pub use context::{ContextLease, ContextStore};
pub use invoker::{AgentInvoker, InvokeError};
pub use llm::{Completion, CompletionRequest, LlmClient, LlmError, ModelInput};
pub use openai::OpenAiResponsesClient;
