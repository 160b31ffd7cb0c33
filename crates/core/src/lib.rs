pub mod attachments;
pub mod config;
pub mod domain;
pub mod errors;
pub mod prompts;

pub use attachments::{AdmissionRejection, AttachmentBudget, AttachmentLimits, FileKind};
pub use domain::conversation::{ContinuationRecord, ConversationKey};
pub use domain::reply::{AgentReply, StructuredResult, SuggestedPrompt};
pub use domain::thread_state::{
    ThreadAction, ThreadEvent, ThreadState, ThreadTransition, ThreadTransitionError,
};
pub use domain::turn::{ContentPart, Role, Turn, TurnContent};
pub use errors::DomainError;
