use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Lifecycle of one assistant thread. Threads are abandoned rather than closed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ThreadState {
    #[default]
    New,
    AwaitingFirstMessage,
    Processing,
    Responded,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ThreadEvent {
    ThreadStarted,
    UserMessageReceived,
    ReplyDelivered,
    ReplySettled,
    Failed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ThreadAction {
    SendGreeting,
    SetStarterPrompts,
    SetThinkingStatus,
    InvokeAgent,
    NotifyError,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadTransition {
    pub from: ThreadState,
    pub to: ThreadState,
    pub event: ThreadEvent,
    pub actions: Vec<ThreadAction>,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ThreadTransitionError {
    #[error("invalid thread transition from {state:?} using event {event:?}")]
    InvalidTransition { state: ThreadState, event: ThreadEvent },
}

impl ThreadState {
    pub fn apply(self, event: ThreadEvent) -> Result<ThreadTransition, ThreadTransitionError> {
        use ThreadAction::{
            InvokeAgent, NotifyError, SendGreeting, SetStarterPrompts, SetThinkingStatus,
        };
        use ThreadEvent::{
            Failed, ReplyDelivered, ReplySettled, ThreadStarted, UserMessageReceived,
        };
        use ThreadState::{AwaitingFirstMessage, New, Processing, Responded};

        let (to, actions) = match (self, event) {
            (_, Failed) => (AwaitingFirstMessage, vec![NotifyError]),
            (New, ThreadStarted) => (AwaitingFirstMessage, vec![SendGreeting, SetStarterPrompts]),
            // Channel threads reached through a mention never see a start event, and a
            // message can land between delivery and settling.
            (New | AwaitingFirstMessage | Responded, UserMessageReceived) => {
                (Processing, vec![SetThinkingStatus, InvokeAgent])
            }
            // A second message that arrives mid-call is answered after the first.
            (Processing, UserMessageReceived) => (Processing, vec![InvokeAgent]),
            (Processing, ReplyDelivered) => (Responded, Vec::new()),
            (Responded, ReplySettled) => (AwaitingFirstMessage, Vec::new()),
            (state, event) => {
                return Err(ThreadTransitionError::InvalidTransition { state, event });
            }
        };

        Ok(ThreadTransition { from: self, to, event, actions })
    }
}
