use thiserror::Error;

use crate::domain::thread_state::ThreadTransitionError;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("missing conversation identity: {0}")]
    MissingIdentity(String),
    #[error(transparent)]
    ThreadTransition(#[from] ThreadTransitionError),
}
