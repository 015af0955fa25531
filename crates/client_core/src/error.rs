use std::time::Duration;

use thiserror::Error;

use crate::{auth::AuthError, backend::BackendError, pipeline::PipelineError};

#[derive(Debug, Clone, Error)]
pub enum ActionError {
    #[error("{0}")]
    Validation(String),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error("{operation} timed out after {}s", limit.as_secs())]
    Timeout {
        operation: &'static str,
        limit: Duration,
    },
    #[error("no user is signed in")]
    NotSignedIn,
    /// The session changed while the action was running; its result was
    /// discarded.
    #[error("{0} was superseded by a session change")]
    Superseded(&'static str),
}
