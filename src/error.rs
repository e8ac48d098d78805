use thiserror::Error;

use crate::backend::backend_error;
use crate::notify::{Notice, Notifier};

/// Failure of a user-initiated action.
#[derive(Debug, Error)]
pub enum ActionError {
    #[error("{0}")]
    Validation(String),

    #[error("No active group selected")]
    NoActiveGroup,

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Backend(String),

    #[error("Not logged in or session expired")]
    LoginRequired,
}

impl ActionError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Classify a gateway failure. Auth failures become [`ActionError::LoginRequired`].
    pub fn from_gateway(err: &anyhow::Error, what: &str) -> Self {
        match backend_error(err) {
            Some(be) if be.is_unauthorized() => Self::LoginRequired,
            Some(be) => Self::Backend(format!("{what}: {}", be.message)),
            None => Self::Backend(format!("{what}: {err}")),
        }
    }

    /// Raise the matching toast.
    pub fn report(&self, notifier: &dyn Notifier) {
        match self {
            Self::LoginRequired => notifier.push(Notice::LoginRequired),
            other => notifier.error(&other.to_string()),
        }
    }
}

impl From<anyhow::Error> for ActionError {
    fn from(err: anyhow::Error) -> Self {
        Self::from_gateway(&err, "Request failed")
    }
}

pub type ActionResult<T> = Result<T, ActionError>;
