use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to load `{id}`: {reason}")]
    Failed { id: Arc<str>, reason: String },

    #[error("`{id}` was loaded, but it is not a `{expected}`")]
    TypeMismatch { id: Arc<str>, expected: &'static str },

    #[error("prefab `{id}` has no `{component}` component")]
    MissingComponent {
        id: Arc<str>,
        component: &'static str,
    },

    #[error("timed out after {after:?} waiting for `{id}`")]
    Timeout { id: Arc<str>, after: Duration },

    #[error("completion of `{id}` was signalled without a result")]
    Unresolved { id: Arc<str> },
}

impl LoadError {
    /// Identifier of the resource the failed load was issued for.
    pub fn id(&self) -> &str {
        match self {
            LoadError::Failed { id, .. }
            | LoadError::TypeMismatch { id, .. }
            | LoadError::MissingComponent { id, .. }
            | LoadError::Timeout { id, .. }
            | LoadError::Unresolved { id } => id,
        }
    }
}
