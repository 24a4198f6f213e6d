//! Step-level error type.

use thiserror::Error;

/// Errors returned by a handler's `execute` method.
///
/// The engine does not distinguish between variants: any error aborts the
/// run and is reported against the failing step.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StepError {
    /// The external call (or the handler's own validation) failed.
    #[error("{0}")]
    Failed(String),

    /// The handler needs a credential the run was not given.
    #[error("missing credentials for service '{0}'")]
    CredentialsMissing(String),
}

impl StepError {
    /// Shorthand for [`StepError::Failed`].
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::Failed(msg.into())
    }
}
