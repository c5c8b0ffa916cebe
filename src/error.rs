//! Error types.
//!
//! [`RenderError`] covers the failure modes of the render core:
//!
//! - `Validation` is raised synchronously when a batch request is submitted
//!   with a missing or disposed resource. Nothing is enqueued.
//! - `ResourceExhausted` is surfaced to whoever asked the backend for a new
//!   buffer/texture/framebuffer/program.
//! - `Backend` aborts the remainder of the current frame.
//! - `LoadFailure` reports an asset that could not be fetched or decoded. The
//!   matching progress item has already been ended when this is returned.
//!
//! Stale reads from a disposed cache are not errors: they log a warning and
//! yield `None`.

use thiserror::Error;

use crate::backend::{BackendError, ResourceId};

pub type Result<T> = std::result::Result<T, RenderError>;

#[derive(Error, Debug)]
pub enum RenderError {
    /// A batch request was rejected at submission.
    #[error("invalid batch request {request}: {reason}")]
    Validation { request: String, reason: String },

    /// The backend could not allocate a resource.
    #[error("out of {kind} memory: {reason}")]
    ResourceExhausted { kind: &'static str, reason: String },

    /// The backend failed while executing a frame.
    #[error("backend error: {0}")]
    Backend(BackendError),

    /// An asset load failed in transport or decoding.
    #[error("failed to load asset '{id}': {reason}")]
    LoadFailure { id: String, reason: String },

    /// The component has been disposed.
    #[error("{component} has been disposed")]
    Disposed { component: &'static str },
}

impl RenderError {
    pub(crate) fn invalid(request: impl Into<String>, reason: impl Into<String>) -> Self {
        RenderError::Validation {
            request: request.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn dead_resource(request: impl Into<String>, resource: ResourceId) -> Self {
        RenderError::invalid(
            request,
            format!("{resource:?} is disposed or was never created"),
        )
    }
}

impl From<BackendError> for RenderError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::OutOfMemory { kind, reason } => {
                RenderError::ResourceExhausted { kind, reason }
            }
            other => RenderError::Backend(other),
        }
    }
}
