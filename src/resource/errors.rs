//! # Resource Errors
//!
//! [`ResourceError`] covers system faults inside a pipeline run. Hooks end a
//! run early with an [`Interrupt`]: either a ready [`Reply`] or a fault.

use thiserror::Error;

use super::args::ArgError;
use super::envelope::Reply;
use super::serializer::SerializeError;
use crate::storage::StorageError;

/// Result type for resource operations
pub type ResourceResult<T> = Result<T, ResourceError>;

/// Result type for hooks
pub type HookResult<T> = Result<T, Interrupt>;

/// System faults raised during a pipeline run
#[derive(Debug, Clone, Error)]
pub enum ResourceError {
    /// Argument parsing failed
    #[error(transparent)]
    Args(#[from] ArgError),

    /// Storage layer failed
    #[error("storage failure: {0}")]
    Storage(#[from] StorageError),

    /// Record could not be serialized
    #[error("serialization failure: {0}")]
    Serialize(#[from] SerializeError),

    /// A hook reported a failure
    #[error("hook failure: {0}")]
    Hook(String),

    /// Resource declaration is inconsistent with its model
    #[error("invalid resource configuration: {0}")]
    Config(String),
}

impl ResourceError {
    pub fn hook(message: impl Into<String>) -> Self {
        ResourceError::Hook(message.into())
    }
}

/// Early exit from a pipeline run
#[derive(Debug)]
pub enum Interrupt {
    /// Send this reply as-is; pending writes are rolled back
    Respond(Reply),
    /// Abort with a system fault
    Fault(ResourceError),
}

impl From<ResourceError> for Interrupt {
    fn from(err: ResourceError) -> Self {
        Interrupt::Fault(err)
    }
}

impl From<StorageError> for Interrupt {
    fn from(err: StorageError) -> Self {
        Interrupt::Fault(err.into())
    }
}

impl From<SerializeError> for Interrupt {
    fn from(err: SerializeError) -> Self {
        Interrupt::Fault(err.into())
    }
}

impl From<Reply> for Interrupt {
    fn from(reply: Reply) -> Self {
        Interrupt::Respond(reply)
    }
}

/// Render an error with its chain of sources
pub fn error_chain(err: &dyn std::error::Error) -> String {
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        out.push_str(": ");
        out.push_str(&cause.to_string());
        source = cause.source();
    }
    out
}
