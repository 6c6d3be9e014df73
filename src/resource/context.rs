//! # Pipeline Context
//!
//! Per-request state threaded through every hook of one operation.

use std::sync::Arc;

use super::args::Args;
use super::envelope::Reply;
use super::errors::Interrupt;
use super::pipeline::Operation;
use crate::storage::{ModelSchema, Record, Session};

/// Who is calling and under which request id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestScope {
    pub request_id: String,
    /// Subject of a validated bearer token
    pub identity: Option<String>,
}

impl RequestScope {
    pub fn new(request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            identity: None,
        }
    }

    pub fn with_identity(mut self, identity: impl Into<String>) -> Self {
        self.identity = Some(identity.into());
        self
    }
}

/// Scratch state of one operation run
pub struct PipelineContext<'s> {
    scope: RequestScope,
    operation: Operation,
    model: Arc<ModelSchema>,
    session: &'s mut dyn Session,
    /// Parsed arguments; hooks may rewrite them
    pub args: Args,
    /// Filtered row count of a list run, set before sorting and paging
    pub total: Option<usize>,
    /// Record produced by a create run, handed to the commit hook
    pub(crate) created: Option<Record>,
}

impl<'s> PipelineContext<'s> {
    pub fn new(
        scope: RequestScope,
        operation: Operation,
        model: Arc<ModelSchema>,
        args: Args,
        session: &'s mut dyn Session,
    ) -> Self {
        Self {
            scope,
            operation,
            model,
            session,
            args,
            total: None,
            created: None,
        }
    }

    pub fn request_id(&self) -> &str {
        &self.scope.request_id
    }

    pub fn identity(&self) -> Option<&str> {
        self.scope.identity.as_deref()
    }

    pub fn operation(&self) -> Operation {
        self.operation
    }

    pub fn model(&self) -> &ModelSchema {
        &self.model
    }

    pub fn model_arc(&self) -> Arc<ModelSchema> {
        Arc::clone(&self.model)
    }

    /// Session for reads
    pub fn session(&self) -> &dyn Session {
        &*self.session
    }

    /// Session for writes
    pub fn session_mut(&mut self) -> &mut dyn Session {
        &mut *self.session
    }

    /// Business failure reply for this request, as an interrupt
    pub fn fail(&self, message: impl Into<String>) -> Interrupt {
        Interrupt::Respond(Reply::failed(self.request_id(), message))
    }
}
