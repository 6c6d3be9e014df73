//! # Resource Pipeline
//!
//! Generic CRUD over storage models. A [`CrudResource`] declares which
//! operations it exposes, how arguments are parsed, how records are rendered
//! and which [`ResourceHooks`] customize each step. Every response is a
//! [`ResponseEnvelope`].
//!
//! ## Outcome classes
//!
//! - Argument errors: returned as [`ArgError`], rendered as HTTP 400
//! - Business failures (not found, already exists): FAILED envelope, HTTP 200
//! - System faults: logged with the request id, FAILED envelope with an
//!   operation-specific message; the cause never reaches the client

pub mod args;
pub mod context;
pub mod envelope;
pub mod errors;
pub mod filter;
pub mod hooks;
pub mod pipeline;
pub mod serializer;

pub use args::{
    parse_args, ArgAction, ArgError, ArgSource, ArgType, Args, ArgumentSpec, RequestParams,
};
pub use context::{PipelineContext, RequestScope};
pub use envelope::{messages, Reply, ResponseEnvelope, FAILED_CODE, SUCCESS_CODE};
pub use errors::{HookResult, Interrupt, ResourceError, ResourceResult};
pub use filter::{FilterTerm, FilterTranslator};
pub use hooks::{DefaultHooks, ResourceHooks};
pub use pipeline::{
    method_not_allowed, CrudResource, CrudResourceBuilder, Operation, Operations, PipelineResult,
};
pub use serializer::{DateFormat, RecordSerializer, SerializeError};
