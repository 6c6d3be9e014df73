//! restbase - declarative CRUD resources over HTTP
//!
//! A resource couples a storage model with argument declarations, a record
//! serializer and optional hooks; the pipeline turns each request into one
//! transactional run that answers with a uniform response envelope.

pub mod auth;
pub mod cli;
pub mod config;
pub mod demo;
pub mod http_server;
pub mod logging;
pub mod resource;
pub mod storage;
pub mod tasks;
