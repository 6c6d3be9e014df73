//! # Request Arguments
//!
//! Declarative argument specs and the parser that resolves them against the
//! parameters of one request.
//!
//! Resolution rules:
//! - an argument absent from the request takes its default, or is dropped
//!   from the result when it has none
//! - an explicit JSON `null` counts as present and is kept as null
//! - `required` rejects both absence and null
//! - `append` collects every occurrence into a list; `store` keeps the last

use serde_json::{Map, Value};
use thiserror::Error;

use crate::storage::value::parse_bool;

/// Parsed arguments, in spec order
pub type Args = Map<String, Value>;

/// Target type of an argument
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgType {
    Str,
    Int,
    Float,
    Bool,
    /// Structured JSON; text input is decoded
    Json,
}

impl ArgType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArgType::Str => "string",
            ArgType::Int => "integer",
            ArgType::Float => "number",
            ArgType::Bool => "boolean",
            ArgType::Json => "json",
        }
    }
}

/// Where an argument is read from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgSource {
    /// JSON request body
    Json,
    /// Query string
    Query,
    /// Urlencoded form body
    Form,
    /// Request headers, matched case-insensitively
    Headers,
    /// Query string, then form body
    Either,
}

impl ArgSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArgSource::Json => "the JSON body",
            ArgSource::Query => "the query string",
            ArgSource::Form => "the form body",
            ArgSource::Headers => "the request headers",
            ArgSource::Either => "the query string or form body",
        }
    }
}

/// Single value or every occurrence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgAction {
    Store,
    Append,
}

/// Argument parse failures, rendered as HTTP 400
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ArgError {
    /// Required argument absent or null
    #[error("Missing required parameter in {location}: {name}")]
    Missing { name: String, location: &'static str },

    /// Value could not be converted or is not an allowed choice
    #[error("{name}: {reason}")]
    Invalid { name: String, reason: String },

    /// Failure reported with the argument's help text
    #[error("{help}")]
    Help { name: String, help: String },
}

impl ArgError {
    /// Name of the offending argument
    pub fn name(&self) -> &str {
        match self {
            ArgError::Missing { name, .. }
            | ArgError::Invalid { name, .. }
            | ArgError::Help { name, .. } => name,
        }
    }
}

/// Parameters of an inbound request grouped by origin
#[derive(Debug, Clone, Default)]
pub struct RequestParams {
    pub query: Vec<(String, String)>,
    pub form: Vec<(String, String)>,
    pub json: Option<Map<String, Value>>,
    /// Header names are lowercase
    pub headers: Vec<(String, String)>,
}

impl RequestParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn with_form(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.form.push((key.into(), value.into()));
        self
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .push((key.into().to_ascii_lowercase(), value.into()));
        self
    }

    /// Use a JSON object as the body; other JSON values are ignored
    pub fn with_json(mut self, body: Value) -> Self {
        if let Value::Object(map) = body {
            self.json = Some(map);
        }
        self
    }
}

enum Raw<'a> {
    Text(&'a str),
    Json(&'a Value),
}

fn pairs<'a>(list: &'a [(String, String)], name: &str) -> Vec<Raw<'a>> {
    list.iter()
        .filter(|(k, _)| k.as_str() == name)
        .map(|(_, v)| Raw::Text(v.as_str()))
        .collect()
}

/// Declaration of one accepted parameter
#[derive(Debug, Clone)]
pub struct ArgumentSpec {
    pub name: String,
    pub arg_type: ArgType,
    pub required: bool,
    pub default: Option<Value>,
    pub help: Option<String>,
    pub action: ArgAction,
    pub source: ArgSource,
    pub choices: Option<Vec<Value>>,
}

impl ArgumentSpec {
    /// Optional string read from query string or form body
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            arg_type: ArgType::Str,
            required: false,
            default: None,
            help: None,
            action: ArgAction::Store,
            source: ArgSource::Either,
            choices: None,
        }
    }

    /// String argument from the JSON body
    pub fn json_str(name: impl Into<String>) -> Self {
        Self::new(name).source(ArgSource::Json)
    }

    /// Integer argument from the query string
    pub fn query_int(name: impl Into<String>) -> Self {
        Self::new(name).kind(ArgType::Int).source(ArgSource::Query)
    }

    pub fn kind(mut self, arg_type: ArgType) -> Self {
        self.arg_type = arg_type;
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn default_value(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    pub fn help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    pub fn append(mut self) -> Self {
        self.action = ArgAction::Append;
        self
    }

    pub fn source(mut self, source: ArgSource) -> Self {
        self.source = source;
        self
    }

    pub fn choices(mut self, choices: Vec<Value>) -> Self {
        self.choices = Some(choices);
        self
    }

    fn raw_values<'a>(&self, params: &'a RequestParams) -> Vec<Raw<'a>> {
        match self.source {
            ArgSource::Query => pairs(&params.query, &self.name),
            ArgSource::Form => pairs(&params.form, &self.name),
            ArgSource::Headers => pairs(&params.headers, &self.name.to_ascii_lowercase()),
            ArgSource::Either => {
                let mut raws = pairs(&params.query, &self.name);
                raws.extend(pairs(&params.form, &self.name));
                raws
            }
            ArgSource::Json => match params.json.as_ref().and_then(|m| m.get(&self.name)) {
                Some(Value::Array(items)) if self.action == ArgAction::Append => {
                    items.iter().map(Raw::Json).collect()
                }
                Some(value) => vec![Raw::Json(value)],
                None => Vec::new(),
            },
        }
    }

    /// Resolve this argument; `Ok(None)` means absent with no default
    pub fn resolve(&self, params: &RequestParams) -> Result<Option<Value>, ArgError> {
        let raws = self.raw_values(params);
        if raws.is_empty() {
            if self.required {
                return Err(self.missing());
            }
            return Ok(self.default.clone());
        }

        let mut values = Vec::with_capacity(raws.len());
        for raw in raws {
            values.push(self.convert(raw)?);
        }

        let value = match self.action {
            ArgAction::Append => Value::Array(values),
            ArgAction::Store => values.pop().unwrap_or(Value::Null),
        };
        Ok(Some(value))
    }

    fn convert(&self, raw: Raw<'_>) -> Result<Value, ArgError> {
        if let Raw::Json(Value::Null) = raw {
            if self.required {
                return Err(self.missing());
            }
            return Ok(Value::Null);
        }

        let value = match (self.arg_type, raw) {
            (ArgType::Str, Raw::Text(s)) => Some(Value::String(s.to_string())),
            (ArgType::Str, Raw::Json(Value::String(s))) => Some(Value::String(s.clone())),
            (ArgType::Str, Raw::Json(v @ (Value::Number(_) | Value::Bool(_)))) => {
                Some(Value::String(v.to_string()))
            }
            (ArgType::Int, Raw::Text(s)) => s.trim().parse::<i64>().ok().map(Value::from),
            (ArgType::Int, Raw::Json(Value::Number(n))) => n
                .as_i64()
                .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
                .map(Value::from),
            (ArgType::Int, Raw::Json(Value::String(s))) => {
                s.trim().parse::<i64>().ok().map(Value::from)
            }
            (ArgType::Float, Raw::Text(s)) => s.trim().parse::<f64>().ok().map(Value::from),
            (ArgType::Float, Raw::Json(Value::Number(n))) => n.as_f64().map(Value::from),
            (ArgType::Float, Raw::Json(Value::String(s))) => {
                s.trim().parse::<f64>().ok().map(Value::from)
            }
            (ArgType::Bool, Raw::Text(s)) => parse_bool(s).map(Value::Bool),
            (ArgType::Bool, Raw::Json(Value::Bool(b))) => Some(Value::Bool(*b)),
            (ArgType::Bool, Raw::Json(Value::Number(n))) => n.as_i64().map(|i| Value::Bool(i != 0)),
            (ArgType::Bool, Raw::Json(Value::String(s))) => parse_bool(s).map(Value::Bool),
            (ArgType::Json, Raw::Text(s)) => serde_json::from_str(s).ok(),
            (ArgType::Json, Raw::Json(v)) => Some(v.clone()),
            _ => None,
        };

        let value = value.ok_or_else(|| {
            self.invalid(format!("expected a valid {}", self.arg_type.as_str()))
        })?;

        if let Some(choices) = &self.choices {
            if !choices.contains(&value) {
                return Err(self.invalid(format!("{} is not a valid choice", value)));
            }
        }

        Ok(value)
    }

    fn missing(&self) -> ArgError {
        match &self.help {
            Some(help) => ArgError::Help {
                name: self.name.clone(),
                help: help.clone(),
            },
            None => ArgError::Missing {
                name: self.name.clone(),
                location: self.source.as_str(),
            },
        }
    }

    fn invalid(&self, reason: String) -> ArgError {
        match &self.help {
            Some(help) => ArgError::Help {
                name: self.name.clone(),
                help: help.clone(),
            },
            None => ArgError::Invalid {
                name: self.name.clone(),
                reason,
            },
        }
    }
}

/// Resolve every spec against the request, failing on the first bad argument
pub fn parse_args(specs: &[ArgumentSpec], params: &RequestParams) -> Result<Args, ArgError> {
    let mut args = Args::new();
    for spec in specs {
        if let Some(value) = spec.resolve(params)? {
            args.insert(spec.name.clone(), value);
        }
    }
    Ok(args)
}

/// Paging arguments accepted by every list operation
pub fn paging_specs() -> Vec<ArgumentSpec> {
    ["start", "number", "page", "per_page"]
        .into_iter()
        .map(ArgumentSpec::query_int)
        .collect()
}
