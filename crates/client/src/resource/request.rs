//! Request construction, input validation and cache identity.

use jsonschema::{Draft, JSONSchema};
use rescache_core::cache::compute_data_hash;
use rescache_core::{CacheIdentity, Configuration, Error, Method, RequestDescriptor};
use serde_json::{Map, Value};

use super::ResourceKind;
use super::params::without_auth;
use crate::fetch::{parse, resolve_template, set_query_params, uri_from_url};

/// What a resource accepts for one kind of request input.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum ArgumentSchema {
    /// Any input is rejected.
    Forbidden,
    /// Input is accepted without checks.
    #[default]
    Any,
    /// Input must validate against this JSON Schema (draft 7).
    Schema(Value),
}

impl ArgumentSchema {
    fn check(&self, what: &str, instance: &Value, supplied: bool) -> Result<(), Error> {
        match self {
            ArgumentSchema::Forbidden if supplied => {
                Err(Error::Validation(format!("received {what} for request where there should be none")))
            }
            ArgumentSchema::Forbidden | ArgumentSchema::Any => Ok(()),
            ArgumentSchema::Schema(schema) => validate_schema(schema, instance),
        }
    }
}

/// Accepted positional and keyword input for one method.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MethodSchema {
    pub args: ArgumentSchema,
    pub kwargs: ArgumentSchema,
}

impl MethodSchema {
    /// Accept neither positional nor keyword input.
    pub fn none() -> Self {
        Self { args: ArgumentSchema::Forbidden, kwargs: ArgumentSchema::Forbidden }
    }

    pub fn with_args(mut self, args: ArgumentSchema) -> Self {
        self.args = args;
        self
    }

    pub fn with_kwargs(mut self, kwargs: ArgumentSchema) -> Self {
        self.kwargs = kwargs;
        self
    }
}

fn validate_schema(schema: &Value, instance: &Value) -> Result<(), Error> {
    let compiled = JSONSchema::options()
        .with_draft(Draft::Draft7)
        .compile(schema)
        .map_err(|e| Error::Validation(format!("invalid argument schema: {e}")))?;

    if let Err(errors) = compiled.validate(instance) {
        let messages: Vec<String> = errors.map(|e| e.to_string()).collect();
        return Err(Error::Validation(messages.join("; ")));
    }
    Ok(())
}

/// Check caller input against the kind's schema for `method`.
pub fn validate_input<K: ResourceKind + ?Sized>(
    kind: &K, method: Method, args: &[Value], kwargs: &Map<String, Value>,
) -> Result<(), Error> {
    let schema = kind.schema(method);
    schema
        .args
        .check("arguments", &Value::Array(args.to_vec()), !args.is_empty())?;
    schema
        .kwargs
        .check("keyword arguments", &Value::Object(kwargs.clone()), !kwargs.is_empty())?;
    Ok(())
}

/// Check a stored or replayed request before it is sent again.
pub fn validate_request<K: ResourceKind + ?Sized>(kind: &K, request: &RequestDescriptor) -> Result<(), Error> {
    validate_input(kind, request.method, &request.args, &request.kwargs)
}

/// Build a request from caller input.
///
/// The URL is the kind's template filled with `args`, with the kind's
/// parameters merged into the query. Keyword input becomes the body for
/// anything but GET.
pub fn build_request<K: ResourceKind + ?Sized>(
    kind: &K, config: &Configuration, method: Method, args: Vec<Value>, kwargs: Map<String, Value>,
) -> Result<RequestDescriptor, Error> {
    validate_input(kind, method, &args, &kwargs)?;

    let mut url = parse(&resolve_template(kind.uri_template(), &args)?)?;
    set_query_params(&mut url, &kind.parameters(config, &kwargs));

    let data = match method {
        Method::Get => None,
        _ => kind.data(config, &kwargs),
    };

    Ok(RequestDescriptor { method, args, kwargs, url: url.to_string(), headers: kind.headers(config), data })
}

/// The cache identity of a request: auth parameters and scheme stripped
/// from the URL, plus the body hash.
pub fn canonical_identity<K: ResourceKind + ?Sized>(
    kind: &K, config: &Configuration, request: &RequestDescriptor,
) -> Result<CacheIdentity, Error> {
    let stripped = without_auth(kind, config, request)?;
    let url = parse(&stripped.url)?;
    Ok(CacheIdentity { uri: uri_from_url(&url), data_hash: compute_data_hash(stripped.data.as_ref()) })
}
