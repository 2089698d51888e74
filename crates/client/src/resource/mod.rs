//! HTTP resources: typed request building on top of the resource store.
//!
//! A [`ResourceKind`] describes one remote resource: where it lives, which
//! input it accepts, how it authenticates and how it pages. A [`Resource`]
//! pairs a kind with a validated configuration, and [`ResourceClient`] runs
//! the fetch pipeline for it.

pub mod client;
pub mod params;
pub mod plain;
pub mod request;
pub mod status;

use std::collections::BTreeMap;

use rescache_core::{
    CacheIdentity, ConfigDefaults, Configuration, Error, Method, Params, RequestDescriptor, ResourceRecord,
};
use serde_json::{Map, Value};

pub use client::ResourceClient;
pub use plain::PlainUrl;
pub use request::{ArgumentSchema, MethodSchema};
pub use status::{Outcome, raise_for_status};

/// Describes one kind of remote HTTP resource.
///
/// Only [`name`](ResourceKind::name) and
/// [`uri_template`](ResourceKind::uri_template) are required; the other
/// hooks default to "nothing to add".
pub trait ResourceKind: Send + Sync {
    /// Name under which outcomes are stored.
    fn name(&self) -> &str;

    /// URL template filled with positional arguments, see
    /// [`resolve_template`](crate::fetch::resolve_template).
    fn uri_template(&self) -> &str;

    /// Declared constant options and their defaults.
    fn config_defaults(&self) -> ConfigDefaults {
        ConfigDefaults::new()
    }

    /// Static query parameters, plus any implied by keyword input.
    fn parameters(&self, _config: &Configuration, _kwargs: &Map<String, Value>) -> Params {
        Params::new()
    }

    fn headers(&self, _config: &Configuration) -> BTreeMap<String, String> {
        BTreeMap::new()
    }

    /// Request body for methods other than GET.
    fn data(&self, _config: &Configuration, kwargs: &Map<String, Value>) -> Option<Value> {
        if kwargs.is_empty() { None } else { Some(Value::Object(kwargs.clone())) }
    }

    /// Accepted input for `method`.
    fn schema(&self, _method: Method) -> MethodSchema {
        MethodSchema::default()
    }

    /// Credentials merged into the query right before sending.
    fn auth_parameters(&self, _config: &Configuration) -> Params {
        Params::new()
    }

    /// Parameters to request the page after `record`; empty when there is none.
    fn next_parameters(&self, _config: &Configuration, _record: &ResourceRecord) -> Params {
        Params::new()
    }
}

/// A resource kind with its configuration.
#[derive(Debug, Clone)]
pub struct Resource<K> {
    kind: K,
    config: Configuration,
}

impl<K: ResourceKind> Resource<K> {
    /// A resource using the kind's declared defaults.
    pub fn new(kind: K) -> Self {
        let config = Configuration::from_input(&kind.config_defaults(), &Map::new());
        Self { kind, config }
    }

    /// A resource with `input` overlaid on the declared defaults.
    ///
    /// Fails with `InvalidConfig` when `input` sets a constant option the
    /// kind does not declare.
    pub fn configure(kind: K, input: &Map<String, Value>) -> Result<Self, Error> {
        let defaults = kind.config_defaults();
        if let Some(name) = input.keys().find(|name| !defaults.allows(name)) {
            return Err(Error::InvalidConfig(format!("{} does not declare option {name}", kind.name())));
        }
        let config = Configuration::from_input(&defaults, input);
        Ok(Self { kind, config })
    }

    pub fn kind(&self) -> &K {
        &self.kind
    }

    pub fn name(&self) -> &str {
        self.kind.name()
    }

    pub fn config(&self) -> &Configuration {
        &self.config
    }

    pub fn build_request(
        &self, method: Method, args: Vec<Value>, kwargs: Map<String, Value>,
    ) -> Result<RequestDescriptor, Error> {
        request::build_request(&self.kind, &self.config, method, args, kwargs)
    }

    pub fn validate_request(&self, request: &RequestDescriptor) -> Result<(), Error> {
        request::validate_request(&self.kind, request)
    }

    pub fn identity(&self, request: &RequestDescriptor) -> Result<CacheIdentity, Error> {
        request::canonical_identity(&self.kind, &self.config, request)
    }

    pub fn with_auth(&self, request: &RequestDescriptor) -> Result<RequestDescriptor, Error> {
        params::with_auth(&self.kind, &self.config, request)
    }

    pub fn without_auth(&self, request: &RequestDescriptor) -> Result<RequestDescriptor, Error> {
        params::without_auth(&self.kind, &self.config, request)
    }

    pub fn next_request(
        &self, request: &RequestDescriptor, record: &ResourceRecord,
    ) -> Result<Option<RequestDescriptor>, Error> {
        params::next_request(&self.kind, &self.config, request, record)
    }
}
