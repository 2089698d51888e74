//! HTTP resource data types shared by the store and the fetch pipeline.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::Error;

/// Query parameters injected into a request URL, ordered by name.
pub type Params = BTreeMap<String, String>;

/// Supported request methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    Get,
    Post,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "get",
            Method::Post => "post",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "get" => Ok(Method::Get),
            "post" => Ok(Method::Post),
            other => Err(Error::Validation(format!("{other} is not a supported resource method"))),
        }
    }
}

/// Everything needed to send (or re-send) a request.
///
/// `args` and `kwargs` are the caller's input and are kept so a stored
/// request can be validated again before it is replayed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestDescriptor {
    pub method: Method,
    #[serde(default)]
    pub args: Vec<Value>,
    #[serde(default)]
    pub kwargs: Map<String, Value>,
    pub url: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub data: Option<Value>,
}

impl RequestDescriptor {
    /// A bare request without input, headers or body.
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self { method, args: Vec::new(), kwargs: Map::new(), url: url.into(), headers: BTreeMap::new(), data: None }
    }
}

/// The deduplication key of an HTTP resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheIdentity {
    /// URL without its `scheme://` prefix and without auth parameters.
    pub uri: String,
    /// Hash of the request body, empty when there is none.
    pub data_hash: String,
}

impl fmt::Display for CacheIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.data_hash.is_empty() { write!(f, "{}", self.uri) } else { write!(f, "{}#{}", self.uri, self.data_hash) }
    }
}

/// A persisted fetch outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceRecord {
    pub id: i64,
    pub kind: String,
    pub identity: CacheIdentity,
    pub config: Map<String, Value>,
    pub request: RequestDescriptor,
    pub head: BTreeMap<String, String>,
    pub body: String,
    pub status: u16,
    pub created_at: DateTime<Utc>,
}

/// Parsed view of a successful response body.
#[derive(Debug, Clone, PartialEq)]
pub enum Content {
    Json(Value),
    Html(String),
    /// Body kept as text; carries the content type that was not understood.
    Other(String),
}

impl ResourceRecord {
    /// True when the status lies in the HTTP success band `[200, 209)`.
    pub fn is_success(&self) -> bool {
        (200..209).contains(&self.status)
    }

    /// Media type of the response without parameters, e.g. `application/json`.
    pub fn content_type(&self) -> Option<&str> {
        self.head
            .get("content-type")
            .map(|value| value.split(';').next().unwrap_or_default().trim())
    }

    /// Interpret the body according to its content type.
    ///
    /// Returns `None` for unsuccessful responses.
    pub fn content(&self) -> Result<Option<Content>, Error> {
        if !self.is_success() {
            return Ok(None);
        }
        let content = match self.content_type() {
            Some("application/json") => Content::Json(serde_json::from_str(&self.body)?),
            Some("text/html") => Content::Html(self.body.clone()),
            other => Content::Other(other.unwrap_or_default().to_string()),
        };
        Ok(Some(content))
    }
}

/// A fetch outcome that has not been persisted yet.
#[derive(Debug, Clone)]
pub struct NewResource {
    pub kind: String,
    pub identity: CacheIdentity,
    pub config: Map<String, Value>,
    pub request: RequestDescriptor,
    pub head: BTreeMap<String, String>,
    pub body: String,
    pub status: u16,
}
