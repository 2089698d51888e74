//! A resource for fetching arbitrary URLs.

use std::collections::BTreeMap;

use rescache_core::{ConfigDefaults, Configuration, Method};
use serde_json::json;

use super::{ArgumentSchema, MethodSchema, ResourceKind};

/// Default `accept` header sent with plain URL requests.
pub const DEFAULT_ACCEPT: &str = "text/html,application/json;q=0.9,*/*;q=0.8";

/// Any URL, given as the single positional argument.
///
/// GET takes no keyword input; POST sends keyword input as the body.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainUrl;

impl ResourceKind for PlainUrl {
    fn name(&self) -> &str {
        "PlainUrl"
    }

    fn uri_template(&self) -> &str {
        "{}"
    }

    fn config_defaults(&self) -> ConfigDefaults {
        ConfigDefaults::new().with("accept", DEFAULT_ACCEPT)
    }

    fn headers(&self, config: &Configuration) -> BTreeMap<String, String> {
        let accept = config.get_str("accept").unwrap_or(DEFAULT_ACCEPT);
        BTreeMap::from([("accept".to_string(), accept.to_string())])
    }

    fn schema(&self, method: Method) -> MethodSchema {
        let url = ArgumentSchema::Schema(json!({
            "type": "array",
            "items": [{"type": "string", "minLength": 1}],
            "minItems": 1,
            "maxItems": 1
        }));
        match method {
            Method::Get => MethodSchema::none().with_args(url),
            Method::Post => MethodSchema::none().with_args(url).with_kwargs(ArgumentSchema::Any),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::Resource;
    use rescache_core::Error;
    use serde_json::{Map, Value};

    #[test]
    fn test_plain_get() {
        let resource = Resource::new(PlainUrl);
        let request = resource
            .build_request(Method::Get, vec![json!("Example.com/a?b=1")], Map::new())
            .unwrap();
        assert_eq!(request.url, "https://example.com/a?b=1");
        assert_eq!(request.headers.get("accept").map(String::as_str), Some(DEFAULT_ACCEPT));
        assert_eq!(resource.identity(&request).unwrap().uri, "example.com/a?b=1");
    }

    #[test]
    fn test_plain_requires_one_url() {
        let resource = Resource::new(PlainUrl);
        assert!(matches!(resource.build_request(Method::Get, Vec::new(), Map::new()), Err(Error::Validation(_))));
        assert!(matches!(
            resource.build_request(Method::Get, vec![json!("a.com"), json!("b.com")], Map::new()),
            Err(Error::Validation(_))
        ));
        assert!(matches!(resource.build_request(Method::Get, vec![json!("")], Map::new()), Err(Error::Validation(_))));
    }

    #[test]
    fn test_plain_get_rejects_kwargs() {
        let resource = Resource::new(PlainUrl);
        let mut kwargs = Map::new();
        kwargs.insert("q".into(), Value::from("x"));
        let result = resource.build_request(Method::Get, vec![json!("example.com")], kwargs);
        assert!(matches!(result, Err(Error::Validation(_))));
    }

    #[test]
    fn test_plain_post_body() {
        let resource = Resource::new(PlainUrl);
        let mut kwargs = Map::new();
        kwargs.insert("q".into(), Value::from("x"));
        let request = resource
            .build_request(Method::Post, vec![json!("example.com/search")], kwargs)
            .unwrap();
        assert_eq!(request.data, Some(json!({"q": "x"})));
        assert_eq!(resource.identity(&request).unwrap().data_hash.len(), 64);
    }

    #[test]
    fn test_plain_accept_override() {
        let mut input = Map::new();
        input.insert("accept".into(), Value::from("application/json"));
        let resource = Resource::configure(PlainUrl, &input).unwrap();
        let request = resource.build_request(Method::Get, vec![json!("example.com")], Map::new()).unwrap();
        assert_eq!(request.headers.get("accept").map(String::as_str), Some("application/json"));
    }
}
