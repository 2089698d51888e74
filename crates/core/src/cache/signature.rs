//! Signature generation for entity records.

use serde_json::{Map, Value};
use url::form_urlencoded;

use crate::Error;
use crate::options::{ConfigDefaults, is_variable};

/// Compute the signature of an entity from a context label and its
/// constant configuration options.
///
/// The result is `context` followed by the form-encoded constant options in
/// name order, e.g. `test&setting1=const`. Variable options are ignored.
/// Use [`signature_from_input`] for unfiltered caller input.
///
/// # Errors
///
/// Returns `Error::InvalidConfig` for a constant option that `defaults`
/// does not declare.
pub fn signature(context: &str, defaults: &ConfigDefaults, config: &Map<String, Value>) -> Result<String, Error> {
    if let Some(name) = config.keys().find(|name| !defaults.allows(name)) {
        return Err(Error::InvalidConfig(format!("{name} is not a declared option")));
    }
    Ok(encode(context, config))
}

/// Signature of raw caller input: undeclared constant options are dropped
/// with a warning instead of rejected.
pub fn signature_from_input(context: &str, defaults: &ConfigDefaults, input: &Map<String, Value>) -> String {
    let legal: Map<String, Value> = input
        .iter()
        .filter(|(name, _)| {
            let allowed = defaults.allows(name);
            if !allowed {
                tracing::warn!(option = %name, "ignoring undeclared option in signature");
            }
            allowed
        })
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect();
    encode(context, &legal)
}

fn encode(context: &str, config: &Map<String, Value>) -> String {
    let mut constants: Vec<(&String, &Value)> = config.iter().filter(|(name, _)| !is_variable(name)).collect();
    constants.sort_by(|(a, _), (b, _)| a.cmp(b));

    if constants.is_empty() {
        return context.to_string();
    }

    let mut encoder = form_urlencoded::Serializer::new(String::new());
    for (name, value) in constants {
        encoder.append_pair(name, &option_text(value));
    }
    format!("{context}&{}", encoder.finish())
}

fn option_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn defaults() -> ConfigDefaults {
        ConfigDefaults::new().with("setting1", "default").with("setting3", 0)
    }

    fn config(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_signature_format() {
        let sig = signature("test", &defaults(), &config(json!({"setting1": "const", "setting3": 1}))).unwrap();
        assert_eq!(sig, "test&setting1=const&setting3=1");
    }

    #[test]
    fn test_signature_context_only() {
        let sig = signature("test", &defaults(), &Map::new()).unwrap();
        assert_eq!(sig, "test");
    }

    #[test]
    fn test_signature_ignores_variables() {
        let a = signature("test", &defaults(), &config(json!({"setting1": "const", "$setting2": "a"}))).unwrap();
        let b = signature("test", &defaults(), &config(json!({"setting1": "const", "$setting2": "b"}))).unwrap();
        let c = signature("test", &defaults(), &config(json!({"setting1": "const"}))).unwrap();
        assert_eq!(a, b);
        assert_eq!(a, c);
    }

    #[test]
    fn test_signature_distinguishes_constants() {
        let a = signature("test", &defaults(), &config(json!({"setting1": "const"}))).unwrap();
        let b = signature("test", &defaults(), &config(json!({"setting1": "created"}))).unwrap();
        let c = signature("other", &defaults(), &config(json!({"setting1": "const"}))).unwrap();
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_signature_rejects_undeclared_constant() {
        let result = signature("test", &defaults(), &config(json!({"setting1": "const", "illegal": "please"})));
        assert!(matches!(result, Err(Error::InvalidConfig(msg)) if msg.contains("illegal")));
    }

    #[test]
    fn test_signature_encodes_values() {
        let sig = signature("test", &defaults(), &config(json!({"setting1": "a b&c"}))).unwrap();
        assert_eq!(sig, "test&setting1=a+b%26c");
    }

    #[test]
    fn test_signature_from_input_drops_undeclared() {
        let input = config(json!({"setting1": "const", "illegal": "please", "$setting2": "x"}));
        assert_eq!(signature_from_input("test", &defaults(), &input), "test&setting1=const");
        assert_eq!(
            signature_from_input("test", &defaults(), &input),
            signature("test", &defaults(), &config(json!({"setting1": "const"}))).unwrap()
        );
    }
}
