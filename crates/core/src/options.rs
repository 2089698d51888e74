//! Declared configuration defaults and per-record configuration overlays.
//!
//! Option names starting with `$` are variable: they ride along on a record
//! but never take part in its signature. Every other option is constant and
//! must be declared in the type's [`ConfigDefaults`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Prefix marking an option as variable.
pub const VARIABLE_MARKER: char = '$';

/// Whether an option name denotes a variable option.
pub fn is_variable(name: &str) -> bool {
    name.starts_with(VARIABLE_MARKER)
}

/// The allow-list of constant options for an entity or resource type,
/// together with their default values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfigDefaults(Map<String, Value>);

impl ConfigDefaults {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare an option with its default value.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }

    /// Whether `name` may be set on a configuration of this type.
    pub fn allows(&self, name: &str) -> bool {
        is_variable(name) || self.0.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }
}

impl FromIterator<(String, Value)> for ConfigDefaults {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// A configuration snapshot: declared defaults overlaid with caller input.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Configuration(Map<String, Value>);

impl Configuration {
    /// Merge `input` over `defaults`.
    ///
    /// Constant options missing from the defaults are dropped.
    pub fn from_input(defaults: &ConfigDefaults, input: &Map<String, Value>) -> Self {
        let mut options = defaults.0.clone();
        for (name, value) in input {
            if !defaults.allows(name) {
                tracing::warn!(option = %name, "dropping undeclared configuration option");
                continue;
            }
            options.insert(name.clone(), value.clone());
        }
        Self(options)
    }

    /// Wrap an already stored configuration.
    pub fn from_map(options: Map<String, Value>) -> Self {
        Self(options)
    }

    /// Apply only the variable options of `input`; constants stay untouched.
    pub fn overlay_variables(&mut self, input: &Map<String, Value>) {
        for (name, value) in input.iter().filter(|(name, _)| is_variable(name)) {
            self.0.insert(name.clone(), value.clone());
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(Value::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn constant_options(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter().filter(|(name, _)| !is_variable(name))
    }

    pub fn variable_options(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter().filter(|(name, _)| is_variable(name))
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn defaults() -> ConfigDefaults {
        ConfigDefaults::new().with("setting1", "default").with("setting3", 3)
    }

    fn input(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_is_variable() {
        assert!(is_variable("$setting2"));
        assert!(!is_variable("setting1"));
    }

    #[test]
    fn test_from_input_merges_defaults() {
        let config = Configuration::from_input(&defaults(), &input(json!({"setting1": "const"})));
        assert_eq!(config.get_str("setting1"), Some("const"));
        assert_eq!(config.get("setting3"), Some(&json!(3)));
    }

    #[test]
    fn test_from_input_drops_illegal_keys() {
        let config = Configuration::from_input(&defaults(), &input(json!({"setting1": "const", "illegal": "please"})));
        assert!(!config.contains("illegal"));
        assert_eq!(config.get_str("setting1"), Some("const"));
    }

    #[test]
    fn test_from_input_keeps_variables() {
        let config = Configuration::from_input(&defaults(), &input(json!({"$setting2": "variable"})));
        assert_eq!(config.get_str("$setting2"), Some("variable"));
        assert_eq!(config.variable_options().count(), 1);
        assert_eq!(config.constant_options().count(), 2);
    }

    #[test]
    fn test_overlay_variables_ignores_constants() {
        let mut config = Configuration::from_input(&defaults(), &input(json!({"setting1": "const"})));
        config.overlay_variables(&input(json!({"setting1": "created", "$setting2": "variable"})));
        assert_eq!(config.get_str("setting1"), Some("const"));
        assert_eq!(config.get_str("$setting2"), Some("variable"));
    }
}
