//! Core types for reconciliation: target states, attributes, desired state
//! and the result of one reconciliation.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use sacloud::{ResourceKind, ResourceRef};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::adapter::adapter_for;
use crate::error::{Error, Result};

/// Target state requested for a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StateToken {
    Present,
    Absent,
    Stopped,
    Running,
    Connected,
    Disconnected,
    Applied,
}

impl StateToken {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Present => "present",
            Self::Absent => "absent",
            Self::Stopped => "stopped",
            Self::Running => "running",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::Applied => "applied",
        }
    }

    pub fn all() -> &'static [StateToken] {
        &[
            Self::Present,
            Self::Absent,
            Self::Stopped,
            Self::Running,
            Self::Connected,
            Self::Disconnected,
            Self::Applied,
        ]
    }
}

impl fmt::Display for StateToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StateToken {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::all()
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| Error::validation(format!("unknown state '{s}'")))
    }
}

/// Parameters of a desired state, keyed by name.
///
/// Values come from loosely typed front-ends (command line, TOML), so the
/// typed getters accept a number or bool spelled as a string.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Attributes(BTreeMap<String, Value>);

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    #[must_use]
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: &str, value: impl Into<Value>) {
        self.0.insert(key.to_string(), value.into());
    }

    /// Raw value; `null` counts as absent.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key).filter(|v| !v.is_null())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.0.values().all(Value::is_null)
    }

    pub fn str(&self, key: &str) -> Result<Option<&str>> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s)),
            Some(_) => Err(type_error(key, "a string")),
        }
    }

    pub fn u64(&self, key: &str) -> Result<Option<u64>> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::Number(n)) => n
                .as_u64()
                .map(Some)
                .ok_or_else(|| type_error(key, "a non-negative integer")),
            Some(Value::String(s)) => s
                .trim()
                .parse()
                .map(Some)
                .map_err(|_| type_error(key, "a non-negative integer")),
            Some(_) => Err(type_error(key, "a non-negative integer")),
        }
    }

    /// Integer attribute that must fit `T`.
    pub fn int<T: TryFrom<u64>>(&self, key: &str) -> Result<Option<T>> {
        self.u64(key)?
            .map(|n| {
                T::try_from(n)
                    .map_err(|_| Error::validation(format!("'{key}' is out of range: {n}")))
            })
            .transpose()
    }

    pub fn bool(&self, key: &str) -> Result<Option<bool>> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::Bool(b)) => Ok(Some(*b)),
            Some(Value::String(s)) => match s.to_lowercase().as_str() {
                "true" | "yes" | "on" | "1" => Ok(Some(true)),
                "false" | "no" | "off" | "0" => Ok(Some(false)),
                _ => Err(type_error(key, "a boolean")),
            },
            Some(_) => Err(type_error(key, "a boolean")),
        }
    }

    /// List of strings; a single string is a one-element list.
    pub fn str_list(&self, key: &str) -> Result<Vec<String>> {
        match self.get(key) {
            None => Ok(Vec::new()),
            Some(Value::String(s)) => Ok(vec![s.clone()]),
            Some(Value::Array(items)) => items
                .iter()
                .map(|v| match v {
                    Value::String(s) => Ok(s.clone()),
                    _ => Err(type_error(key, "a list of strings")),
                })
                .collect(),
            Some(_) => Err(type_error(key, "a list of strings")),
        }
    }

    /// Nested attribute table.
    pub fn table(&self, key: &str) -> Result<Option<Attributes>> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::Object(map)) => Ok(Some(Attributes(
                map.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            ))),
            Some(_) => Err(type_error(key, "a table")),
        }
    }

    pub fn require_str(&self, key: &str) -> Result<&str> {
        self.str(key)?.ok_or_else(|| missing(key))
    }
}

impl FromIterator<(String, Value)> for Attributes {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl From<Attributes> for Value {
    fn from(attributes: Attributes) -> Self {
        Value::Object(attributes.0.into_iter().collect())
    }
}

fn type_error(key: &str, expected: &str) -> Error {
    Error::validation(format!("'{key}' must be {expected}"))
}

/// Validation error for a required attribute.
pub(crate) fn missing(key: &str) -> Error {
    Error::validation(format!("missing required arguments: {key}"))
}

/// Result facts reported after a reconciliation, keyed by fact name.
pub type Facts = BTreeMap<String, Value>;

/// Immutable input to one reconciliation.
#[derive(Debug, Clone, PartialEq)]
pub struct DesiredState {
    pub reference: ResourceRef,
    pub target: StateToken,
    pub attributes: Attributes,
    pub dry_run: bool,
}

impl DesiredState {
    /// Build a desired state, rejecting tokens the kind does not support
    /// and non-`Present` targets without an id.
    pub fn new(reference: ResourceRef, target: StateToken, attributes: Attributes) -> Result<Self> {
        let legal = adapter_for(reference.kind).legal_states();
        if !legal.contains(&target) {
            let allowed: Vec<_> = legal.iter().map(StateToken::as_str).collect();
            return Err(Error::validation(format!(
                "state '{target}' is not supported for {} (expected one of: {})",
                reference.kind,
                allowed.join(", ")
            )));
        }
        if target != StateToken::Present && reference.id.is_none() {
            return Err(missing("id"));
        }
        Ok(Self {
            reference,
            target,
            attributes,
            dry_run: false,
        })
    }

    #[must_use]
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn kind(&self) -> ResourceKind {
        self.reference.kind
    }
}

impl fmt::Display for DesiredState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.reference, self.target)
    }
}

/// Output of one reconciliation.
#[derive(Debug)]
pub struct ReconciliationResult {
    pub changed: bool,
    pub facts: Facts,
    pub error: Option<Error>,
}

impl ReconciliationResult {
    pub fn unchanged(facts: Facts) -> Self {
        Self {
            changed: false,
            facts,
            error: None,
        }
    }

    pub fn changed(facts: Facts) -> Self {
        Self {
            changed: true,
            facts,
            error: None,
        }
    }

    /// A failed run; `changed` tells whether any step took effect first.
    pub fn failed(changed: bool, facts: Facts, error: Error) -> Self {
        Self {
            changed,
            facts,
            error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use serde_json::json;

    #[test]
    fn test_state_token_parse() {
        for token in StateToken::all() {
            assert_eq!(token.as_str().parse::<StateToken>().unwrap(), *token);
        }
        assert!("started".parse::<StateToken>().is_err());
    }

    #[test]
    fn test_illegal_token_for_kind() {
        let err = DesiredState::new(
            ResourceRef::existing(ResourceKind::Router, "9"),
            StateToken::Stopped,
            Attributes::new(),
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(err.to_string().contains("not supported for router"));

        let err = DesiredState::new(
            ResourceRef::existing(ResourceKind::Compute, "1"),
            StateToken::Applied,
            Attributes::new(),
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_missing_id_only_allowed_for_present() {
        assert!(
            DesiredState::new(
                ResourceRef::new(ResourceKind::Volume, None),
                StateToken::Present,
                Attributes::new(),
            )
            .is_ok()
        );
        let err = DesiredState::new(
            ResourceRef::new(ResourceKind::Volume, None),
            StateToken::Absent,
            Attributes::new(),
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "invalid parameters: missing required arguments: id");
    }

    #[test]
    fn test_attribute_getters_accept_strings() {
        let attrs = Attributes::new()
            .with("cpu", "2")
            .with("mem", 4)
            .with("boot", "yes")
            .with("tags", "web");
        assert_eq!(attrs.u64("cpu").unwrap(), Some(2));
        assert_eq!(attrs.int::<u32>("mem").unwrap(), Some(4));
        assert_eq!(attrs.bool("boot").unwrap(), Some(true));
        assert_eq!(attrs.str_list("tags").unwrap(), vec!["web".to_string()]);
    }

    #[test]
    fn test_attribute_type_errors() {
        let attrs = Attributes::new()
            .with("cpu", "two")
            .with("mask", 300)
            .with("name", json!(["a"]));
        assert!(attrs.u64("cpu").is_err());
        assert!(attrs.int::<u8>("mask").is_err());
        assert!(attrs.str("name").is_err());
    }

    #[test]
    fn test_null_is_absent() {
        let attrs = Attributes::new().with("desc", Value::Null);
        assert!(!attrs.contains("desc"));
        assert!(attrs.is_empty());
        assert_eq!(attrs.str("desc").unwrap(), None);
    }

    #[test]
    fn test_nested_table() {
        let attrs = Attributes::new().with("disk", json!({ "size_gib": 40 }));
        let disk = attrs.table("disk").unwrap().unwrap();
        assert_eq!(disk.u64("size_gib").unwrap(), Some(40));
    }
}
