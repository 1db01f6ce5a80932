//! Core types for declarative resource graphs

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use crate::error::Error;

/// Property values are plain JSON values
pub use serde_json::Value;

/// Current values of a resource's properties, keyed by property name
pub type CurrentValues = BTreeMap<String, Value>;

/// Value used for `ensure` when a resource does not exist
pub const ABSENT: &str = "absent";

/// Placeholder shown instead of sensitive values
pub const REDACTED: &str = "[redacted]";

static REFERENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z][A-Za-z0-9_]*(?:::[A-Za-z][A-Za-z0-9_]*)*)\[(.+)\]$")
        .expect("reference pattern is valid")
});

/// Canonical identity of a resource: `Type[title]`
///
/// The type name is normalized so that `file` and `File` name the same
/// type, and each `::` segment is capitalized (`Foo::Bar`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ResourceRef {
    type_name: String,
    title: String,
}

impl ResourceRef {
    /// Create a reference, normalizing the type name
    pub fn new(type_name: &str, title: &str) -> Self {
        Self {
            type_name: normalize_type(type_name),
            title: title.to_string(),
        }
    }

    /// The normalized type name
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// The title
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Whether this reference names a resource of the given type
    pub fn is_type(&self, type_name: &str) -> bool {
        self.type_name == normalize_type(type_name)
    }
}

fn normalize_type(type_name: &str) -> String {
    type_name
        .split("::")
        .map(|segment| {
            let lower = segment.to_lowercase();
            let mut chars = lower.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join("::")
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.type_name, self.title)
    }
}

impl FromStr for ResourceRef {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let caps = REFERENCE_RE
            .captures(s.trim())
            .ok_or_else(|| Error::InvalidReference(s.to_string()))?;
        Ok(Self::new(&caps[1], &caps[2]))
    }
}

impl TryFrom<String> for ResourceRef {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ResourceRef> for String {
    fn from(reference: ResourceRef) -> Self {
        reference.to_string()
    }
}

/// Execution priority of a vertex in the relationship graph
///
/// Priorities compare lexicographically. Top-level vertices get `[n]`;
/// resources generated by a parent get the parent's priority plus one more
/// component, so they sort right after the parent and before the next
/// top-level vertex.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Priority(Vec<u64>);

impl Priority {
    /// Top-level priority
    pub fn top(n: u64) -> Self {
        Self(vec![n])
    }

    /// Priority of the `n`th resource contained in `self`
    pub fn child(&self, n: u64) -> Self {
        let mut parts = self.0.clone();
        parts.push(n);
        Self(parts)
    }

    /// The raw components
    pub fn parts(&self) -> &[u64] {
        &self.0
    }
}

impl Ord for Priority {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

impl PartialOrd for Priority {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(u64::to_string).collect();
        write!(f, "{}", parts.join("."))
    }
}

/// Structural role of a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResourceKind {
    /// An ordinary managed resource
    Managed,
    /// A structural grouping (stage, class, defined type instance)
    Container,
    /// A zero-behavior sentinel living only in the relationship graph
    Whit,
}

/// A managed property of a resource and its desired value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Property {
    /// Property name (`ensure`, `content`, ...)
    pub name: String,
    /// Desired value; `None` means the property is not managed this run
    pub should: Option<Value>,
    /// Sensitive values are redacted in events and never persisted
    #[serde(default)]
    pub sensitive: bool,
}

impl Property {
    /// Create a managed property
    pub fn new(name: &str, should: impl Into<Value>) -> Self {
        Self {
            name: name.to_string(),
            should: Some(should.into()),
            sensitive: false,
        }
    }

    /// Mark the property as sensitive
    pub fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }

    /// Whether this is the `ensure` property
    pub fn is_ensure(&self) -> bool {
        self.name == "ensure"
    }

    /// Default in-sync check
    ///
    /// An array `should` accepts any of its members.
    pub fn insync(&self, current: &Value) -> bool {
        match &self.should {
            None => true,
            Some(Value::Array(options)) if !current.is_array() => options.contains(current),
            Some(should) => should == current,
        }
    }

    /// Human-readable description of a change from `current` to the desired value
    pub fn change_message(&self, current: &Value) -> String {
        let should = self.should.clone().unwrap_or(Value::Null);
        if self.sensitive {
            return format!("changed {REDACTED} to {REDACTED}");
        }
        if self.is_ensure() {
            if is_absent(current) {
                return "created".to_string();
            }
            if is_absent(&should) {
                return "removed".to_string();
            }
            return format!(
                "ensure changed {} to {}",
                format_value(current),
                format_value(&should)
            );
        }
        if is_absent(current) {
            format!("defined '{}' as {}", self.name, format_value(&should))
        } else if is_absent(&should) {
            format!("undefined '{}' from {}", self.name, format_value(current))
        } else {
            format!(
                "{} changed {} to {}",
                self.name,
                format_value(current),
                format_value(&should)
            )
        }
    }
}

/// Whether a value means "not there"
pub fn is_absent(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s == ABSENT,
        Value::Array(items) => items.len() == 1 && is_absent(&items[0]),
        _ => false,
    }
}

/// Format a value for event messages: strings quoted, arrays bracketed
pub fn format_value(value: &Value) -> String {
    match value {
        Value::Null => "undef".to_string(),
        Value::String(s) => format!("'{s}'"),
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().map(format_value).collect();
            format!("[{}]", parts.join(", "))
        }
        other => other.to_string(),
    }
}

/// Wrap a value so it is always iterable: arrays stay as-is, scalars become one-element lists
pub fn wrap_value(value: &Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items.clone(),
        other => vec![other.clone()],
    }
}

/// Callback name used for refresh relationships
pub const REFRESH: &str = "refresh";

/// Event filter matching every event
pub const ALL_EVENTS: &str = "ALL_EVENTS";

/// Label carried by a relationship edge
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EdgeLabel {
    /// Method invoked on the target when the source changes
    pub callback: String,
    /// Which source events trigger the callback
    pub event: String,
}

impl EdgeLabel {
    /// The `{refresh, ALL_EVENTS}` label used by notify/subscribe and container sentinels
    pub fn refresh() -> Self {
        Self {
            callback: REFRESH.to_string(),
            event: ALL_EVENTS.to_string(),
        }
    }
}

/// A directed edge between two resources: `source` must be applied before `target`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationship {
    pub source: ResourceRef,
    pub target: ResourceRef,
    pub label: Option<EdgeLabel>,
}

impl Relationship {
    /// An unlabelled ordering edge
    pub fn new(source: ResourceRef, target: ResourceRef) -> Self {
        Self {
            source,
            target,
            label: None,
        }
    }

    /// A labelled edge
    pub fn labelled(source: ResourceRef, target: ResourceRef, label: EdgeLabel) -> Self {
        Self {
            source,
            target,
            label: Some(label),
        }
    }
}

impl fmt::Display for Relationship {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.label {
            Some(_) => write!(f, "{} ~> {}", self.source, self.target),
            None => write!(f, "{} -> {}", self.source, self.target),
        }
    }
}
