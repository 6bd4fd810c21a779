//! Remote values.
//!
//! Remote values are values that are determined by the provisioning engine
//! after it realizes a construct. At synthesis time they are tokens that name
//! the construct they come from.

use serde::ser::SerializeMap;

use crate::{Dependencies, HasDependencies};

/// A token standing for a value of another construct.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Remote {
    depends_on: String,
    /// `None` means the construct's primary reference.
    attribute: Option<String>,
}

impl Remote {
    pub(crate) fn reference(depends_on: impl Into<String>) -> Self {
        Remote {
            depends_on: depends_on.into(),
            attribute: None,
        }
    }

    pub(crate) fn attribute(depends_on: impl Into<String>, attribute: impl Into<String>) -> Self {
        Remote {
            depends_on: depends_on.into(),
            attribute: Some(attribute.into()),
        }
    }

    /// Id of the construct this value comes from.
    pub fn depends_on(&self) -> &str {
        &self.depends_on
    }
}

impl serde::Serialize for Remote {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut map = serializer.serialize_map(Some(1))?;
        match &self.attribute {
            None => map.serialize_entry("Ref", &self.depends_on)?,
            Some(attribute) => {
                map.serialize_entry("Fn::GetAtt", &[&self.depends_on, attribute])?
            }
        }
        map.end()
    }
}

impl HasDependencies for Remote {
    fn dependencies(&self) -> Dependencies {
        Dependencies::single(self.depends_on.clone())
    }
}

/// A property value.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Literal(String),
    Remote(Remote),
    /// Parts joined by a separator once every part is known.
    Join {
        separator: String,
        parts: Vec<Value>,
    },
    /// The availability zone at this index in the stack's region.
    AvailabilityZone(u32),
}

impl Value {
    /// Joins `parts` with `separator`.
    ///
    /// Adjacent literals are folded together when the separator is empty, and
    /// a join made only of literals becomes a literal.
    pub fn join(separator: impl Into<String>, parts: impl IntoIterator<Item = Value>) -> Value {
        let separator = separator.into();
        let mut folded: Vec<Value> = vec![];
        for part in parts {
            if separator.is_empty() {
                if let (Some(Value::Literal(last)), Value::Literal(next)) =
                    (folded.last_mut(), &part)
                {
                    last.push_str(next);
                    continue;
                }
            }
            folded.push(part);
        }
        if folded.iter().all(|part| matches!(part, Value::Literal(_))) {
            let literals: Vec<&str> = folded.iter().filter_map(Value::as_literal).collect();
            return Value::Literal(literals.join(&separator));
        }
        Value::Join {
            separator,
            parts: folded,
        }
    }

    pub fn as_literal(&self) -> Option<&str> {
        match self {
            Value::Literal(s) => Some(s),
            _ => None,
        }
    }
}

impl serde::Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self {
            Value::Literal(s) => serializer.serialize_str(s),
            Value::Remote(remote) => remote.serialize(serializer),
            Value::Join { separator, parts } => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("Fn::Join", &(separator, parts))?;
                map.end()
            }
            Value::AvailabilityZone(index) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry(
                    "Fn::Select",
                    &(index, serde_json::json!({ "Fn::GetAZs": "" })),
                )?;
                map.end()
            }
        }
    }
}

impl HasDependencies for Value {
    fn dependencies(&self) -> Dependencies {
        match self {
            Value::Literal(_) | Value::AvailabilityZone(_) => Dependencies::default(),
            Value::Remote(remote) => remote.dependencies(),
            Value::Join { parts, .. } => parts.dependencies(),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Literal(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Literal(value)
    }
}

impl From<&String> for Value {
    fn from(value: &String) -> Self {
        Value::Literal(value.clone())
    }
}

impl From<Remote> for Value {
    fn from(value: Remote) -> Self {
        Value::Remote(value)
    }
}

impl From<&Remote> for Value {
    fn from(value: &Remote) -> Self {
        Value::Remote(value.clone())
    }
}
