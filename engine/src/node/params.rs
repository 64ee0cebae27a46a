//! Node parameter values.

use std::collections::BTreeMap;

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

/// Output path of a writer; may contain a `{frame}` or `{frame:04}` token.
pub const FILENAME_PARAM: &str = "filename";
pub const FIRST_FRAME_PARAM: &str = "firstFrame";
pub const LAST_FRAME_PARAM: &str = "lastFrame";

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash)]
#[serde(tag = "type", content = "value")]
pub enum ParamValue {
    Number(OrderedFloat<f64>),
    Integer(i64),
    String(String),
    Boolean(bool),
}

impl ParamValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Number(n) => Some(n.into_inner()),
            ParamValue::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ParamValue::Integer(i) => Some(*i),
            ParamValue::Number(n) => Some(n.into_inner() as i64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::String(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::String(value.to_string())
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        ParamValue::Number(OrderedFloat(value))
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        ParamValue::Integer(value)
    }
}

impl From<i32> for ParamValue {
    fn from(value: i32) -> Self {
        ParamValue::Integer(value as i64)
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        ParamValue::String(value)
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        ParamValue::Boolean(value)
    }
}

/// A parameter a plugin declares, with its default.
#[derive(Clone, Debug, PartialEq)]
pub struct ParamDefinition {
    pub name: String,
    pub default_value: ParamValue,
}

impl ParamDefinition {
    pub fn new(name: &str, default_value: impl Into<ParamValue>) -> Self {
        Self {
            name: name.to_string(),
            default_value: default_value.into(),
        }
    }
}

/// A single (name, value) pair applied to a node before activation.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ParamAssignment {
    pub name: String,
    pub value: ParamValue,
}

impl ParamAssignment {
    pub fn new(name: &str, value: impl Into<ParamValue>) -> Self {
        Self {
            name: name.to_string(),
            value: value.into(),
        }
    }
}

/// Parameter values of one node, ordered by name.
#[derive(Serialize, Deserialize, Clone, Default, Debug, PartialEq)]
pub struct ParamSet {
    values: BTreeMap<String, ParamValue>,
}

impl ParamSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_definitions(definitions: &[ParamDefinition]) -> Self {
        let mut set = Self::new();
        for def in definitions {
            set.set(&def.name, def.default_value.clone());
        }
        set
    }

    /// Apply assignments in list order; a later entry for the same name wins.
    pub fn apply(&mut self, assignments: &[ParamAssignment]) {
        for assignment in assignments {
            self.set(&assignment.name, assignment.value.clone());
        }
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.values.get(name)
    }

    pub fn set(&mut self, name: &str, value: ParamValue) {
        self.values.insert(name.to_string(), value);
    }

    pub fn get_i64(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(ParamValue::as_i64)
    }

    pub fn get_string(&self, name: &str) -> Option<String> {
        self.get(name).and_then(|v| v.as_str().map(str::to_string))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ParamValue)> {
        self.values.iter()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
