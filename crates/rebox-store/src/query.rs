//! Backend-neutral filters and partial updates.
//!
//! Conditions and patches are expressed over camelCase field names and JSON
//! values. The local store evaluates them directly against the stored JSON;
//! the relational store translates them into SQL (see `database.rs`).

use serde::Serialize;
use serde_json::{Map, Value};

use crate::record::Record;

/// One predicate on a record field.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Eq(&'static str, Value),
    Ne(&'static str, Value),
    In(&'static str, Vec<Value>),
    /// The field is an array holding the value.
    Contains(&'static str, Value),
}

impl Condition {
    pub fn field(&self) -> &'static str {
        match self {
            Condition::Eq(f, _)
            | Condition::Ne(f, _)
            | Condition::In(f, _)
            | Condition::Contains(f, _) => f,
        }
    }

    fn matches(&self, record: &Value) -> bool {
        let actual = record.get(self.field()).unwrap_or(&Value::Null);
        match self {
            Condition::Eq(_, v) => actual == v,
            Condition::Ne(_, v) => actual != v,
            Condition::In(_, vs) => vs.contains(actual),
            Condition::Contains(_, v) => actual
                .as_array()
                .map(|items| items.contains(v))
                .unwrap_or(false),
        }
    }
}

/// A conjunction of [`Condition`]s. An empty filter matches everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    conditions: Vec<Condition>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, field: &'static str, value: impl Into<Value>) -> Self {
        self.conditions.push(Condition::Eq(field, value.into()));
        self
    }

    pub fn ne(mut self, field: &'static str, value: impl Into<Value>) -> Self {
        self.conditions.push(Condition::Ne(field, value.into()));
        self
    }

    pub fn is_in<I, V>(mut self, field: &'static str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let values = values.into_iter().map(Into::into).collect();
        self.conditions.push(Condition::In(field, values));
        self
    }

    pub fn contains(mut self, field: &'static str, value: impl Into<Value>) -> Self {
        self.conditions.push(Condition::Contains(field, value.into()));
        self
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    /// Evaluate against a record in its serialized (camelCase) form.
    pub fn matches(&self, record: &Value) -> bool {
        self.conditions.iter().all(|c| c.matches(record))
    }
}

/// A partial update: camelCase field name → new value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Patch {
    fields: Map<String, Value>,
}

impl Patch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(field.to_string(), value.into());
        self
    }

    /// Build a patch from a struct whose `None` fields are skipped during
    /// serialization.
    pub fn from_serialize<T: Serialize>(value: &T) -> serde_json::Result<Self> {
        match serde_json::to_value(value)? {
            Value::Object(fields) => Ok(Self { fields }),
            other => Err(serde::ser::Error::custom(format!(
                "patch must serialize to an object, got {other}"
            ))),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Shallow-merge into a serialized record. Non-object targets are left
    /// untouched.
    pub fn apply_to(&self, record: &mut Value) {
        if let Value::Object(target) = record {
            for (k, v) in &self.fields {
                target.insert(k.clone(), v.clone());
            }
        }
    }

    /// Merge into a typed record. Fails if the result no longer decodes as `R`.
    pub fn apply_record<R: Record>(&self, record: &R) -> serde_json::Result<R> {
        let mut value = serde_json::to_value(record)?;
        self.apply_to(&mut value);
        serde_json::from_value(value)
    }
}
