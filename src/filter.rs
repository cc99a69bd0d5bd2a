//! Multi-valued filters and their expansion into single-valued selections.
//!
//! A [`Filter`] maps each field to one or more values; [`expand`] turns it into the
//! cartesian product of single-valued [`Selection`]s, so that
//! `{GEO: ["NL", "BE"], SEX: "T"}` becomes two requests that can be cached
//! independently.

use crate::models::Value;
use serde::{Deserialize, Serialize};

/// Ordered `field → values` pairs. A field given a single value is a one-element list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    entries: Vec<(String, Vec<Value>)>,
}

/// Values accepted by [`Filter::with`]: a scalar or a list of scalars.
pub trait IntoValues {
    fn into_values(self) -> Vec<Value>;
}

impl IntoValues for &str {
    fn into_values(self) -> Vec<Value> {
        vec![Value::from(self)]
    }
}

impl IntoValues for String {
    fn into_values(self) -> Vec<Value> {
        vec![Value::from(self)]
    }
}

impl IntoValues for Value {
    fn into_values(self) -> Vec<Value> {
        vec![self]
    }
}

impl IntoValues for f64 {
    fn into_values(self) -> Vec<Value> {
        vec![Value::from(self)]
    }
}

impl IntoValues for i32 {
    fn into_values(self) -> Vec<Value> {
        vec![Value::from(self)]
    }
}

impl<T: Into<Value>> IntoValues for Vec<T> {
    fn into_values(self) -> Vec<Value> {
        self.into_iter().map(Into::into).collect()
    }
}

impl<T: Into<Value>, const N: usize> IntoValues for [T; N] {
    fn into_values(self) -> Vec<Value> {
        self.into_iter().map(Into::into).collect()
    }
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the values of `field`, replacing earlier ones but keeping its position.
    pub fn with(mut self, field: impl Into<String>, values: impl IntoValues) -> Self {
        self.set(field, values);
        self
    }

    pub fn set(&mut self, field: impl Into<String>, values: impl IntoValues) {
        let field = field.into();
        let values = values.into_values();
        match self.entries.iter_mut().find(|(f, _)| *f == field) {
            Some(entry) => entry.1 = values,
            None => self.entries.push((field, values)),
        }
    }

    pub fn get(&self, field: &str) -> Option<&[Value]> {
        self.entries
            .iter()
            .find(|(f, _)| f == field)
            .map(|(_, v)| v.as_slice())
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(f, _)| f.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[Value])> {
        self.entries.iter().map(|(f, v)| (f.as_str(), v.as_slice()))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// One value per field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Selection {
    entries: Vec<(String, Value)>,
}

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.entries.push((field.into(), value.into()));
        self
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.entries.iter().find(|(f, _)| f == field).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(f, v)| (f.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Cartesian product of the filter's value lists; later fields vary fastest.
///
/// An empty filter yields one empty selection. A field with an empty value list
/// yields no selections at all.
pub fn expand(filter: &Filter) -> Vec<Selection> {
    let mut out = vec![Selection::new()];
    for (field, values) in &filter.entries {
        let mut next = Vec::with_capacity(out.len() * values.len());
        for partial in &out {
            for value in values {
                let mut sel = partial.clone();
                sel.entries.push((field.clone(), value.clone()));
                next.push(sel);
            }
        }
        out = next;
    }
    out
}
