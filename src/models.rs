use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

/// Dimension that carries the observation period in every Eurostat schema.
pub const PERIOD_DIMENSION: &str = "TIME_PERIOD";
/// Record field holding the observation period.
pub const TIME_FIELD: &str = "TIME";
/// Record field holding the observation value (number or null).
pub const VALUE_FIELD: &str = "OBS_VALUE";
pub const STATUS_FIELD: &str = "OBS_STATUS";
/// Informational flag; passed through untouched.
pub const FLAG_FIELD: &str = "OBS_FLAG";

/// A scalar field value: dimension codes are text, periods and observations numbers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Number(f64),
    Text(String),
    Null,
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// `""` stands for "every value" in dimension filters.
    pub fn is_wildcard(&self) -> bool {
        matches!(self, Value::Text(s) if s.is_empty())
    }

    /// Ordering between two values. Text that parses as a number compares
    /// numerically against a number; other mixes and null give `None`.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => a.partial_cmp(b),
            (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
            (Value::Number(a), Value::Text(b)) => parse_number(b).and_then(|b| a.partial_cmp(&b)),
            (Value::Text(a), Value::Number(b)) => parse_number(a).and_then(|a| a.partial_cmp(b)),
            _ => None,
        }
    }

    /// Equality used by query conditions: `2000` matches `"2000"`, null matches null.
    pub fn matches(&self, other: &Value) -> bool {
        self == other || self.compare(other) == Some(Ordering::Equal)
    }

    /// Total order used for sorting: null < numbers < text.
    pub fn sort_cmp(&self, other: &Value) -> Ordering {
        fn rank(v: &Value) -> u8 {
            match v {
                Value::Null => 0,
                Value::Number(_) => 1,
                Value::Text(_) => 2,
            }
        }
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => a.total_cmp(b),
            (Value::Text(a), Value::Text(b)) => a.cmp(b),
            _ => rank(self).cmp(&rank(other)),
        }
    }
}

fn parse_number(s: &str) -> Option<f64> {
    s.trim().parse::<f64>().ok().filter(|n| n.is_finite())
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => write!(f, "{}", *n as i64),
            Value::Number(n) => write!(f, "{}", n),
            Value::Text(s) => f.write_str(s),
            Value::Null => Ok(()),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(n as f64)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// One observation (one row = one period of one series).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record {
    fields: BTreeMap<String, Value>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style setter, handy in tests and decoders.
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(field, value);
        self
    }

    pub fn set(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(field.into(), value.into());
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn time(&self) -> Option<&Value> {
        self.get(TIME_FIELD)
    }

    pub fn value(&self) -> Option<f64> {
        self.get(VALUE_FIELD).and_then(Value::as_f64)
    }

    pub fn status(&self) -> Option<&str> {
        self.get(STATUS_FIELD).and_then(Value::as_str)
    }

    pub fn flag(&self) -> Option<&str> {
        self.get(FLAG_FIELD).and_then(Value::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// A dataset ("dataflow") offered by the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dataflow {
    pub id: String,
    /// Display names keyed by language tag (`en`, `de`, `fr`, ...).
    pub names: BTreeMap<String, String>,
}

impl Dataflow {
    pub fn name(&self, lang: &str) -> Option<&str> {
        self.names.get(lang).map(String::as_str)
    }

    /// First name found in `languages`, else any name, else the id.
    pub fn display_name(&self, languages: &[String]) -> &str {
        languages
            .iter()
            .find_map(|l| self.name(l))
            .or_else(|| self.names.values().next().map(String::as_str))
            .unwrap_or(&self.id)
    }

    /// Case-insensitive substring match on the id and every localized name,
    /// OR-ed over `terms`. No terms matches everything.
    pub fn matches<S: AsRef<str>>(&self, terms: &[S]) -> bool {
        if terms.is_empty() {
            return true;
        }
        let id = self.id.to_lowercase();
        let names: Vec<String> = self.names.values().map(|n| n.to_lowercase()).collect();
        terms.iter().any(|t| {
            let t = t.as_ref().to_lowercase();
            id.contains(&t) || names.iter().any(|n| n.contains(&t))
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Code {
    pub id: String,
    pub name: String,
}

/// Enumerated values of one field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeList {
    pub id: String,
    /// Field the list applies to (`CL_GEO` → `GEO`).
    pub field: String,
    pub name: String,
    pub codes: Vec<Code>,
}

/// Data structure definition of one dataset.
///
/// Once built through [`crate::schema::normalize`], the period dimension is the last
/// entry of `dimensions`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    pub id: String,
    pub dimensions: Vec<String>,
    /// Dimension carrying the observation period, if the schema has one.
    pub period_dimension: Option<String>,
    pub concepts: Vec<String>,
    pub code_lists: Vec<CodeList>,
}

impl Schema {
    pub fn code_list(&self, field: &str) -> Result<&CodeList> {
        self.code_lists
            .iter()
            .find(|c| c.field == field)
            .ok_or_else(|| Error::unknown_field(&self.id, field))
    }

    /// Code → human readable name for `field`.
    pub fn codes_for(&self, field: &str) -> Result<BTreeMap<String, String>> {
        Ok(self
            .code_list(field)?
            .codes
            .iter()
            .map(|c| (c.id.clone(), c.name.clone()))
            .collect())
    }

    pub fn has_dimension(&self, dim: &str) -> bool {
        self.dimensions.iter().any(|d| d == dim)
    }
}

/// Years to retrieve, end points inclusive. A missing bound leaves that side open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: Option<i32>,
    pub end: Option<i32>,
}

impl TimeWindow {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn from_year(start: i32) -> Self {
        Self {
            start: Some(start),
            end: None,
        }
    }

    pub fn until_year(end: i32) -> Self {
        Self {
            start: None,
            end: Some(end),
        }
    }

    pub fn between(start: i32, end: i32) -> Self {
        Self {
            start: Some(start),
            end: Some(end),
        }
    }

    /// Value forced into the period slot of every data request.
    pub fn to_query_fragment(&self) -> String {
        let params = match (self.start, self.end) {
            (None, None) => return String::new(),
            (Some(s), None) => format!("startPeriod={}", s),
            (None, Some(e)) => format!("endPeriod={}", e),
            (Some(s), Some(e)) => format!("startPeriod={}&endPeriod={}", s, e),
        };
        format!("/?{}", params)
    }
}
