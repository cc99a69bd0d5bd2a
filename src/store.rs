//! In-memory record store with a small predicate language.

use crate::error::{Error, Result};
use crate::filter::Filter;
use crate::models::{Record, Value};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchMode {
    Exact,
    Prefix,
    Suffix,
}

/// A predicate on one field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Condition {
    Eq(Value),
    /// Matches when the field equals any of the values.
    In(Vec<Value>),
    Lt(Value),
    Le(Value),
    Gt(Value),
    Ge(Value),
    Text {
        pattern: String,
        mode: MatchMode,
        case_sensitive: bool,
    },
}

impl Condition {
    pub fn matches(&self, value: Option<&Value>) -> bool {
        let Some(value) = value else {
            return false;
        };
        match self {
            Condition::Eq(v) => value.matches(v),
            Condition::In(vs) => vs.iter().any(|v| value.matches(v)),
            Condition::Lt(v) => value.compare(v) == Some(Ordering::Less),
            Condition::Le(v) => matches!(value.compare(v), Some(Ordering::Less | Ordering::Equal)),
            Condition::Gt(v) => value.compare(v) == Some(Ordering::Greater),
            Condition::Ge(v) => matches!(value.compare(v), Some(Ordering::Greater | Ordering::Equal)),
            Condition::Text {
                pattern,
                mode,
                case_sensitive,
            } => {
                let Some(text) = value.as_str() else {
                    return false;
                };
                let (text, pattern) = if *case_sensitive {
                    (text.to_string(), pattern.clone())
                } else {
                    (text.to_lowercase(), pattern.to_lowercase())
                };
                match mode {
                    MatchMode::Exact => text == pattern,
                    MatchMode::Prefix => text.starts_with(&pattern),
                    MatchMode::Suffix => text.ends_with(&pattern),
                }
            }
        }
    }
}

/// Conjunction of per-field conditions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Query {
    conditions: Vec<(String, Condition)>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, field: impl Into<String>, condition: Condition) -> Self {
        self.conditions.push((field.into(), condition));
        self
    }

    pub fn eq(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(field, Condition::Eq(value.into()))
    }

    pub fn any_of<V: Into<Value>>(
        self,
        field: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        let values = values.into_iter().map(Into::into).collect();
        self.filter(field, Condition::In(values))
    }

    pub fn lt(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(field, Condition::Lt(value.into()))
    }

    pub fn le(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(field, Condition::Le(value.into()))
    }

    pub fn gt(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(field, Condition::Gt(value.into()))
    }

    pub fn ge(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(field, Condition::Ge(value.into()))
    }

    pub fn text(
        self,
        field: impl Into<String>,
        pattern: impl Into<String>,
        mode: MatchMode,
        case_sensitive: bool,
    ) -> Self {
        self.filter(
            field,
            Condition::Text {
                pattern: pattern.into(),
                mode,
                case_sensitive,
            },
        )
    }

    pub fn conditions(&self) -> impl Iterator<Item = (&str, &Condition)> {
        self.conditions.iter().map(|(f, c)| (f.as_str(), c))
    }

    pub fn matches(&self, record: &Record) -> bool {
        self.conditions
            .iter()
            .all(|(field, cond)| cond.matches(record.get(field)))
    }

    /// Same query without `Eq("")` conditions (those mean "any value").
    pub(crate) fn without_wildcards(&self) -> Query {
        Query {
            conditions: self
                .conditions
                .iter()
                .filter(|(_, c)| !matches!(c, Condition::Eq(v) if v.is_wildcard()))
                .cloned()
                .collect(),
        }
    }
}

impl From<&Filter> for Query {
    /// Single values become `Eq`, lists become `In`.
    fn from(filter: &Filter) -> Self {
        let mut q = Query::new();
        for (field, values) in filter.iter() {
            q = match values {
                [one] => q.eq(field, one.clone()),
                many => q.any_of(field, many.iter().cloned()),
            };
        }
        q
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortKey {
    pub field: String,
    pub descending: bool,
}

impl SortKey {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            descending: false,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            descending: true,
        }
    }
}

/// Insertion-ordered records of one table.
#[derive(Debug, Clone)]
pub struct Store {
    name: String,
    fields: Vec<String>,
    records: Vec<Record>,
}

impl Store {
    /// `fields` is the closed set of names queries may refer to.
    pub fn new(name: impl Into<String>, fields: Vec<String>) -> Self {
        Self {
            name: name.into(),
            fields,
            records: Vec::new(),
        }
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Appends; callers are responsible for not inserting the same data twice.
    pub fn insert(&mut self, records: impl IntoIterator<Item = Record>) {
        self.records.extend(records);
    }

    pub fn check_field(&self, field: &str) -> Result<()> {
        if self.fields.iter().any(|f| f == field) {
            Ok(())
        } else {
            Err(Error::unknown_field(&self.name, field))
        }
    }

    /// Fails on the first field (in the query or in `order`) the table does not have.
    pub fn validate(&self, query: &Query, order: &[SortKey]) -> Result<()> {
        query
            .conditions()
            .map(|(f, _)| f)
            .chain(order.iter().map(|k| k.field.as_str()))
            .try_for_each(|f| self.check_field(f))
    }

    pub fn query(&self, query: &Query, order: &[SortKey]) -> Result<Vec<Record>> {
        self.validate(query, order)?;
        let mut out: Vec<Record> = self
            .records
            .iter()
            .filter(|r| query.matches(r))
            .cloned()
            .collect();
        if !order.is_empty() {
            // stable sort keeps insertion order among ties
            out.sort_by(|a, b| compare_records(a, b, order));
        }
        Ok(out)
    }
}

fn compare_records(a: &Record, b: &Record, order: &[SortKey]) -> Ordering {
    for key in order {
        let va = a.get(&key.field).unwrap_or(&Value::Null);
        let vb = b.get(&key.field).unwrap_or(&Value::Null);
        let ord = va.sort_cmp(vb);
        let ord = if key.descending { ord.reverse() } else { ord };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{TIME_FIELD, VALUE_FIELD};

    fn store() -> Store {
        let mut s = Store::new(
            "demo",
            vec!["GEO".into(), TIME_FIELD.into(), VALUE_FIELD.into()],
        );
        s.insert([
            Record::new().with("GEO", "NL").with(TIME_FIELD, 2001).with(VALUE_FIELD, 3.0),
            Record::new().with("GEO", "BE").with(TIME_FIELD, 2000).with(VALUE_FIELD, 1.0),
            Record::new().with("GEO", "NL").with(TIME_FIELD, 2000).with(VALUE_FIELD, Value::Null),
            Record::new().with("GEO", "Nord").with(TIME_FIELD, 2002).with(VALUE_FIELD, 2.0),
        ]);
        s
    }

    #[test]
    fn equality_and_membership() {
        let s = store();
        assert_eq!(s.query(&Query::new().eq("GEO", "NL"), &[]).unwrap().len(), 2);
        assert_eq!(
            s.query(&Query::new().any_of("GEO", ["NL", "BE"]), &[]).unwrap().len(),
            3
        );
        assert_eq!(s.query(&Query::new(), &[]).unwrap().len(), 4);
    }

    #[test]
    fn range_predicates_skip_nulls() {
        let s = store();
        let got = s.query(&Query::new().ge(VALUE_FIELD, 2.0), &[]).unwrap();
        assert_eq!(got.len(), 2);
        let got = s.query(&Query::new().lt(VALUE_FIELD, 100.0), &[]).unwrap();
        assert_eq!(got.len(), 3);
        let got = s
            .query(&Query::new().gt(TIME_FIELD, 2000).le(TIME_FIELD, 2001), &[])
            .unwrap();
        assert_eq!(got.len(), 1);
    }

    #[test]
    fn numeric_text_operands_match_number_fields() {
        let s = store();
        assert_eq!(s.query(&Query::new().eq(TIME_FIELD, "2001"), &[]).unwrap().len(), 1);
        assert_eq!(
            s.query(&Query::new().any_of(TIME_FIELD, ["2000", "2002"]), &[]).unwrap().len(),
            3
        );
        assert_eq!(s.query(&Query::new().ge(VALUE_FIELD, "2"), &[]).unwrap().len(), 2);
    }

    #[test]
    fn text_matching_modes() {
        let s = store();
        let q = Query::new().text("GEO", "n", MatchMode::Prefix, false);
        assert_eq!(s.query(&q, &[]).unwrap().len(), 3);
        let q = Query::new().text("GEO", "n", MatchMode::Prefix, true);
        assert_eq!(s.query(&q, &[]).unwrap().len(), 0);
        let q = Query::new().text("GEO", "rd", MatchMode::Suffix, true);
        assert_eq!(s.query(&q, &[]).unwrap().len(), 1);
        let q = Query::new().text("GEO", "be", MatchMode::Exact, false);
        assert_eq!(s.query(&q, &[]).unwrap().len(), 1);
    }

    #[test]
    fn sorts_by_several_keys() {
        let s = store();
        let got = s
            .query(&Query::new(), &[SortKey::asc("GEO"), SortKey::desc(TIME_FIELD)])
            .unwrap();
        let keys: Vec<String> = got
            .iter()
            .map(|r| format!("{}{}", r.get("GEO").unwrap(), r.time().unwrap()))
            .collect();
        assert_eq!(keys, ["BE2000", "NL2001", "NL2000", "Nord2002"]);
    }

    #[test]
    fn unknown_field_is_rejected() {
        let s = store();
        let err = s.query(&Query::new().eq("BOGUS", "x"), &[]).unwrap_err();
        assert!(matches!(err, Error::UnknownField { ref field, .. } if field == "BOGUS"));
        let err = s.query(&Query::new(), &[SortKey::asc("NOPE")]).unwrap_err();
        assert!(matches!(err, Error::UnknownField { .. }));
    }
}
