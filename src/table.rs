//! Local tables: one per dataset, holding whatever observations were fetched so far.
//!
//! A table splits the schema's dimensions into *fixed* ones (pinned at
//! initialization, never stored, baked into every request) and *variable* ones (one
//! value per request). The period dimension is always fixed; its forced value is
//! the time-window fragment.
//!
//! [`Table::ensure`] is the deduplicating fetch: a multi-valued filter is expanded
//! into single-valued requests, each identified by a [`CacheKey`]; satisfied keys
//! are skipped, pending ones are awaited, absent ones are fetched exactly once.

use crate::decode::{DataResponse, Decoder};
use crate::endpoint::{Endpoint, KeySlot, Urls};
use crate::error::{Error, Result};
use crate::filter::{Filter, Selection, expand};
use crate::models::{Record, Schema, TIME_FIELD, TimeWindow, VALUE_FIELD, Value};
use crate::registry::{CacheKey, FetchRegistry, FetchState, SharedFetch};
use crate::store::{Condition, Query, SortKey, Store};
use futures::FutureExt;
use futures::future::join_all;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// How to set up a table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableOptions {
    /// Dimensions pinned to one value (not stored, not required per fetch).
    pub fixed: BTreeMap<String, String>,
    pub window: TimeWindow,
}

impl TableOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fix(mut self, dimension: impl Into<String>, value: impl Into<String>) -> Self {
        self.fixed.insert(dimension.into(), value.into());
        self
    }

    pub fn window(mut self, window: TimeWindow) -> Self {
        self.window = window;
        self
    }
}

/// Everything a fetch needs from the outside world.
#[derive(Clone)]
pub(crate) struct Remote {
    pub endpoint: Arc<dyn Endpoint>,
    pub decoder: Arc<dyn Decoder>,
    pub urls: Urls,
}

struct TableState {
    store: Store,
    registry: FetchRegistry,
}

pub struct Table {
    id: String,
    schema: Arc<Schema>,
    fixed_dims: Vec<String>,
    fixed_values: BTreeMap<String, String>,
    variable_dims: Vec<String>,
    fields: Vec<String>,
    state: Mutex<TableState>,
}

impl Table {
    /// Partition the schema's dimensions and create an empty store.
    ///
    /// Fails with [`Error::UnknownField`] when `options` fixes something that is
    /// not a dimension of the schema.
    pub fn new(schema: Arc<Schema>, options: &TableOptions) -> Result<Self> {
        let id = schema.id.clone();
        let period = schema.period_dimension.clone();
        for dim in options.fixed.keys() {
            if !schema.has_dimension(dim) {
                return Err(Error::unknown_field(&id, dim));
            }
            if period.as_deref() == Some(dim.as_str()) {
                warn!("{}: '{}' is set through the time window, fixed value ignored", id, dim);
            }
        }

        let mut fixed_dims = Vec::new();
        let mut fixed_values = BTreeMap::new();
        let mut variable_dims = Vec::new();
        for dim in &schema.dimensions {
            if period.as_deref() == Some(dim.as_str()) {
                continue;
            }
            match options.fixed.get(dim) {
                Some(value) => {
                    fixed_dims.push(dim.clone());
                    fixed_values.insert(dim.clone(), value.clone());
                }
                None => variable_dims.push(dim.clone()),
            }
        }
        match &period {
            Some(p) => {
                fixed_dims.push(p.clone());
                fixed_values.insert(p.clone(), options.window.to_query_fragment());
            }
            None if options.window != TimeWindow::all() => {
                warn!("{}: schema has no period dimension, time window ignored", id);
            }
            None => {}
        }

        let mut fields: Vec<String> = schema
            .concepts
            .iter()
            .filter(|c| !fixed_dims.contains(c))
            .cloned()
            .collect();
        for extra in variable_dims
            .iter()
            .map(String::as_str)
            .chain([TIME_FIELD, VALUE_FIELD])
        {
            if !fields.iter().any(|f| f == extra) {
                fields.push(extra.to_string());
            }
        }

        info!(
            "table {}: fixed {:?}, variable {:?}, {} fields",
            id,
            fixed_values,
            variable_dims,
            fields.len()
        );
        let store = Store::new(id.clone(), fields.clone());
        Ok(Self {
            id,
            schema,
            fixed_dims,
            fixed_values,
            variable_dims,
            fields,
            state: Mutex::new(TableState {
                store,
                registry: FetchRegistry::new(),
            }),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Fixed dimensions in schema order, the period dimension last.
    pub fn fixed_dims(&self) -> &[String] {
        &self.fixed_dims
    }

    pub fn fixed_values(&self) -> &BTreeMap<String, String> {
        &self.fixed_values
    }

    pub fn variable_dims(&self) -> &[String] {
        &self.variable_dims
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Number of records fetched so far.
    pub fn len(&self) -> usize {
        self.lock().store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `(pending, satisfied)` request counts.
    pub fn fetch_counts(&self) -> (usize, usize) {
        let state = self.lock();
        (state.registry.pending(), state.registry.satisfied())
    }

    fn lock(&self) -> MutexGuard<'_, TableState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Canonical key of a single-valued request: one value per variable dimension,
    /// in dimension order, whatever order the selection lists them in.
    pub fn cache_key(&self, selection: &Selection) -> Result<CacheKey> {
        if let Some((field, _)) = selection
            .iter()
            .find(|(f, _)| !self.variable_dims.iter().any(|d| d == f))
        {
            return Err(Error::unknown_field(&self.id, field));
        }
        let values = self
            .variable_dims
            .iter()
            .map(|dim| {
                selection
                    .get(dim)
                    .map(Value::to_string)
                    .ok_or_else(|| Error::MissingDimension {
                        table: self.id.clone(),
                        dimension: dim.clone(),
                    })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(CacheKey::new(self.id.clone(), values))
    }

    /// A fetch filter names every variable dimension and nothing else.
    ///
    /// Checked on the filter itself, so a dimension with an empty value list (which
    /// expands to no request at all) does not hide a missing or unknown one.
    pub fn check_filter(&self, filter: &Filter) -> Result<()> {
        if let Some(field) = filter
            .fields()
            .find(|f| !self.variable_dims.iter().any(|d| d == f))
        {
            return Err(Error::unknown_field(&self.id, field));
        }
        match self
            .variable_dims
            .iter()
            .find(|d| filter.get(d).is_none())
        {
            Some(dim) => Err(Error::MissingDimension {
                table: self.id.clone(),
                dimension: dim.clone(),
            }),
            None => Ok(()),
        }
    }

    /// Key of the request a stored record belongs to.
    fn record_key(&self, record: &Record) -> CacheKey {
        let values = self
            .variable_dims
            .iter()
            .map(|dim| record.get(dim).map(Value::to_string).unwrap_or_default())
            .collect();
        CacheKey::new(self.id.clone(), values)
    }

    /// Data URL for `key`: fixed values substituted, slots in schema order.
    pub fn data_url(&self, urls: &Urls, key: &CacheKey) -> String {
        let period = self.schema.period_dimension.as_deref();
        let values: Vec<(&str, bool)> = self
            .schema
            .dimensions
            .iter()
            .map(|dim| {
                if let Some(v) = self.fixed_values.get(dim) {
                    (v.as_str(), Some(dim.as_str()) == period)
                } else {
                    let v = self
                        .variable_dims
                        .iter()
                        .position(|d| d == dim)
                        .and_then(|i| key.values().get(i))
                        .map(String::as_str)
                        .unwrap_or("");
                    (v, false)
                }
            })
            .collect();
        let singles: Vec<[&str; 1]> = values.iter().map(|(v, _)| [*v]).collect();
        let slots: Vec<KeySlot<'_>> = values
            .iter()
            .zip(&singles)
            .map(|((v, raw), single)| {
                if *raw {
                    KeySlot::Raw(v)
                } else {
                    KeySlot::Codes(single)
                }
            })
            .collect();
        urls.data(&self.id, &slots)
    }

    /// Records matching `query`, optionally sorted. Never touches the network.
    pub fn query(&self, query: &Query, order: &[SortKey]) -> Result<Vec<Record>> {
        self.lock().store.query(query, order)
    }

    pub fn validate(&self, query: &Query, order: &[SortKey]) -> Result<()> {
        self.lock().store.validate(query, order)
    }

    /// Variable-dimension filter needed to answer `query`.
    ///
    /// A dimension constrained by a single `Eq`/`In` on codes is fetched for exactly
    /// those codes; anything else (no condition, `""`, ranges, text matching) fetches
    /// all values.
    pub fn fetch_filter(&self, query: &Query) -> Filter {
        let mut filter = Filter::new();
        for dim in &self.variable_dims {
            let conditions: Vec<&Condition> = query
                .conditions()
                .filter(|(f, _)| f == dim)
                .map(|(_, c)| c)
                .collect();
            let codes: Option<Vec<Value>> = match conditions.as_slice() {
                [Condition::Eq(v)] => Some(vec![v.clone()]),
                [Condition::In(vs)] => Some(vs.clone()),
                _ => None,
            }
            .filter(|vs| {
                !vs.is_empty() && vs.iter().all(|v| v.as_str().is_some_and(|s| !s.is_empty()))
            });
            filter.set(dim.clone(), codes.unwrap_or_else(|| vec![Value::from("")]));
        }
        filter
    }

    /// Make sure every single-valued request in `filter` has been fetched.
    ///
    /// Returns the records this call caused to be inserted, including those of
    /// in-flight requests it attached to. Fails if any request fails; the others
    /// still complete and keep their records.
    pub(crate) async fn ensure(self: &Arc<Self>, filter: &Filter, remote: &Remote) -> Result<Vec<Record>> {
        self.check_filter(filter)?;
        // every key is validated before anything is issued
        let keys = expand(filter)
            .iter()
            .map(|s| self.cache_key(s))
            .collect::<Result<Vec<_>>>()?;

        let waits: Vec<SharedFetch> = {
            let mut state = self.lock();
            let mut seen = HashSet::new();
            let mut waits = Vec::new();
            for key in keys {
                if !seen.insert(key.clone()) || state.registry.is_covered(&key) {
                    continue;
                }
                let attached = match state.registry.state(&key) {
                    Some(FetchState::Pending(shared)) => Some(shared.clone()),
                    Some(FetchState::Satisfied { .. }) => continue,
                    None => None,
                };
                let fetch = attached.unwrap_or_else(|| {
                    let fetch = self.fetch(key.clone(), remote.clone());
                    state.registry.mark_pending(key, fetch.clone());
                    fetch
                });
                waits.push(fetch);
            }
            waits
        };
        if waits.is_empty() {
            return Ok(Vec::new());
        }

        let mut fresh = Vec::new();
        let mut first_err = None;
        for outcome in join_all(waits).await {
            match outcome {
                Ok(records) => fresh.extend(records.iter().cloned()),
                Err(e) => {
                    first_err.get_or_insert(e);
                }
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(fresh),
        }
    }

    /// The shared operation for one absent key. It settles the registry itself, so
    /// the outcome is recorded whichever waiter ends up driving it.
    fn fetch(self: &Arc<Self>, key: CacheKey, remote: Remote) -> SharedFetch {
        let table = Arc::clone(self);
        let url = self.data_url(&remote.urls, &key);
        async move {
            debug!("fetching {} from {}", key, url);
            let outcome = table.download(&remote, &url).await;
            let mut state = table.lock();
            match outcome {
                Ok(records) => {
                    let fresh: Vec<Record> = if state.registry.is_covered(&key) {
                        Vec::new()
                    } else {
                        records
                            .into_iter()
                            .filter(|r| !state.registry.is_covered(&table.record_key(r)))
                            .collect()
                    };
                    state.store.insert(fresh.iter().cloned());
                    debug!("{} satisfied with {} new records", key, fresh.len());
                    state.registry.mark_satisfied(key, fresh.len());
                    Ok(Arc::new(fresh))
                }
                Err(e) => {
                    warn!("{} failed: {}", key, e);
                    state.registry.revert(&key);
                    Err(e)
                }
            }
        }
        .boxed()
        .shared()
    }

    async fn download(&self, remote: &Remote, url: &str) -> Result<Vec<Record>> {
        let xml = remote.endpoint.get(url).await?;
        match remote.decoder.data(&xml, &self.fields)? {
            DataResponse::Observations(records) => Ok(records),
            DataResponse::NoResults => Ok(Vec::new()),
            DataResponse::TooManyResults(msg) => Err(Error::TooManyResults(msg)),
        }
    }
}
