/// Asynchronous client for the **Eurostat SDMX REST service**.
///
/// The client ties the pieces together: the dataset catalog, schema resolution,
/// one local [`Table`] per initialized dataset and the deduplicating fetch behind
/// [`Client::ensure`]. Queries run against what was fetched so far and never touch
/// the network.
///
/// ### Notes
/// - Listing and schemas are fetched at most once per client, even under concurrent use.
/// - A single-valued data request is issued at most once per table; failed requests
///   are forgotten so the next `ensure` retries them.
/// - Network timeouts come from [`ClientConfig`] and can be overridden through
///   `ESTAT_TIMEOUT_SECS`.
///
/// Typical usage:
/// ```no_run
/// # use estat_rs::{Client, ClientConfig, Filter, Query, SortKey, TableOptions, TimeWindow};
/// # async fn run() -> estat_rs::Result<()> {
/// let client = Client::new(ClientConfig::from_env())?;
/// let opts = TableOptions::new().fix("FREQ", "A").window(TimeWindow::from_year(2010));
/// client.init_table("demo_pjan", opts).await?;
/// client
///     .ensure("demo_pjan", &Filter::new().with("SEX", "T").with("AGE", "TOTAL").with("UNIT", "NR").with("GEO", ["NL", "BE"]))
///     .await?;
/// let rows = client.query("demo_pjan", &Query::new().eq("GEO", "NL"), &[SortKey::asc("TIME")])?;
/// # Ok(())
/// # }
/// ```
use crate::catalog::Catalog;
use crate::config::ClientConfig;
use crate::decode::{Decoder, SdmxDecoder};
use crate::endpoint::{Endpoint, HttpEndpoint, Urls};
use crate::error::{Error, Result};
use crate::filter::Filter;
use crate::models::{Dataflow, Record, Schema};
use crate::schema::SchemaResolver;
use crate::store::{Query, SortKey};
use crate::table::{Remote, Table, TableOptions};
use log::info;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

pub struct Client {
    config: ClientConfig,
    remote: Remote,
    catalog: Catalog,
    schemas: SchemaResolver,
    tables: Mutex<BTreeMap<String, Arc<Table>>>,
}

impl Client {
    /// Client talking HTTP to `config.base_url`.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let endpoint = HttpEndpoint::new(&config)?;
        Ok(Self::with_endpoint(config, Arc::new(endpoint)))
    }

    /// Client reading documents from `endpoint` (a mirror, a fixture server, a stub).
    pub fn with_endpoint(config: ClientConfig, endpoint: Arc<dyn Endpoint>) -> Self {
        let decoder = Arc::new(SdmxDecoder::new(config.languages.clone()));
        Self::with_parts(config, endpoint, decoder)
    }

    pub fn with_parts(
        config: ClientConfig,
        endpoint: Arc<dyn Endpoint>,
        decoder: Arc<dyn Decoder>,
    ) -> Self {
        let urls = Urls::from_config(&config);
        Self {
            catalog: Catalog::new(Arc::clone(&endpoint), Arc::clone(&decoder), urls.clone()),
            schemas: SchemaResolver::new(Arc::clone(&endpoint), Arc::clone(&decoder), urls.clone()),
            remote: Remote {
                endpoint,
                decoder,
                urls,
            },
            config,
            tables: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Datasets whose id or any localized name contains (case-insensitively) one of
    /// `terms`. The listing is downloaded on first use only.
    pub async fn datasets<S: AsRef<str> + Sync>(&self, terms: &[S]) -> Result<Vec<Dataflow>> {
        self.catalog.list(terms).await
    }

    pub async fn dataset(&self, id: &str) -> Result<Dataflow> {
        self.catalog.get(id).await
    }

    /// Normalized schema of `id`, fetched on first use.
    ///
    /// Once the dataset listing has been downloaded, ids missing from it fail with
    /// [`Error::UnknownDataset`] without a request.
    pub async fn schema(&self, id: &str) -> Result<Arc<Schema>> {
        if let Some(schema) = self.schemas.get(id) {
            return Ok(schema);
        }
        if self.catalog.knows(id) == Some(false) {
            return Err(Error::UnknownDataset(id.to_string()));
        }
        self.schemas.resolve(id).await
    }

    /// Ids of all schemas resolved so far, sorted.
    pub fn resolved_schemas(&self) -> Vec<String> {
        self.schemas.resolved()
    }

    /// Code → name for one field of a dataset.
    pub async fn codes(&self, id: &str, field: &str) -> Result<BTreeMap<String, String>> {
        self.schema(id).await?.codes_for(field)
    }

    /// Create (or replace) the local table of `id`. A replaced table starts empty
    /// with nothing marked as fetched.
    pub async fn init_table(&self, id: &str, options: TableOptions) -> Result<Arc<Table>> {
        let schema = self.schema(id).await?;
        let table = Arc::new(Table::new(schema, &options)?);
        if self
            .lock_tables()
            .insert(id.to_string(), Arc::clone(&table))
            .is_some()
        {
            info!("table {} re-initialized, earlier data dropped", id);
        }
        Ok(table)
    }

    pub fn table(&self, id: &str) -> Result<Arc<Table>> {
        self.lock_tables()
            .get(id)
            .cloned()
            .ok_or_else(|| Error::NoSuchTable(id.to_string()))
    }

    /// Ids of initialized tables, sorted.
    pub fn tables(&self) -> Vec<String> {
        self.lock_tables().keys().cloned().collect()
    }

    pub fn remove_table(&self, id: &str) -> Option<Arc<Table>> {
        self.lock_tables().remove(id)
    }

    fn lock_tables(&self) -> MutexGuard<'_, BTreeMap<String, Arc<Table>>> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fetch whatever part of `filter` is not local yet.
    ///
    /// `filter` must give every variable dimension of the table a value (or a list;
    /// `""` stands for all values) and nothing else. Returns the newly inserted
    /// records.
    pub async fn ensure(&self, id: &str, filter: &Filter) -> Result<Vec<Record>> {
        let table = self.table(id)?;
        table.ensure(filter, &self.remote).await
    }

    /// Records of table `id` matching `query`, sorted by `order`.
    pub fn query(&self, id: &str, query: &Query, order: &[SortKey]) -> Result<Vec<Record>> {
        self.table(id)?.query(query, order)
    }

    /// Fetch what `query` needs, then run it locally.
    ///
    /// Variable dimensions pinned by `Eq`/`In` on codes are fetched for exactly those
    /// codes; the others are fetched in full. `Eq("")` conditions mean "any value"
    /// and are not applied locally.
    pub async fn ensure_then_query(
        &self,
        id: &str,
        query: &Query,
        order: &[SortKey],
    ) -> Result<Vec<Record>> {
        let table = self.table(id)?;
        table.validate(query, order)?;
        table.ensure(&table.fetch_filter(query), &self.remote).await?;
        table.query(&query.without_wildcards(), order)
    }
}
