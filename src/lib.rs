//! estat_rs
//!
//! A client library for the Eurostat SDMX REST service. Datasets are pulled into
//! local per-dataset tables on demand and queried offline. Pairs with the `estat` CLI.
//!
//! ### Features
//! - Search the dataset catalog by id or localized name
//! - Resolve and normalize dataset schemas (dimensions, concepts, code lists)
//! - Initialize a table with fixed dimensions and a time window
//! - Fetch by multi-valued filters; every single-valued request is issued at most once,
//!   also under concurrent use
//! - Query fetched records with equality, membership, range and text predicates
//! - Save results as CSV or JSON
//!
//! ### Example
//! ```no_run
//! use estat_rs::{Client, ClientConfig, Filter, Query, SortKey, TableOptions};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let client = Client::new(ClientConfig::default())?;
//! client
//!     .init_table("nrg_100a", TableOptions::new().fix("FREQ", "A").fix("UNIT", "TJ"))
//!     .await?;
//! let rows = client
//!     .ensure_then_query(
//!         "nrg_100a",
//!         &Query::new().eq("GEO", "NL").eq("PRODUCT", "2000").eq("INDIC_NRG", "B_100100"),
//!         &[SortKey::asc("TIME")],
//!     )
//!     .await?;
//! estat_rs::storage::save_csv(&rows, client.table("nrg_100a")?.fields(), "nl_coal.csv")?;
//! # Ok(())
//! # }
//! ```

pub mod api;
mod cache;
pub mod catalog;
pub mod config;
pub mod decode;
pub mod endpoint;
pub mod error;
pub mod filter;
pub mod models;
pub mod registry;
pub mod schema;
pub mod storage;
pub mod store;
pub mod table;

pub use api::Client;
pub use config::ClientConfig;
pub use error::{Error, Result};
pub use filter::{Filter, Selection, expand};
pub use models::{Dataflow, Record, Schema, TimeWindow, Value};
pub use store::{Condition, MatchMode, Query, SortKey};
pub use table::{Table, TableOptions};
