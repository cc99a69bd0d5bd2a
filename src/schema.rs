//! Schema resolution: fetch a dataset's structure definition once, normalize it and
//! keep it for the rest of the session.

use crate::cache::SharedCache;
use crate::decode::{Decoder, SchemaDocument};
use crate::endpoint::{Endpoint, Urls};
use crate::error::Result;
use crate::models::{PERIOD_DIMENSION, Schema};
use futures::FutureExt;
use log::{debug, info};
use std::sync::Arc;

/// Build a [`Schema`] from a decoded document, moving the period dimension to the end.
///
/// Data keys are assembled in dimension order, so a period dimension anywhere but
/// last would shift every following slot. The other dimensions keep their relative
/// order.
pub fn normalize(id: &str, doc: SchemaDocument) -> Schema {
    let period = doc
        .time_dimension
        .unwrap_or_else(|| PERIOD_DIMENSION.to_string());
    let mut dimensions = doc.dimensions;
    let position = dimensions.iter().position(|d| *d == period);
    if let Some(pos) = position
        && pos + 1 != dimensions.len()
    {
        info!(
            "{}: period dimension '{}' declared at position {} of {}, moved last",
            id,
            period,
            pos + 1,
            dimensions.len()
        );
        let dim = dimensions.remove(pos);
        dimensions.push(dim);
    }
    Schema {
        id: id.to_string(),
        dimensions,
        period_dimension: position.map(|_| period),
        concepts: doc.concepts,
        code_lists: doc.code_lists,
    }
}

/// Fetches and caches schemas; concurrent requests for one dataset share a fetch.
pub struct SchemaResolver {
    endpoint: Arc<dyn Endpoint>,
    decoder: Arc<dyn Decoder>,
    urls: Urls,
    cache: Arc<SharedCache<String, Arc<Schema>>>,
}

impl SchemaResolver {
    pub fn new(endpoint: Arc<dyn Endpoint>, decoder: Arc<dyn Decoder>, urls: Urls) -> Self {
        Self {
            endpoint,
            decoder,
            urls,
            cache: Arc::new(SharedCache::new()),
        }
    }

    pub async fn resolve(&self, dataset: &str) -> Result<Arc<Schema>> {
        let endpoint = Arc::clone(&self.endpoint);
        let decoder = Arc::clone(&self.decoder);
        let url = self.urls.schema(dataset);
        let id = dataset.to_string();
        self.cache
            .get_or_load(dataset.to_string(), move || {
                async move {
                    debug!("fetching schema of {} from {}", id, url);
                    let xml = endpoint.get(&url).await?;
                    let doc = decoder.schema(&xml)?;
                    Ok(Arc::new(normalize(&id, doc)))
                }
                .boxed()
            })
            .await
    }

    /// Schema already resolved in this session.
    pub fn get(&self, dataset: &str) -> Option<Arc<Schema>> {
        self.cache.get(&dataset.to_string())
    }

    pub fn resolved(&self) -> Vec<String> {
        let mut ids = self.cache.ready_keys();
        ids.sort();
        ids
    }
}
