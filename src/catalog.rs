//! Dataset catalog: the listing of every dataflow, fetched once per session.

use crate::cache::SharedCache;
use crate::decode::Decoder;
use crate::endpoint::{Endpoint, Urls};
use crate::error::{Error, Result};
use crate::models::Dataflow;
use futures::FutureExt;
use log::debug;
use std::sync::Arc;

pub struct Catalog {
    endpoint: Arc<dyn Endpoint>,
    decoder: Arc<dyn Decoder>,
    urls: Urls,
    listing: Arc<SharedCache<(), Arc<Vec<Dataflow>>>>,
}

impl Catalog {
    pub fn new(endpoint: Arc<dyn Endpoint>, decoder: Arc<dyn Decoder>, urls: Urls) -> Self {
        Self {
            endpoint,
            decoder,
            urls,
            listing: Arc::new(SharedCache::new()),
        }
    }

    async fn all(&self) -> Result<Arc<Vec<Dataflow>>> {
        let endpoint = Arc::clone(&self.endpoint);
        let decoder = Arc::clone(&self.decoder);
        let url = self.urls.dataflows();
        self.listing
            .get_or_load((), move || {
                async move {
                    debug!("fetching dataset listing from {}", url);
                    let xml = endpoint.get(&url).await?;
                    Ok(Arc::new(decoder.dataflows(&xml)?))
                }
                .boxed()
            })
            .await
    }

    /// Datasets whose id or any localized name contains (case-insensitively) at least
    /// one of `terms`; every dataset when `terms` is empty.
    pub async fn list<S: AsRef<str>>(&self, terms: &[S]) -> Result<Vec<Dataflow>> {
        let all = self.all().await?;
        Ok(all.iter().filter(|d| d.matches(terms)).cloned().collect())
    }

    /// Whether `id` is known, judged from the listing if it was already downloaded.
    /// `None` when no listing is at hand.
    pub fn knows(&self, id: &str) -> Option<bool> {
        self.listing
            .get(&())
            .map(|all| all.iter().any(|d| d.id == id))
    }

    pub async fn get(&self, id: &str) -> Result<Dataflow> {
        self.all()
            .await?
            .iter()
            .find(|d| d.id == id)
            .cloned()
            .ok_or_else(|| Error::UnknownDataset(id.to_string()))
    }
}
