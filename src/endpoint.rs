/// Remote side of the client: where documents live and how they are retrieved.
///
/// [`Urls`] knows the REST layout of the Eurostat SDMX service, [`Endpoint`] turns a
/// URL into a document. [`HttpEndpoint`] is the reqwest-backed implementation; tests
/// plug in their own.
///
/// ### Notes
/// - Data keys carry one slot per schema dimension, joined by `.`; several values of
///   one dimension are joined by `+`. The period dimension's slot carries the table's
///   time-window fragment verbatim (`/?startPeriod=2000`), everything else is
///   percent-encoded.
/// - No request is retried here; retrying is left to the caller.
use crate::config::ClientConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use log::debug;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC};
use reqwest::Client as HttpClient;
use reqwest::redirect::Policy;
use std::time::Duration;

/// Fetches one document per call.
#[async_trait]
pub trait Endpoint: Send + Sync {
    async fn get(&self, url: &str) -> Result<String>;
}

/// reqwest-backed endpoint.
#[derive(Debug, Clone)]
pub struct HttpEndpoint {
    http: HttpClient,
}

impl HttpEndpoint {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let http = HttpClient::builder()
            .timeout(Duration::from_secs(config.timeout_secs)) // total request timeout
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .redirect(Policy::limited(config.max_redirects)) // cap redirects
            .user_agent(concat!("estat_rs/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { http })
    }
}

#[async_trait]
impl Endpoint for HttpEndpoint {
    async fn get(&self, url: &str) -> Result<String> {
        debug!("GET {}", url);
        let resp = self.http.get(url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(Error::Transport(format!(
                "request failed with HTTP {} (GET {})",
                status, url
            )));
        }
        Ok(resp.text().await?)
    }
}

// Allow -, _ unescaped in codes; `.` separates key slots and `+` joins values
const SAFE: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'_');

fn enc_join<'a>(parts: impl IntoIterator<Item = &'a str>) -> String {
    parts
        .into_iter()
        .map(|s| percent_encoding::utf8_percent_encode(s.trim(), SAFE).to_string())
        .collect::<Vec<_>>()
        .join("+")
}

/// One slot of a data key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySlot<'a> {
    /// Dimension codes, OR-ed; a single `""` means all values.
    Codes(&'a [&'a str]),
    /// Inserted as-is (the time-window fragment).
    Raw(&'a str),
}

/// REST layout of the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Urls {
    base_url: String,
    agency: String,
}

impl Urls {
    pub fn new(base_url: impl Into<String>, agency: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            agency: agency.into(),
        }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(config.base_url.clone(), config.agency.clone())
    }

    pub fn dataflows(&self) -> String {
        format!("{}/dataflow/{}/all/latest", self.base_url, self.agency)
    }

    pub fn schema(&self, dataset: &str) -> String {
        format!(
            "{}/datastructure/{}/DSD_{}",
            self.base_url,
            self.agency,
            enc_join([dataset])
        )
    }

    pub fn data(&self, dataset: &str, slots: &[KeySlot<'_>]) -> String {
        let key = slots
            .iter()
            .map(|slot| match slot {
                KeySlot::Codes(codes) => enc_join(codes.iter().copied()),
                KeySlot::Raw(raw) => raw.to_string(),
            })
            .collect::<Vec<_>>()
            .join(".");
        format!("{}/data/{}/{}", self.base_url, enc_join([dataset]), key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_key_follows_dimension_order() {
        let urls = Urls::new("http://host/rest/", "ESTAT");
        let url = urls.data(
            "demo_pjan",
            &[
                KeySlot::Codes(&["A"]),
                KeySlot::Codes(&["NL", "BE"]),
                KeySlot::Codes(&[""]),
                KeySlot::Raw("/?startPeriod=2000"),
            ],
        );
        assert_eq!(url, "http://host/rest/data/demo_pjan/A.NL+BE../?startPeriod=2000");
    }

    #[test]
    fn structure_urls() {
        let urls = Urls::new("http://host/rest", "ESTAT");
        assert_eq!(urls.dataflows(), "http://host/rest/dataflow/ESTAT/all/latest");
        assert_eq!(urls.schema("nrg_100a"), "http://host/rest/datastructure/ESTAT/DSD_nrg_100a");
    }

    #[test]
    fn codes_are_percent_encoded() {
        let urls = Urls::new("http://host", "ESTAT");
        let url = urls.data("x", &[KeySlot::Codes(&["A B"]), KeySlot::Raw("")]);
        assert_eq!(url, "http://host/data/x/A%20B.");
    }

    #[test]
    fn separators_inside_codes_do_not_shift_slots() {
        let urls = Urls::new("http://host", "ESTAT");
        let url = urls.data(
            "x",
            &[KeySlot::Codes(&["B.1"]), KeySlot::Codes(&["a+b"]), KeySlot::Raw("")],
        );
        assert_eq!(url, "http://host/data/x/B%2E1.a%2Bb.");
    }
}
