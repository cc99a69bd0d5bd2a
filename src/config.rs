//! Client configuration: defaults, optionally overlaid from the environment.

use serde::{Deserialize, Serialize};
use std::env;

pub const DEFAULT_BASE_URL: &str = "https://ec.europa.eu/eurostat/SDMX/diss-web/rest";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub base_url: String,
    /// Maintenance agency in structure paths.
    pub agency: String,
    pub timeout_secs: u64,
    pub connect_timeout_secs: u64,
    pub max_redirects: usize,
    /// Preferred languages for display names, most preferred first.
    pub languages: Vec<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.into(),
            agency: "ESTAT".into(),
            timeout_secs: 30,
            connect_timeout_secs: 10,
            max_redirects: 5,
            languages: vec!["en".into(), "de".into(), "fr".into()],
        }
    }
}

impl ClientConfig {
    /// Defaults overlaid with `ESTAT_BASE_URL`, `ESTAT_AGENCY` and `ESTAT_TIMEOUT_SECS`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Like [`ClientConfig::from_env`] with a custom variable source.
    /// Values that do not parse keep their default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut cfg = Self::default();
        if let Some(url) = lookup("ESTAT_BASE_URL").filter(|s| !s.trim().is_empty()) {
            cfg.base_url = url.trim().to_string();
        }
        if let Some(agency) = lookup("ESTAT_AGENCY").filter(|s| !s.trim().is_empty()) {
            cfg.agency = agency.trim().to_string();
        }
        if let Some(secs) = lookup("ESTAT_TIMEOUT_SECS").and_then(|s| s.trim().parse().ok()) {
            cfg.timeout_secs = secs;
        }
        cfg
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn environment_overrides_defaults() {
        let vars: HashMap<&str, &str> = [
            ("ESTAT_BASE_URL", "http://localhost:8080/rest"),
            ("ESTAT_TIMEOUT_SECS", "not-a-number"),
        ]
        .into_iter()
        .collect();
        let cfg = ClientConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(cfg.base_url, "http://localhost:8080/rest");
        assert_eq!(cfg.agency, "ESTAT");
        assert_eq!(cfg.timeout_secs, 30);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let cfg: ClientConfig = serde_json::from_str(r#"{"agency":"XYZ"}"#).unwrap();
        assert_eq!(cfg.agency, "XYZ");
        assert_eq!(cfg.base_url, DEFAULT_BASE_URL);
    }
}
