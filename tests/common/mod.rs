//! Canned SDMX-ML service shared by the integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use estat_rs::endpoint::Endpoint;
use estat_rs::{Client, ClientConfig, Error, Result};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

pub const BASE: &str = "http://stub/rest";

/// Serves documents by exact path (relative to [`BASE`]), counts calls per path and
/// yields once before answering so that concurrent callers overlap.
#[derive(Default)]
pub struct StubEndpoint {
    routes: Mutex<HashMap<String, String>>,
    failing: Mutex<HashSet<String>>,
    calls: Mutex<Vec<String>>,
}

impl StubEndpoint {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(self, path: &str, body: impl Into<String>) -> Self {
        self.routes.lock().unwrap().insert(path.to_string(), body.into());
        self
    }

    pub fn fail(&self, path: &str) {
        self.failing.lock().unwrap().insert(path.to_string());
    }

    pub fn heal(&self, path: &str) {
        self.failing.lock().unwrap().remove(path);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, path: &str) -> usize {
        self.calls().iter().filter(|p| *p == path).count()
    }

    /// Calls to data paths only.
    pub fn data_calls(&self) -> usize {
        self.calls().iter().filter(|p| p.starts_with("/data/")).count()
    }
}

#[async_trait]
impl Endpoint for StubEndpoint {
    async fn get(&self, url: &str) -> Result<String> {
        let path = url.strip_prefix(BASE).unwrap_or(url).to_string();
        self.calls.lock().unwrap().push(path.clone());
        tokio::task::yield_now().await;
        if self.failing.lock().unwrap().contains(&path) {
            return Err(Error::Transport(format!("connection reset ({})", path)));
        }
        self.routes
            .lock()
            .unwrap()
            .get(&path)
            .cloned()
            .ok_or_else(|| Error::Transport(format!("HTTP 404 ({})", path)))
    }
}

pub fn client(stub: &Arc<StubEndpoint>) -> Client {
    let config = ClientConfig::default().with_base_url(BASE);
    Client::with_endpoint(config, Arc::clone(stub) as Arc<dyn Endpoint>)
}

pub fn dataflows_xml(flows: &[(&str, &str)]) -> String {
    let items: String = flows
        .iter()
        .map(|(id, name)| {
            format!(
                r#"<str:Dataflow id="{id}"><com:Name xml:lang="en">{name}</com:Name></str:Dataflow>"#
            )
        })
        .collect();
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<mes:Structure xmlns:mes="m" xmlns:str="s" xmlns:com="c"><mes:Structures><str:Dataflows>{items}</str:Dataflows></mes:Structures></mes:Structure>"#
    )
}

/// Structure document; `dims` in declared order, `TIME_PERIOD` becomes the time dimension.
pub fn dsd_xml(dims: &[&str], extra_concepts: &[&str], code_lists: &[(&str, &[(&str, &str)])]) -> String {
    let lists: String = code_lists
        .iter()
        .map(|(id, codes)| {
            let codes: String = codes
                .iter()
                .map(|(c, n)| format!(r#"<str:Code id="{c}"><com:Name xml:lang="en">{n}</com:Name></str:Code>"#))
                .collect();
            format!(r#"<str:Codelist id="{id}"><com:Name xml:lang="en">{id}</com:Name>{codes}</str:Codelist>"#)
        })
        .collect();
    let concepts: String = dims
        .iter()
        .chain(extra_concepts)
        .map(|c| format!(r#"<str:Concept id="{c}"/>"#))
        .collect();
    let dimensions: String = dims
        .iter()
        .enumerate()
        .map(|(i, d)| {
            let tag = if *d == "TIME_PERIOD" { "TimeDimension" } else { "Dimension" };
            format!(r#"<str:{tag} id="{d}" position="{}"/>"#, i + 1)
        })
        .collect();
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<mes:Structure xmlns:mes="m" xmlns:str="s" xmlns:com="c"><mes:Structures>
<str:Codelists>{lists}</str:Codelists>
<str:Concepts><str:ConceptScheme id="CS">{concepts}</str:ConceptScheme></str:Concepts>
<str:DataStructures><str:DataStructure id="DSD"><str:DataStructureComponents>
<str:DimensionList id="DimensionDescriptor">{dimensions}</str:DimensionList>
</str:DataStructureComponents></str:DataStructure></str:DataStructures>
</mes:Structures></mes:Structure>"#
    )
}

/// A series: its key values and `(period, value)` observations.
pub type Series<'a> = (&'a [(&'a str, &'a str)], &'a [(&'a str, &'a str)]);

pub fn data_xml(series: &[Series<'_>]) -> String {
    let body: String = series
        .iter()
        .map(|(key, obs)| {
            let key: String = key
                .iter()
                .map(|(id, v)| format!(r#"<generic:Value id="{id}" value="{v}"/>"#))
                .collect();
            let obs: String = obs
                .iter()
                .map(|(t, v)| {
                    format!(
                        r#"<generic:Obs><generic:ObsDimension value="{t}"/><generic:ObsValue value="{v}"/></generic:Obs>"#
                    )
                })
                .collect();
            format!(r#"<generic:Series><generic:SeriesKey>{key}</generic:SeriesKey>{obs}</generic:Series>"#)
        })
        .collect();
    format!(
        r#"<message:GenericData xmlns:message="m" xmlns:generic="g"><message:DataSet>{body}</message:DataSet></message:GenericData>"#
    )
}

pub fn footer_only_xml(text: &str) -> String {
    format!(
        r#"<message:GenericData xmlns:message="m" xmlns:common="c"><message:DataSet/><footer:Footer xmlns:footer="f"><footer:Message code="413"><common:Text>{text}</common:Text></footer:Message></footer:Footer></message:GenericData>"#
    )
}

/// `demo`: dimensions FREQ, SEX, GEO with the period declared second.
pub const DEMO_DSD: &str = "/datastructure/ESTAT/DSD_demo";

pub fn demo_dsd() -> String {
    let geo: &[(&str, &str)] = &[("NL", "Netherlands"), ("BE", "Belgium")];
    let sex: &[(&str, &str)] = &[("T", "Total"), ("F", "Females"), ("M", "Males")];
    dsd_xml(
        &["FREQ", "TIME_PERIOD", "SEX", "GEO"],
        &["OBS_VALUE", "OBS_FLAG"],
        &[("CL_GEO", geo), ("CL_SEX", sex)],
    )
}

/// One annual series for `sex`/`geo` with observations 2000..=2002.
pub fn demo_series(sex: &str, geo: &str, base: u32) -> String {
    let key: &[(&str, &str)] = &[("FREQ", "A"), ("SEX", sex), ("GEO", geo)];
    let values: Vec<String> = (0..3).map(|i| (base + i).to_string()).collect();
    let obs: &[(&str, &str)] = &[
        ("2000", values[0].as_str()),
        ("2001", values[1].as_str()),
        ("2002", values[2].as_str()),
    ];
    data_xml(&[(key, obs)])
}

/// Stub serving the `demo` schema and one series per sex/geo pair.
pub fn demo_stub() -> StubEndpoint {
    let mut stub = StubEndpoint::new().route(DEMO_DSD, demo_dsd());
    for (i, sex) in ["T", "F", "M"].iter().enumerate() {
        for (j, geo) in ["NL", "BE"].iter().enumerate() {
            let base = 100 * (i as u32 + 1) + 10 * j as u32;
            stub = stub.route(&format!("/data/demo/A.{sex}.{geo}."), demo_series(sex, geo, base));
        }
    }
    stub
}
