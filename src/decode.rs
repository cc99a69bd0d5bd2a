//! SDMX-ML decoding.
//!
//! Documents are read into a small element tree (namespace prefixes dropped, so
//! `str:Dimension` and `Dimension` are the same element) and then walked by
//! element name. Three kinds of documents are understood: the dataflow listing,
//! the data structure definition and generic data messages.

use crate::error::{Error, Result};
use crate::models::{
    Code, CodeList, Dataflow, FLAG_FIELD, Record, STATUS_FIELD, TIME_FIELD, VALUE_FIELD, Value,
};
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use std::collections::BTreeMap;

/// Schema as found in the document, before normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaDocument {
    /// Dimensions ordered by their declared position (time dimension included).
    pub dimensions: Vec<String>,
    /// Id of the dimension declared as `TimeDimension`, if any.
    pub time_dimension: Option<String>,
    pub concepts: Vec<String>,
    pub code_lists: Vec<CodeList>,
}

/// Outcome of a data request as reported by the service.
#[derive(Debug, Clone, PartialEq)]
pub enum DataResponse {
    Observations(Vec<Record>),
    NoResults,
    /// The service declined to answer inline; carries its message.
    TooManyResults(String),
}

/// Turns raw documents into model values. Errors are [`Error::Malformed`].
pub trait Decoder: Send + Sync {
    fn dataflows(&self, xml: &str) -> Result<Vec<Dataflow>>;
    fn schema(&self, xml: &str) -> Result<SchemaDocument>;
    /// Series-key values are kept only for `fields`.
    fn data(&self, xml: &str, fields: &[String]) -> Result<DataResponse>;
}

#[derive(Debug, Clone, Default)]
pub struct SdmxDecoder {
    languages: Vec<String>,
}

impl SdmxDecoder {
    /// `languages` orders the candidates when a code has names in several languages.
    pub fn new(languages: Vec<String>) -> Self {
        Self { languages }
    }

    fn pick_name(&self, el: &Element) -> Option<String> {
        let names: Vec<&Element> = el.children_named("Name").collect();
        self.languages
            .iter()
            .find_map(|lang| names.iter().find(|n| n.attr("lang") == Some(lang.as_str())))
            .or_else(|| names.first())
            .map(|n| n.text.clone())
    }
}

impl Decoder for SdmxDecoder {
    fn dataflows(&self, xml: &str) -> Result<Vec<Dataflow>> {
        let root = parse(xml)?;
        let list = root
            .find("Dataflows")
            .ok_or_else(|| malformed("node 'Dataflows' not found"))?;
        list.children_named("Dataflow")
            .map(|d| {
                let id = d.required_attr("id")?;
                let names = d
                    .children_named("Name")
                    .map(|n| (n.attr("lang").unwrap_or("").to_string(), n.text.clone()))
                    .collect();
                Ok(Dataflow { id, names })
            })
            .collect()
    }

    fn schema(&self, xml: &str) -> Result<SchemaDocument> {
        let root = parse(xml)?;
        let dim_list = root
            .find("DimensionList")
            .ok_or_else(|| malformed("node 'DimensionList' not found"))?;

        let mut positioned: Vec<(usize, String)> = Vec::new();
        let mut time_dimension = None;
        for (i, el) in dim_list.children.iter().enumerate() {
            let is_time = el.name == "TimeDimension";
            if el.name != "Dimension" && !is_time {
                continue;
            }
            let id = el.required_attr("id")?;
            let pos = match el.attr("position") {
                Some(p) => p
                    .trim()
                    .parse::<usize>()
                    .map_err(|_| malformed(format!("bad position '{}' for dimension {}", p, id)))?,
                None => i + 1,
            };
            if is_time {
                time_dimension = Some(id.clone());
            }
            positioned.push((pos, id));
        }
        positioned.sort_by_key(|(pos, _)| *pos);
        let dimensions = positioned.into_iter().map(|(_, id)| id).collect();

        let concepts = root
            .find_all("ConceptScheme")
            .into_iter()
            .flat_map(|scheme| scheme.children_named("Concept"))
            .map(|c| c.required_attr("id"))
            .collect::<Result<Vec<_>>>()?;

        let code_lists = root
            .find_all("Codelist")
            .into_iter()
            .map(|cl| {
                let id = cl.required_attr("id")?;
                let codes = cl
                    .children_named("Code")
                    .map(|code| {
                        let id = code.required_attr("id")?;
                        let name = self.pick_name(code).unwrap_or_default();
                        Ok(Code { id, name })
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(CodeList {
                    field: id.strip_prefix("CL_").unwrap_or(&id).to_string(),
                    name: self.pick_name(cl).unwrap_or_default(),
                    id,
                    codes,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(SchemaDocument {
            dimensions,
            time_dimension,
            concepts,
            code_lists,
        })
    }

    fn data(&self, xml: &str, fields: &[String]) -> Result<DataResponse> {
        let root = parse(xml)?;
        if root.name != "GenericData" {
            return Err(malformed(format!(
                "expected 'GenericData' document, found '{}'",
                root.name
            )));
        }
        let footer = footer_text(&root);
        let Some(dataset) = root.child("DataSet") else {
            return Err(match footer {
                Some(text) => malformed(format!("message from server: {}", text)),
                None => malformed("nodes 'DataSet' and 'Footer/Message/Text' not found"),
            });
        };

        let series: Vec<&Element> = dataset.children_named("Series").collect();
        if series.is_empty() {
            return Ok(match footer {
                Some(text) if !text.to_lowercase().contains("no results") => {
                    DataResponse::TooManyResults(text)
                }
                _ => DataResponse::NoResults,
            });
        }

        let mut records = Vec::new();
        for s in series {
            let mut base = Record::new();
            if let Some(key) = s.child("SeriesKey") {
                for v in key.children_named("Value") {
                    let id = v.required_attr("id")?;
                    if fields.iter().any(|f| *f == id) {
                        base.set(id, v.attr("value").unwrap_or(""));
                    }
                }
            }
            for obs in s.children_named("Obs") {
                records.push(decode_obs(obs, base.clone())?);
            }
        }
        Ok(DataResponse::Observations(records))
    }
}

fn decode_obs(obs: &Element, mut rec: Record) -> Result<Record> {
    let period = obs
        .child("ObsDimension")
        .and_then(|d| d.attr("value"))
        .ok_or_else(|| malformed("observation without 'ObsDimension'"))?;
    rec.set(TIME_FIELD, parse_period(period));

    let mut status = None;
    if let Some(attrs) = obs.child("Attributes") {
        for v in attrs.children_named("Value") {
            let value = v.attr("value").unwrap_or("").to_string();
            match v.attr("id") {
                Some(STATUS_FIELD) => status = Some(value),
                Some(FLAG_FIELD) => rec.set(FLAG_FIELD, value),
                _ => {}
            }
        }
    }

    let value = match obs.child("ObsValue").and_then(|v| v.attr("value")) {
        Some(raw) => parse_obs_value(raw, &rec)?,
        // no value reported: unknown when flagged "na", (practically) zero otherwise
        None => match status.as_deref() {
            Some("na") | None => Value::Null,
            Some(_) => Value::Number(0.0),
        },
    };
    rec.set(VALUE_FIELD, value);
    if let Some(status) = status {
        rec.set(STATUS_FIELD, status);
    }
    Ok(rec)
}

fn parse_period(raw: &str) -> Value {
    match raw.trim().parse::<f64>() {
        Ok(n) => Value::Number(n),
        Err(_) => Value::Text(raw.trim().to_string()),
    }
}

fn parse_obs_value(raw: &str, rec: &Record) -> Result<Value> {
    let raw = raw.trim();
    if raw == "NaN" || raw.is_empty() {
        return Ok(Value::Null);
    }
    let n = raw.parse::<f64>().map_err(|_| {
        malformed(format!(
            "OBS_VALUE has unexpected value '{}' for {}",
            raw,
            serde_json::to_string(rec).unwrap_or_default()
        ))
    })?;
    // "nan", "inf" and friends parse too; records only ever hold finite numbers
    Ok(if n.is_finite() { Value::Number(n) } else { Value::Null })
}

fn footer_text(root: &Element) -> Option<String> {
    let footer = root.child("Footer")?;
    let texts: Vec<&str> = footer
        .find_all("Text")
        .into_iter()
        .map(|t| t.text.trim())
        .filter(|t| !t.is_empty())
        .collect();
    if texts.is_empty() {
        None
    } else {
        Some(texts.join(", "))
    }
}

fn malformed(msg: impl Into<String>) -> Error {
    Error::Malformed(msg.into())
}

/// Element with local names; text is the concatenated direct character data.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Element {
    name: String,
    attrs: BTreeMap<String, String>,
    text: String,
    children: Vec<Element>,
}

impl Element {
    fn attr(&self, name: &str) -> Option<&str> {
        self.attrs.get(name).map(String::as_str)
    }

    fn required_attr(&self, name: &str) -> Result<String> {
        self.attr(name)
            .map(str::to_string)
            .ok_or_else(|| malformed(format!("'{}' without attribute '{}'", self.name, name)))
    }

    fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// First descendant (depth first) named `name`.
    fn find(&self, name: &str) -> Option<&Element> {
        self.children
            .iter()
            .find_map(|c| if c.name == name { Some(c) } else { c.find(name) })
    }

    /// All descendants named `name`; matches are not searched further.
    fn find_all(&self, name: &str) -> Vec<&Element> {
        let mut out = Vec::new();
        let mut stack: Vec<&Element> = self.children.iter().rev().collect();
        while let Some(el) = stack.pop() {
            if el.name == name {
                out.push(el);
            } else {
                stack.extend(el.children.iter().rev());
            }
        }
        out
    }
}

fn element_from(start: &BytesStart<'_>) -> Result<Element> {
    let mut el = Element {
        name: String::from_utf8_lossy(start.local_name().as_ref()).into_owned(),
        ..Element::default()
    };
    for attr in start.attributes() {
        let attr = attr.map_err(|e| malformed(format!("bad attribute: {}", e)))?;
        let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|e| malformed(format!("bad attribute value: {}", e)))?;
        el.attrs.insert(key, value.into_owned());
    }
    Ok(el)
}

fn parse(xml: &str) -> Result<Element> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;
    loop {
        let event = reader
            .read_event()
            .map_err(|e| malformed(format!("xml error at {}: {}", reader.buffer_position(), e)))?;
        match event {
            Event::Start(start) => stack.push(element_from(&start)?),
            Event::Empty(start) => {
                let el = element_from(&start)?;
                match stack.last_mut() {
                    Some(parent) => parent.children.push(el),
                    None => root = Some(el),
                }
            }
            Event::End(_) => {
                let el = stack
                    .pop()
                    .ok_or_else(|| malformed("unbalanced end tag"))?;
                match stack.last_mut() {
                    Some(parent) => parent.children.push(el),
                    None => root = Some(el),
                }
            }
            Event::Text(text) => {
                if let Some(el) = stack.last_mut() {
                    let t = text
                        .unescape()
                        .map_err(|e| malformed(format!("bad text: {}", e)))?;
                    el.text.push_str(&t);
                }
            }
            Event::CData(data) => {
                if let Some(el) = stack.last_mut() {
                    el.text.push_str(&String::from_utf8_lossy(&data.into_inner()));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    if !stack.is_empty() {
        return Err(malformed("unexpected end of document"));
    }
    root.ok_or_else(|| malformed("empty document"))
}
