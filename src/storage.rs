use crate::models::{Record, Value};
use anyhow::Result;
use csv::WriterBuilder;
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Save records as CSV, one column per entry of `fields`, with header.
/// Missing fields and nulls are written as empty cells.
pub fn save_csv<P: AsRef<Path>, S: AsRef<str>>(records: &[Record], fields: &[S], path: P) -> Result<()> {
    let mut wtr = WriterBuilder::new().from_path(path)?;
    wtr.write_record(fields.iter().map(AsRef::as_ref))?;
    for r in records {
        wtr.write_record(fields.iter().map(|f| cell(r.get(f.as_ref()))))?;
    }
    wtr.flush()?;
    Ok(())
}

fn cell(value: Option<&Value>) -> String {
    match value {
        // keep spreadsheets from evaluating labels as formulas
        Some(Value::Text(s)) if s.starts_with(['=', '+', '-', '@']) => format!("'{}", s),
        Some(v) => v.to_string(),
        None => String::new(),
    }
}

/// Save records as a pretty JSON array of flat objects.
pub fn save_json<P: AsRef<Path>>(records: &[Record], path: P) -> Result<()> {
    let mut f = File::create(path)?;
    let s = serde_json::to_string_pretty(records)?;
    f.write_all(s.as_bytes())?;
    Ok(())
}
