use anyhow::{anyhow, bail, Context, Result};
use serde_json::Value;
use std::fs;
use std::path::Path;
use survey_recipe::{CellValue, ResponseRow};

/// Read response rows from a JSON array of objects or a TSV file with a header.
///
/// `.json` selects JSON; anything else is read as tab-separated text.
pub fn read_rows(path: &Path, id_column: &str) -> Result<Vec<ResponseRow>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read rows {}", path.display()))?;
    let is_json = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"));

    let rows = if is_json {
        parse_json_rows(&raw, id_column)
    } else {
        parse_tsv_rows(&raw, id_column)
    }
    .with_context(|| format!("Invalid rows file {}", path.display()))?;

    log::info!("Read {} row(s) from {}", rows.len(), path.display());
    Ok(rows)
}

pub fn parse_json_rows(raw: &str, id_column: &str) -> Result<Vec<ResponseRow>> {
    let value: Value = serde_json::from_str(raw)?;
    let Value::Array(items) = value else {
        bail!("expected a JSON array of row objects");
    };

    items
        .iter()
        .enumerate()
        .map(|(idx, item)| {
            let object = item
                .as_object()
                .ok_or_else(|| anyhow!("row {} is not an object", idx + 1))?;
            let id = match object.get(id_column) {
                Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
                Some(Value::Number(n)) => n.to_string(),
                _ => bail!("row {} has no '{id_column}'", idx + 1),
            };
            let mut row = ResponseRow::new(id);
            for (code, cell) in object {
                if code != id_column {
                    row.values.insert(code.clone(), CellValue::from_json(cell));
                }
            }
            Ok(row)
        })
        .collect()
}

pub fn parse_tsv_rows(raw: &str, id_column: &str) -> Result<Vec<ResponseRow>> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(true)
        .flexible(true)
        .from_reader(raw.as_bytes());

    let header: Vec<String> = reader
        .headers()
        .context("Unable to read header")?
        .iter()
        .map(|value| value.trim().to_string())
        .collect();
    if header.iter().all(String::is_empty) {
        bail!("file is empty");
    }
    let id_idx = header
        .iter()
        .position(|h| h == id_column)
        .ok_or_else(|| anyhow!("header has no '{id_column}' column"))?;

    let mut rows = Vec::new();
    for (idx, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("Unable to read row {}", idx + 1))?;
        if record.iter().all(|cell| cell.trim().is_empty()) {
            continue;
        }
        let id = record
            .get(id_idx)
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| anyhow!("row {} has no '{id_column}'", idx + 1))?;

        let mut row = ResponseRow::new(id);
        for (col, code) in header.iter().enumerate() {
            if col == id_idx || code.is_empty() {
                continue;
            }
            let cell = record.get(col).unwrap_or("");
            row.values
                .insert(code.clone(), CellValue::Text(cell.to_string()));
        }
        rows.push(row);
    }
    Ok(rows)
}
