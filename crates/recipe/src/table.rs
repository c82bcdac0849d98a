use serde_json::{Map, Value};

use crate::error::Result;
use crate::value::ScoreValue;

/// Evaluation output: one row per subject, one column per score
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScoreTable {
    columns: Vec<String>,
    rows: Vec<(String, Vec<ScoreValue>)>,
}

impl ScoreTable {
    #[must_use]
    pub const fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Append a row. Values must follow column order; short rows are padded with NA.
    pub fn push_row(&mut self, id: impl Into<String>, mut values: Vec<ScoreValue>) {
        values.resize(self.columns.len(), ScoreValue::Na);
        self.rows.push((id.into(), values));
    }

    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn row_ids(&self) -> impl Iterator<Item = &str> {
        self.rows.iter().map(|(id, _)| id.as_str())
    }

    pub fn rows(&self) -> impl Iterator<Item = (&str, &[ScoreValue])> {
        self.rows
            .iter()
            .map(|(id, values)| (id.as_str(), values.as_slice()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Cell for a row id and column name; first row wins on duplicate ids
    #[must_use]
    pub fn get(&self, id: &str, column: &str) -> Option<&ScoreValue> {
        let col = self.columns.iter().position(|c| c == column)?;
        self.rows
            .iter()
            .find(|(row_id, _)| row_id == id)
            .and_then(|(_, values)| values.get(col))
    }

    /// Tab-separated table with `id_header` as the first column.
    ///
    /// Cells holding a tab, quote or line break are quoted.
    pub fn to_tsv(&self, id_header: &str, na_token: &str) -> Result<String> {
        let mut writer = csv::WriterBuilder::new()
            .delimiter(b'\t')
            .from_writer(Vec::new());

        let header = std::iter::once(id_header).chain(self.columns.iter().map(String::as_str));
        writer.write_record(header)?;
        for (id, values) in &self.rows {
            let mut record = Vec::with_capacity(values.len() + 1);
            record.push(id.clone());
            record.extend(values.iter().map(|value| value.render(na_token)));
            writer.write_record(&record)?;
        }

        let bytes = writer
            .into_inner()
            .map_err(|err| csv::Error::from(err.into_error()))?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// `{row_id: {column: value}}` with NA as `null`
    #[must_use]
    pub fn to_json(&self) -> Value {
        let mut rows = Map::new();
        for (id, values) in &self.rows {
            let cells: Map<String, Value> = self
                .columns
                .iter()
                .zip(values)
                .map(|(column, value)| {
                    (
                        column.clone(),
                        serde_json::to_value(value).unwrap_or(Value::Null),
                    )
                })
                .collect();
            rows.insert(id.clone(), Value::Object(cells));
        }
        Value::Object(rows)
    }
}
