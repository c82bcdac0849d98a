use log::debug;
use serde_json::Value;
use std::collections::HashMap;

use crate::model::{DerivedVariable, MapKey, MissingPolicy, Recipe, ScoreDefinition, ScoreMethod};
use crate::table::ScoreTable;
use crate::value::{format_number, CellValue, EvalOptions, ScoreValue};

/// One subject's raw answers, keyed by item code
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResponseRow {
    pub id: String,
    pub values: HashMap<String, CellValue>,
}

impl ResponseRow {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            values: HashMap::new(),
        }
    }

    #[must_use]
    pub fn with(mut self, code: impl Into<String>, value: impl Into<CellValue>) -> Self {
        self.values.insert(code.into(), value.into());
        self
    }
}

/// Evaluate every row. Output rows and columns follow input and declaration order.
#[must_use]
pub fn evaluate(recipe: &Recipe, rows: &[ResponseRow], options: &EvalOptions) -> ScoreTable {
    let evaluator = Evaluator::new(recipe, options);
    let mut table = ScoreTable::new(recipe.score_names().map(String::from).collect());
    for row in rows {
        table.push_row(row.id.clone(), evaluator.evaluate_row(row));
    }
    table
}

/// Applies one recipe to rows; holds no per-row state
#[derive(Debug, Clone, Copy)]
pub struct Evaluator<'a> {
    recipe: &'a Recipe,
    options: &'a EvalOptions,
}

impl<'a> Evaluator<'a> {
    #[must_use]
    pub const fn new(recipe: &'a Recipe, options: &'a EvalOptions) -> Self {
        Self { recipe, options }
    }

    /// Score values for one row, in score declaration order
    #[must_use]
    pub fn evaluate_row(&self, row: &ResponseRow) -> Vec<ScoreValue> {
        let mut scope = RowScope {
            row,
            derived: HashMap::new(),
            recipe: self.recipe,
            options: self.options,
        };

        for variable in &self.recipe.derived {
            let value = scope.derive(variable);
            debug!("row {}: derived {} = {value}", row.id, variable.name);
            scope.derived.insert(variable.name.as_str(), value.to_cell());
        }

        self.recipe
            .scores
            .iter()
            .map(|score| scope.score(score))
            .collect()
    }
}

/// Values visible while evaluating one row: the raw cells plus Derived outputs so far
struct RowScope<'a> {
    row: &'a ResponseRow,
    derived: HashMap<&'a str, CellValue>,
    recipe: &'a Recipe,
    options: &'a EvalOptions,
}

impl RowScope<'_> {
    fn cell(&self, code: &str) -> Option<&CellValue> {
        self.derived.get(code).or_else(|| self.row.values.get(code))
    }

    /// Numeric value of an item. Raw row cells listed for inversion are
    /// inverted at read time; Derived outputs are read as computed.
    fn get_value(&self, code: &str) -> Option<f64> {
        if let Some(cell) = self.derived.get(code) {
            return cell.as_number(self.options);
        }
        let value = self.row.values.get(code)?.as_number(self.options)?;
        Some(match &self.recipe.invert {
            Some(inversion) if inversion.applies_to(code) => inversion.apply(value),
            _ => value,
        })
    }

    fn resolve_items(&self, items: &[String]) -> Vec<Option<f64>> {
        items.iter().map(|code| self.get_value(code)).collect()
    }

    fn derive(&self, variable: &DerivedVariable) -> ScoreValue {
        match &variable.method {
            ScoreMethod::Map { source, mapping } => self.lookup(source, mapping),
            ScoreMethod::Formula(formula) => formula
                .eval(|name| Some(self.get_value(name).unwrap_or(0.0)))
                .map_or_else(
                    |e| {
                        debug!("row {}: {} -> NA ({e})", self.row.id, variable.name);
                        ScoreValue::Na
                    },
                    ScoreValue::Number,
                ),
            reduction => reduce(reduction, &self.resolve_items(&variable.items)),
        }
    }

    fn score(&self, score: &ScoreDefinition) -> ScoreValue {
        let resolved = self.resolve_items(&score.items);
        if score.missing == MissingPolicy::RequireAll && resolved.iter().any(Option::is_none) {
            return ScoreValue::Na;
        }

        match &score.method {
            ScoreMethod::Map { source, mapping } => self.lookup(source, mapping),
            ScoreMethod::Formula(formula) => {
                let result = formula.eval(|name| match (self.get_value(name), score.missing) {
                    (Some(v), _) => Some(v),
                    (None, MissingPolicy::Ignore) => Some(0.0),
                    (None, MissingPolicy::RequireAll) => None,
                });
                result.map_or_else(
                    |e| {
                        debug!("row {}: {} -> NA ({e})", self.row.id, score.name);
                        ScoreValue::Na
                    },
                    ScoreValue::Number,
                )
            }
            reduction => reduce(reduction, &resolved),
        }
    }

    /// First mapping entry matching the source value; NA when none does
    fn lookup(&self, source: &str, mapping: &[(MapKey, Value)]) -> ScoreValue {
        let number = self.get_value(source);
        let text = match number {
            Some(n) => format_number(n),
            None => match self.cell(source).and_then(|c| c.as_text(self.options)) {
                Some(text) => text,
                None => return ScoreValue::Na,
            },
        };
        mapping
            .iter()
            .find(|(key, _)| key.matches(&text, number))
            .map_or(ScoreValue::Na, |(_, value)| ScoreValue::from_mapping(value))
    }
}

/// Arithmetic reduction over the values that resolved; NA when none did
fn reduce(method: &ScoreMethod, values: &[Option<f64>]) -> ScoreValue {
    let present: Vec<f64> = values.iter().flatten().copied().collect();
    if present.is_empty() {
        return ScoreValue::Na;
    }
    let sum: f64 = present.iter().sum();
    let value = match method {
        ScoreMethod::Sum => sum,
        ScoreMethod::Mean => sum / present.len() as f64,
        ScoreMethod::Max => present.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        ScoreMethod::Min => present.iter().copied().fold(f64::INFINITY, f64::min),
        ScoreMethod::Map { .. } | ScoreMethod::Formula(_) => return ScoreValue::Na,
    };
    ScoreValue::Number(value)
}
