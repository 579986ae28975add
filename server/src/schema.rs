use crate::{CellValue, Dataset};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;

const MAX_SAMPLE_VALUES: usize = 5;

/// Coarse column type used for chart encoding and relevance prompts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Quantitative,
    Temporal,
    Nominal,
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Quantitative => write!(f, "quantitative"),
            Self::Temporal => write!(f, "temporal"),
            Self::Nominal => write!(f, "nominal"),
        }
    }
}

/// Per-column metadata derived once per upload. Field names follow the client
/// contract (`sampleValues`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnSchema {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
    pub sample_values: Vec<CellValue>,
}

pub type Schema = Vec<ColumnSchema>;

/// Derive the schema for a dataset: one entry per column, in column order,
/// each carrying the column's coarse type and up to five distinct non-null
/// sample values in first-seen order.
#[must_use]
pub fn infer_schema(dataset: &Dataset) -> Schema {
    dataset
        .columns
        .iter()
        .enumerate()
        .map(|(index, name)| {
            let mut sample_values: Vec<CellValue> = Vec::new();
            let mut seen_any = false;
            let mut all_numeric = true;
            let mut all_temporal = true;

            for row in &dataset.rows {
                let cell = &row[index];
                match cell {
                    CellValue::Null => continue,
                    CellValue::Number(_) => all_temporal = false,
                    CellValue::Text(text) => {
                        all_numeric = false;
                        if !parses_as_temporal(text) {
                            all_temporal = false;
                        }
                    }
                }
                seen_any = true;
                if sample_values.len() < MAX_SAMPLE_VALUES && !sample_values.contains(cell) {
                    sample_values.push(cell.clone());
                }
            }

            let column_type = if !seen_any {
                ColumnType::Nominal
            } else if all_numeric {
                ColumnType::Quantitative
            } else if all_temporal {
                ColumnType::Temporal
            } else {
                ColumnType::Nominal
            };

            ColumnSchema {
                name: name.clone(),
                column_type,
                sample_values,
            }
        })
        .collect()
}

fn parses_as_temporal(text: &str) -> bool {
    if DateTime::parse_from_rfc3339(text).is_ok() {
        return true;
    }
    const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];
    if DATETIME_FORMATS
        .iter()
        .any(|format| NaiveDateTime::parse_from_str(text, format).is_ok())
    {
        return true;
    }
    const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y"];
    DATE_FORMATS
        .iter()
        .any(|format| NaiveDate::parse_from_str(text, format).is_ok())
}

/// One `name: type` line per column. Used by the relevance classifier, which
/// does not need sample values.
#[must_use]
pub fn schema_outline(schema: &Schema) -> String {
    schema
        .iter()
        .map(|column| format!("{}: {}", column.name, column.column_type))
        .collect::<Vec<_>>()
        .join("\n")
}

/// One line per column including sample values. Used in the agent and chart
/// prompts.
#[must_use]
pub fn schema_description(schema: &Schema) -> String {
    schema
        .iter()
        .map(|column| {
            let samples = serde_json::to_string(&column.sample_values)
                .unwrap_or_else(|_| "[]".to_string());
            format!(
                "{}: {}, samples: {}",
                column.name, column.column_type, samples
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}
