use crate::Schema;
use serde::{Deserialize, Serialize};
use std::{fmt, sync::Arc};
use thiserror::Error;
use tokio::sync::RwLock;

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("CSV parse error: {0}")]
    Csv(#[from] csv::Error),
    #[error("CSV file has no columns")]
    NoColumns,
}

/// A single cell of a dataset. Numbers are detected at parse time so schema
/// inference and the analysis interpreter can work on typed values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Null,
    Number(f64),
    Text(String),
}

impl CellValue {
    fn parse(raw: &str) -> Self {
        if raw.is_empty() {
            return Self::Null;
        }
        match raw.parse::<f64>() {
            Ok(n) if n.is_finite() => Self::Number(n),
            _ => Self::Text(raw.to_string()),
        }
    }

    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    write!(f, "{}", *n as i64)
                } else {
                    write!(f, "{n}")
                }
            }
            Self::Text(s) => write!(f, "{s}"),
        }
    }
}

/// An uploaded tabular dataset: ordered columns and row-major cells.
/// Rows are retained for the lifetime of the upload; the analysis tool reads
/// them on every invocation.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
}

impl Dataset {
    /// Parse CSV bytes into a dataset. The first record is the header; every
    /// row must have the same width as the header (the `csv` reader enforces
    /// this); empty cells become `CellValue::Null`.
    pub fn from_csv(bytes: &[u8]) -> Result<Self, DatasetError> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(bytes);

        let columns: Vec<String> = reader
            .headers()?
            .iter()
            .map(std::string::ToString::to_string)
            .collect();
        if columns.is_empty() || columns.iter().all(String::is_empty) {
            return Err(DatasetError::NoColumns);
        }

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            rows.push(record.iter().map(CellValue::parse).collect());
        }

        Ok(Self { columns, rows })
    }

    #[must_use]
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column == name)
    }

    #[must_use]
    pub fn column_values(&self, index: usize) -> Vec<CellValue> {
        self.rows.iter().map(|row| row[index].clone()).collect()
    }
}

/// A dataset together with the schema inferred from it at upload time.
#[derive(Debug, Clone)]
pub struct LoadedDataset {
    pub dataset: Dataset,
    pub schema: Schema,
}

/// The process-wide dataset slot. Uploads replace the content wholesale;
/// queries take a snapshot once at entry, so an upload that races with an
/// in-flight query cannot change the data that query sees.
#[derive(Default)]
pub struct DatasetStore {
    slot: RwLock<Option<Arc<LoadedDataset>>>,
}

impl DatasetStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn replace(&self, loaded: LoadedDataset) {
        let mut slot = self.slot.write().await;
        *slot = Some(Arc::new(loaded));
    }

    pub async fn clear(&self) {
        let mut slot = self.slot.write().await;
        *slot = None;
    }

    pub async fn snapshot(&self) -> Option<Arc<LoadedDataset>> {
        self.slot.read().await.clone()
    }
}
