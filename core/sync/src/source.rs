//! Loading source records.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::debug;

use decksync_common::{ContentRecord, Error, Result};

use crate::registry::ContentTypeSpec;

/// Reads the records of one content batch.
#[async_trait]
pub trait SourceLoader: Send + Sync {
    /// Load records in source order.
    ///
    /// # Errors
    /// - `SourceNotFound` if the source does not exist
    /// - `MissingColumns` if a required column is absent
    async fn load(&self, spec: &ContentTypeSpec) -> Result<Vec<ContentRecord>>;

    /// Whether the source for `spec` exists.
    async fn exists(&self, spec: &ContentTypeSpec) -> bool;
}

/// Loads CSV files from `<root>/<folder>/<file>`.
#[derive(Debug, Clone)]
pub struct CsvSourceLoader {
    root: PathBuf,
}

impl CsvSourceLoader {
    /// Create a loader rooted at a data directory.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Path of the source for `spec`.
    pub fn path_for(&self, spec: &ContentTypeSpec) -> PathBuf {
        self.root.join(spec.folder()).join(&spec.file)
    }
}

#[async_trait]
impl SourceLoader for CsvSourceLoader {
    async fn load(&self, spec: &ContentTypeSpec) -> Result<Vec<ContentRecord>> {
        let path = self.path_for(spec);
        let data = match tokio::fs::read(&path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::SourceNotFound(path.display().to_string()));
            }
            Err(e) => return Err(Error::Io(e)),
        };

        let records = parse_csv(&data, &path, spec.required_columns())?;
        debug!("Loaded {} records from {}", records.len(), path.display());
        Ok(records)
    }

    async fn exists(&self, spec: &ContentTypeSpec) -> bool {
        tokio::fs::metadata(self.path_for(spec))
            .await
            .map(|m| m.is_file())
            .unwrap_or(false)
    }
}

/// Parse CSV text with a header row into records.
fn parse_csv(data: &[u8], path: &Path, required: &[&str]) -> Result<Vec<ContentRecord>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(data);

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| csv_error(path, e))?
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}').to_string())
        .collect();

    let mut missing: Vec<String> = required
        .iter()
        .filter(|column| !headers.iter().any(|h| h == *column))
        .map(|column| column.to_string())
        .collect();
    if !missing.is_empty() {
        missing.sort();
        return Err(Error::MissingColumns {
            file: path.display().to_string(),
            missing,
        });
    }

    let mut records = Vec::new();
    for row in reader.records() {
        let row = row.map_err(|e| csv_error(path, e))?;
        records.push(ContentRecord::new(
            headers.iter().cloned().zip(row.iter().map(|v| v.to_string())),
        ));
    }
    Ok(records)
}

fn csv_error(path: &Path, err: csv::Error) -> Error {
    Error::InvalidInput(format!("Malformed CSV {}: {}", path.display(), err))
}
