use std::{
    fs, io,
    path::{Path, PathBuf},
};

use chrono::{Local, NaiveDateTime};
use shared::domain::ConsultationRecord;
use thiserror::Error;
use tracing::{error, info};

pub const HEADER: [&str; 8] = [
    "Timestamp",
    "Name",
    "Phone",
    "Email",
    "Age",
    "Consultation Type",
    "Message",
    "Chat ID",
];

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("i/o error on '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("malformed records file '{}': {source}", .path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("records file '{}' does not exist", .path.display())]
    Missing { path: PathBuf },
    #[error("records file '{}' does not start with the expected header", .path.display())]
    HeaderMismatch { path: PathBuf },
}

/// Where an appended record landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppendOutcome {
    /// 1-based row in the file; the header occupies row 1.
    pub row: usize,
    pub timestamp: NaiveDateTime,
}

/// Append-only tabular file of consultation records.
///
/// Every operation opens and closes the file; nothing is cached between
/// calls, so two stores pointed at the same path observe each other's rows.
#[derive(Debug, Clone)]
pub struct RecordStore {
    path: PathBuf,
}

impl RecordStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Creates the file with its header row unless it already exists.
    pub fn ensure_initialized(&self) -> Result<(), StoreError> {
        if self.path.exists() {
            return Ok(());
        }

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| StoreError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        self.write_rows(&[header_row()])?;
        info!(path = %self.path.display(), "created records file");
        Ok(())
    }

    pub fn append(&self, record: &ConsultationRecord) -> Result<AppendOutcome, StoreError> {
        self.append_at(record, Local::now().naive_local())
    }

    pub fn append_at(
        &self,
        record: &ConsultationRecord,
        timestamp: NaiveDateTime,
    ) -> Result<AppendOutcome, StoreError> {
        let mut rows = self.read_rows()?;
        if rows.first().map(Vec::as_slice) != Some(header_row().as_slice()) {
            return Err(StoreError::HeaderMismatch {
                path: self.path.clone(),
            });
        }

        let row = rows.len() + 1;
        rows.push(row_for(record, timestamp));
        self.write_rows(&rows)?;

        info!(
            path = %self.path.display(),
            row,
            name = record.name.as_deref().unwrap_or("Unknown"),
            "appended consultation record"
        );
        Ok(AppendOutcome { row, timestamp })
    }

    /// Number of data rows, or 0 when the file cannot be read.
    pub fn count(&self) -> usize {
        match self.try_count() {
            Ok(count) => count,
            Err(error) => {
                error!(%error, "failed to count consultation records");
                0
            }
        }
    }

    pub fn try_count(&self) -> Result<usize, StoreError> {
        Ok(self.read_rows()?.len().saturating_sub(1))
    }

    /// Raw file contents, for sending the file as an attachment.
    pub fn snapshot(&self) -> Result<Vec<u8>, StoreError> {
        if !self.exists() {
            return Err(StoreError::Missing {
                path: self.path.clone(),
            });
        }
        fs::read(&self.path).map_err(|source| self.io_error(source))
    }

    fn read_rows(&self) -> Result<Vec<Vec<String>>, StoreError> {
        if !self.exists() {
            return Err(StoreError::Missing {
                path: self.path.clone(),
            });
        }

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_path(&self.path)
            .map_err(|source| self.csv_error(source))?;

        let mut rows = Vec::new();
        for result in reader.records() {
            let record = result.map_err(|source| self.csv_error(source))?;
            rows.push(record.iter().map(str::to_string).collect());
        }
        Ok(rows)
    }

    fn write_rows(&self, rows: &[Vec<String>]) -> Result<(), StoreError> {
        let staging = self.staging_path();
        let mut writer = csv::WriterBuilder::new()
            .flexible(true)
            .terminator(csv::Terminator::Any(b'\n'))
            .from_path(&staging)
            .map_err(|source| self.csv_error(source))?;
        for row in rows {
            writer
                .write_record(row)
                .map_err(|source| self.csv_error(source))?;
        }
        writer.flush().map_err(|source| self.io_error(source))?;
        drop(writer);

        fs::rename(&staging, &self.path).map_err(|source| self.io_error(source))
    }

    fn staging_path(&self) -> PathBuf {
        let staging_name = format!(".{}.tmp", self.file_name());
        match self.path.parent() {
            Some(parent) => parent.join(staging_name),
            None => PathBuf::from(staging_name),
        }
    }

    fn io_error(&self, source: io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.clone(),
            source,
        }
    }

    fn csv_error(&self, source: csv::Error) -> StoreError {
        StoreError::Csv {
            path: self.path.clone(),
            source,
        }
    }
}

fn header_row() -> Vec<String> {
    HEADER.iter().map(|column| column.to_string()).collect()
}

fn row_for(record: &ConsultationRecord, timestamp: NaiveDateTime) -> Vec<String> {
    let field = |value: &Option<String>| value.clone().unwrap_or_default();
    vec![
        timestamp.format(TIMESTAMP_FORMAT).to_string(),
        field(&record.name),
        field(&record.phone),
        field(&record.email),
        field(&record.age),
        field(&record.consultation_type),
        field(&record.message),
        record
            .chat_id
            .map(|chat_id| chat_id.to_string())
            .unwrap_or_default(),
    ]
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
