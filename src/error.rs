use std::path::PathBuf;

use thiserror::Error;

use crate::record::Source;

pub type Result<T> = std::result::Result<T, Error>;

/// Everything that aborts a load, merge or export.
#[derive(Debug, Error)]
pub enum Error {
  #[error("failed to read {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("unsupported {database} input {path}: {reason}")]
  UnsupportedFormat {
    database: Source,
    path: PathBuf,
    reason: String,
  },

  #[error("unsupported encoding {encoding} in {path} (expected UTF-8)")]
  UnsupportedEncoding {
    path: PathBuf,
    encoding: &'static str,
  },

  #[error("{path} contains no records")]
  EmptyInput { path: PathBuf },

  #[error("malformed CSV in {path}: {source}")]
  Csv {
    path: PathBuf,
    #[source]
    source: csv::Error,
  },

  #[error("failed to read workbook {path}: {message}")]
  Workbook { path: PathBuf, message: String },

  #[error("no BibTeX entries could be parsed from {path} ({skipped} malformed)")]
  Bibtex { path: PathBuf, skipped: usize },

  #[error("similarity threshold must lie in [0, 1], got {0}")]
  InvalidThreshold(f64),

  #[error("invalid field priority '{0}' (expected FIELD=isi|scopus)")]
  InvalidPriority(String),

  #[error("failed to write CSV: {0}")]
  CsvWrite(#[from] csv::Error),

  #[error("failed to encode summary: {0}")]
  Json(#[from] serde_json::Error),
}

impl Error {
  pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
    Error::Io {
      path: path.into(),
      source,
    }
  }
}
