//! Loading export files from disk.
//!
//! The file extension picks the reader; a directory is read file by file in
//! name order, since the databases split large exports into several files.

use std::fs;
use std::path::{Path, PathBuf};

use calamine::{open_workbook_auto, Reader};
use csv::ReaderBuilder;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::bibtex;
use crate::error::{Error, Result};
use crate::normalize;
use crate::record::{Source, SourceTable};

/// How an input file is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
  Bibtex,
  Delimited(u8),
  Workbook,
}

impl InputFormat {
  pub fn from_path(path: &Path, source: Source) -> Result<Self> {
    let ext = path
      .extension()
      .and_then(|ext| ext.to_str())
      .map(str::to_ascii_lowercase)
      .unwrap_or_default();
    let format = match ext.as_str() {
      "bib" => InputFormat::Bibtex,
      "csv" => InputFormat::Delimited(b','),
      "txt" | "tsv" => InputFormat::Delimited(b'\t'),
      "xlsx" | "xls" | "xlsm" | "xlsb" | "ods" => InputFormat::Workbook,
      _ => {
        return Err(Error::UnsupportedFormat {
          database: source,
          path: path.to_path_buf(),
          reason: format!("unknown extension '{}'", ext),
        })
      }
    };
    if format == InputFormat::Bibtex && source == Source::Scopus {
      return Err(Error::UnsupportedFormat {
        database: source,
        path: path.to_path_buf(),
        reason: "Scopus exports are read from CSV or workbooks only".to_string(),
      });
    }
    Ok(format)
  }
}

/// A header row plus data rows, every row padded to the header width.
/// Rows whose cells are all blank are kept so record counts survive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawTable {
  pub headers: Vec<String>,
  pub rows: Vec<Vec<String>>,
}

impl RawTable {
  fn from_rows(path: &Path, mut rows: impl Iterator<Item = Vec<String>>) -> Result<Self> {
    let headers: Vec<String> = match rows.next() {
      Some(headers) => headers.iter().map(|h| normalize_header(h)).collect(),
      None => {
        return Err(Error::EmptyInput {
          path: path.to_path_buf(),
        })
      }
    };
    if headers.iter().all(String::is_empty) {
      return Err(Error::EmptyInput {
        path: path.to_path_buf(),
      });
    }
    let width = headers.len();
    let rows = rows
      .map(|mut row| {
        row.resize(width, String::new());
        row.truncate(width);
        row.iter_mut().for_each(|cell| *cell = cell.trim().to_string());
        row
      })
      .collect();
    Ok(RawTable { headers, rows })
  }
}

fn normalize_header(raw: &str) -> String {
  raw
    .trim()
    .trim_matches('\u{feff}')
    .split_whitespace()
    .collect::<Vec<_>>()
    .join(" ")
}

/// Loads and normalizes a file, or every supported file below a directory.
pub fn load(path: &Path, source: Source) -> Result<SourceTable> {
  if !path.is_dir() {
    return load_file(path, source);
  }

  let files = collect_inputs(path, source)?;
  if files.is_empty() {
    return Err(Error::EmptyInput {
      path: path.to_path_buf(),
    });
  }
  let mut table = SourceTable::new(source);
  for file in &files {
    table.extend(load_file(file, source)?);
  }
  info!(
    source = %source,
    files = files.len(),
    records = table.len(),
    "loaded export directory"
  );
  Ok(table)
}

fn collect_inputs(dir: &Path, source: Source) -> Result<Vec<PathBuf>> {
  let mut files = vec![];
  for entry in WalkDir::new(dir).sort_by_file_name() {
    let entry = entry.map_err(|e| {
      let path = e.path().unwrap_or(dir).to_path_buf();
      Error::io(path, e.into())
    })?;
    if entry.file_type().is_file() && InputFormat::from_path(entry.path(), source).is_ok() {
      files.push(entry.into_path());
    } else if entry.file_type().is_file() {
      debug!(path = %entry.path().display(), "ignoring unsupported file");
    }
  }
  Ok(files)
}

pub fn load_file(path: &Path, source: Source) -> Result<SourceTable> {
  let format = InputFormat::from_path(path, source)?;
  let table = match format {
    InputFormat::Bibtex => {
      let text = read_text(path)?;
      let bib = bibtex::parse(&text);
      if bib.entries.is_empty() {
        if bib.skipped > 0 {
          return Err(Error::Bibtex {
            path: path.to_path_buf(),
            skipped: bib.skipped,
          });
        }
        return Err(Error::EmptyInput {
          path: path.to_path_buf(),
        });
      }
      normalize::from_bibtex(&bib, source)
    }
    InputFormat::Delimited(delimiter) => {
      normalize::from_table(&read_delimited(path, delimiter)?, source)
    }
    InputFormat::Workbook => normalize::from_table(&read_workbook(path)?, source),
  };
  info!(
    source = %source,
    path = %path.display(),
    records = table.len(),
    "loaded export"
  );
  Ok(table)
}

/// Reads a UTF-8 text file, dropping a leading BOM.
pub fn read_text(path: &Path) -> Result<String> {
  let bytes = fs::read(path).map_err(|e| Error::io(path, e))?;
  if bytes.starts_with(&[0xFF, 0xFE]) {
    return Err(Error::UnsupportedEncoding {
      path: path.to_path_buf(),
      encoding: "UTF-16 LE",
    });
  }
  if bytes.starts_with(&[0xFE, 0xFF]) {
    return Err(Error::UnsupportedEncoding {
      path: path.to_path_buf(),
      encoding: "UTF-16 BE",
    });
  }
  let text = String::from_utf8(bytes).map_err(|_| Error::UnsupportedEncoding {
    path: path.to_path_buf(),
    encoding: "invalid UTF-8",
  })?;
  Ok(match text.strip_prefix('\u{feff}') {
    Some(rest) => rest.to_string(),
    None => text,
  })
}

pub fn read_delimited(path: &Path, delimiter: u8) -> Result<RawTable> {
  let text = read_text(path)?;
  parse_delimited(path, &text, delimiter)
}

/// Tab-delimited exports are not quoted, so quoting only applies to CSV.
pub fn parse_delimited(path: &Path, text: &str, delimiter: u8) -> Result<RawTable> {
  let mut reader = ReaderBuilder::new()
    .delimiter(delimiter)
    .quoting(delimiter != b'\t')
    .has_headers(false)
    .flexible(true)
    .from_reader(text.as_bytes());

  let mut rows = vec![];
  for record in reader.records() {
    let record = record.map_err(|source| Error::Csv {
      path: path.to_path_buf(),
      source,
    })?;
    rows.push(record.iter().map(str::to_string).collect::<Vec<_>>());
  }
  RawTable::from_rows(path, rows.into_iter())
}

/// First worksheet of a workbook, every cell rendered as text.
pub fn read_workbook(path: &Path) -> Result<RawTable> {
  let workbook_error = |message: String| Error::Workbook {
    path: path.to_path_buf(),
    message,
  };
  let mut workbook = open_workbook_auto(path).map_err(|e| workbook_error(e.to_string()))?;
  let range = workbook
    .worksheet_range_at(0)
    .ok_or_else(|| workbook_error("workbook has no worksheets".to_string()))?
    .map_err(|e| workbook_error(e.to_string()))?;

  let rows = range
    .rows()
    .map(|row| row.iter().map(|cell| cell.to_string()).collect::<Vec<_>>());
  RawTable::from_rows(path, rows)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn format_follows_extension() {
    let p = Path::new;
    assert_eq!(
      InputFormat::from_path(p("a.BIB"), Source::Isi).unwrap(),
      InputFormat::Bibtex
    );
    assert_eq!(
      InputFormat::from_path(p("savedrecs.txt"), Source::Isi).unwrap(),
      InputFormat::Delimited(b'\t')
    );
    assert_eq!(
      InputFormat::from_path(p("scopus.xlsx"), Source::Scopus).unwrap(),
      InputFormat::Workbook
    );
    assert!(InputFormat::from_path(p("scopus.bib"), Source::Scopus).is_err());
    assert!(InputFormat::from_path(p("notes.pdf"), Source::Isi).is_err());
  }

  #[test]
  fn ragged_rows_are_padded_and_blank_rows_kept() {
    let table = parse_delimited(
      Path::new("t.csv"),
      " Title , Authors ,DOI\n\"A, b\",x\n,,\n\nB,y,10.1/z,extra\n",
      b',',
    )
    .unwrap();
    assert_eq!(table.headers, vec!["Title", "Authors", "DOI"]);
    assert_eq!(table.rows.len(), 3);
    assert_eq!(table.rows[0], vec!["A, b", "x", ""]);
    assert_eq!(table.rows[1], vec!["", "", ""]);
    assert_eq!(table.rows[2], vec!["B", "y", "10.1/z"]);
  }

  #[test]
  fn tab_delimited_ignores_quotes() {
    let table = parse_delimited(Path::new("t.txt"), "TI\tAU\nSay \"hi\"\tSmith\n", b'\t').unwrap();
    assert_eq!(table.rows[0], vec!["Say \"hi\"", "Smith"]);
  }

  #[test]
  fn empty_input_is_rejected() {
    let err = parse_delimited(Path::new("t.csv"), "", b',').unwrap_err();
    assert!(matches!(err, Error::EmptyInput { .. }));
  }
}
