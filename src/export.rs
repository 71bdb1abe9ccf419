//! Writing the merged table as CSV.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use csv::WriterBuilder;
use tracing::info;

use crate::error::{Error, Result};
use crate::reconcile::{FieldPriority, MergedTable};
use crate::record::Field;
use crate::summary::MergeSummary;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExportOptions {
  /// Prefix the file with a UTF-8 BOM so spreadsheets pick the encoding.
  pub bom: bool,
  /// Append `Sources` and `Match` columns describing each row.
  pub provenance: bool,
}

pub fn header_row(options: &ExportOptions) -> Vec<&'static str> {
  let mut headers: Vec<&'static str> = Field::ALL.iter().map(|f| f.header()).collect();
  if options.provenance {
    headers.push("Sources");
    headers.push("Match");
  }
  headers
}

/// Writes resolved rows to `writer`, returning the number of data rows.
pub fn write_csv<W: Write>(
  mut writer: W,
  table: &MergedTable,
  priority: &FieldPriority,
  options: &ExportOptions,
) -> Result<usize> {
  if options.bom {
    writer
      .write_all("\u{feff}".as_bytes())
      .map_err(|e| Error::CsvWrite(e.into()))?;
  }
  let mut csv = WriterBuilder::new().from_writer(writer);
  csv.write_record(header_row(options))?;

  for row in &table.rows {
    let record = row.resolve(table.right_source, priority);
    if options.provenance {
      let mut sources = vec![];
      if row.left.is_some() {
        sources.push(table.left_source.tag());
      }
      if row.right.is_some() {
        sources.push(table.right_source.tag());
      }
      let sources = sources.join(";");
      csv.write_record(
        record
          .values()
          .chain(std::iter::once(sources.as_str()))
          .chain(std::iter::once(row.matched_by.label())),
      )?;
    } else {
      csv.write_record(record.values())?;
    }
  }
  csv.flush().map_err(|e| Error::CsvWrite(e.into()))?;
  Ok(table.rows.len())
}

/// A file written beside its destination and renamed into place on
/// `commit`. Dropping it uncommitted removes the partial file.
pub(crate) struct Staged {
  staging: PathBuf,
  target: PathBuf,
  committed: bool,
}

impl Staged {
  pub(crate) fn new(target: &Path) -> Self {
    let mut staging = target.as_os_str().to_owned();
    staging.push(".part");
    Staged {
      staging: PathBuf::from(staging),
      target: target.to_path_buf(),
      committed: false,
    }
  }

  pub(crate) fn write<T>(&self, fill: impl FnOnce(&mut BufWriter<File>) -> Result<T>) -> Result<T> {
    let file = File::create(&self.staging).map_err(|e| Error::io(&self.staging, e))?;
    let mut writer = BufWriter::new(file);
    let value = fill(&mut writer)?;
    writer.flush().map_err(|e| Error::io(&self.staging, e))?;
    Ok(value)
  }

  pub(crate) fn commit(mut self) -> Result<()> {
    fs::rename(&self.staging, &self.target).map_err(|e| Error::io(&self.target, e))?;
    self.committed = true;
    Ok(())
  }
}

impl Drop for Staged {
  fn drop(&mut self) {
    if !self.committed {
      let _ = fs::remove_file(&self.staging);
    }
  }
}

/// Writes the merged CSV, staged so a failed run leaves no partial file.
pub fn write_file(
  path: &Path,
  table: &MergedTable,
  priority: &FieldPriority,
  options: &ExportOptions,
) -> Result<usize> {
  write_outputs(path, None, table, priority, options)
}

/// Writes the merged CSV and, when asked, the JSON summary. Both are staged
/// first; neither lands unless both could be written.
pub fn write_outputs(
  path: &Path,
  summary: Option<(&Path, &MergeSummary)>,
  table: &MergedTable,
  priority: &FieldPriority,
  options: &ExportOptions,
) -> Result<usize> {
  let csv_file = Staged::new(path);
  let rows = csv_file.write(|out| write_csv(out, table, priority, options))?;
  let json_file = match summary {
    Some((json_path, summary)) => {
      let staged = Staged::new(json_path);
      staged.write(|out| summary.write_json_to(out))?;
      Some(staged)
    }
    None => None,
  };

  csv_file.commit()?;
  if let Some(staged) = json_file {
    staged.commit()?;
  }
  info!(path = %path.display(), rows, "wrote merged CSV");
  Ok(rows)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::reconcile::{MatchKind, MergedRecord};
  use crate::record::{Record, Source, SourceTable};

  fn sample() -> MergedTable {
    MergedTable {
      left_source: Source::Isi,
      right_source: Source::Scopus,
      rows: vec![
        MergedRecord {
          left: Some(Record::new().with(Field::Title, "Comma, inside")),
          right: Some(Record::new().with(Field::Doi, "10.1/A")),
          matched_by: MatchKind::Doi,
        },
        MergedRecord {
          left: None,
          right: Some(Record::new().with(Field::Title, "Only scopus")),
          matched_by: MatchKind::RightOnly,
        },
      ],
      duplicate_dois: vec![],
    }
  }

  #[test]
  fn writes_canonical_header_and_quotes_commas() {
    let mut out = vec![];
    let rows = write_csv(&mut out, &sample(), &FieldPriority::default(), &ExportOptions::default()).unwrap();
    assert_eq!(rows, 2);
    let text = String::from_utf8(out).unwrap();
    let mut lines = text.lines();
    assert!(lines.next().unwrap().starts_with("Title,Authors,Author full names,"));
    assert!(lines.next().unwrap().starts_with("\"Comma, inside\","));
  }

  #[test]
  fn provenance_and_bom_are_opt_in() {
    let mut out = vec![];
    let options = ExportOptions {
      bom: true,
      provenance: true,
    };
    write_csv(&mut out, &sample(), &FieldPriority::default(), &options).unwrap();
    let text = String::from_utf8(out).unwrap();
    assert!(text.starts_with('\u{feff}'));
    let lines: Vec<&str> = text.lines().collect();
    assert!(lines[0].ends_with(",Link,Sources,Match"));
    assert!(lines[1].ends_with(",isi;scopus,doi"));
    assert!(lines[2].ends_with(",scopus,"));
  }

  #[test]
  fn failed_summary_leaves_no_csv_behind() {
    let dir = tempfile::tempdir().unwrap();
    let csv_path = dir.path().join("merged.csv");
    let json_path = dir.path().join("missing-dir").join("summary.json");
    let table = sample();
    let summary = MergeSummary::from_merge(
      &SourceTable::new(Source::Isi),
      &SourceTable::new(Source::Scopus),
      &table,
    );

    let result = write_outputs(
      &csv_path,
      Some((&json_path, &summary)),
      &table,
      &FieldPriority::default(),
      &ExportOptions::default(),
    );
    assert!(matches!(result, Err(Error::Io { .. })));
    assert!(!csv_path.exists());
    assert!(!dir.path().join("merged.csv.part").exists());
  }

  #[test]
  fn summary_and_csv_land_together() {
    let dir = tempfile::tempdir().unwrap();
    let csv_path = dir.path().join("merged.csv");
    let json_path = dir.path().join("summary.json");
    let table = sample();
    let summary = MergeSummary::from_merge(
      &SourceTable::new(Source::Isi),
      &SourceTable::new(Source::Scopus),
      &table,
    );

    let rows = write_outputs(
      &csv_path,
      Some((&json_path, &summary)),
      &table,
      &FieldPriority::default(),
      &ExportOptions::default(),
    )
    .unwrap();
    assert_eq!(rows, 2);
    assert!(csv_path.exists());
    let json = fs::read_to_string(&json_path).unwrap();
    assert!(json.contains("\"output_rows\": 2"));
    assert!(!dir.path().join("summary.json.part").exists());
  }
}
