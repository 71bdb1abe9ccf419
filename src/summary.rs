//! Run report: counts printed after a merge and optionally saved as JSON.

use std::io::Write;
use std::path::Path;

use chrono::{SecondsFormat, Utc};
use serde::Serialize;

use crate::error::Result;
use crate::export::Staged;
use crate::reconcile::{MatchKind, MergedTable};
use crate::record::{Field, SourceTable, Warning};

#[derive(Debug, Clone, Serialize)]
pub struct TitleMatch {
  pub left_title: String,
  pub right_title: String,
  pub score: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MergeSummary {
  pub generated_at: String,
  pub left_source: String,
  pub right_source: String,
  pub left_records: usize,
  pub right_records: usize,
  pub doi_joins: usize,
  pub title_joins: Vec<TitleMatch>,
  pub left_only: usize,
  pub right_only: usize,
  pub duplicate_dois: Vec<String>,
  pub output_rows: usize,
  pub warnings: Vec<Warning>,
}

impl MergeSummary {
  pub fn from_merge(left: &SourceTable, right: &SourceTable, merged: &MergedTable) -> Self {
    let title_joins = merged
      .rows
      .iter()
      .filter_map(|row| match (row.matched_by, &row.left, &row.right) {
        (MatchKind::Title { score }, Some(l), Some(r)) => Some(TitleMatch {
          left_title: l.get(Field::Title).to_string(),
          right_title: r.get(Field::Title).to_string(),
          score,
        }),
        _ => None,
      })
      .collect();

    MergeSummary {
      generated_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
      left_source: left.source.label().to_string(),
      right_source: right.source.label().to_string(),
      left_records: left.len(),
      right_records: right.len(),
      doi_joins: merged.count(|k| *k == MatchKind::Doi),
      title_joins,
      left_only: merged.count(|k| *k == MatchKind::LeftOnly),
      right_only: merged.count(|k| *k == MatchKind::RightOnly),
      duplicate_dois: merged.duplicate_dois.clone(),
      output_rows: merged.rows.len(),
      warnings: left.warnings.iter().chain(&right.warnings).cloned().collect(),
    }
  }

  pub fn print<W: Write>(&self, mut out: W) -> std::io::Result<()> {
    writeln!(out, "{} records:    {}", self.left_source, self.left_records)?;
    writeln!(out, "{} records: {}", self.right_source, self.right_records)?;
    writeln!(out, "joined by DOI:   {}", self.doi_joins)?;
    writeln!(out, "joined by title: {}", self.title_joins.len())?;
    for m in &self.title_joins {
      writeln!(out, "  {:.3}  {}  <->  {}", m.score, m.left_title, m.right_title)?;
    }
    writeln!(out, "{} only: {}", self.left_source, self.left_only)?;
    writeln!(out, "{} only: {}", self.right_source, self.right_only)?;
    if !self.duplicate_dois.is_empty() {
      writeln!(out, "duplicated DOIs: {}", self.duplicate_dois.join(", "))?;
    }
    for warning in &self.warnings {
      writeln!(out, "warning: {}", warning)?;
    }
    writeln!(out, "output rows: {}", self.output_rows)
  }

  pub fn write_json_to<W: Write>(&self, out: W) -> Result<()> {
    serde_json::to_writer_pretty(out, self)?;
    Ok(())
  }

  /// Writes the summary on its own, staged like the merged CSV.
  pub fn write_json(&self, path: &Path) -> Result<()> {
    let staged = Staged::new(path);
    staged.write(|out| self.write_json_to(out))?;
    staged.commit()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::reconcile::{reconcile, MatchOptions};
  use crate::record::{Record, Source};

  #[test]
  fn counts_each_kind_of_row() {
    let mut left = SourceTable::new(Source::Isi);
    left.records.push(Record::new().with(Field::Doi, "10.1/a"));
    left.records.push(Record::new().with(Field::Title, "Deep Learning Systems"));
    left.records.push(Record::new().with(Field::Title, "Unmatched"));
    let mut right = SourceTable::new(Source::Scopus);
    right.records.push(Record::new().with(Field::Doi, "10.1/A"));
    right.records.push(Record::new().with(Field::Title, "deep learning systems"));
    right.warnings.push(Warning::MissingField {
      source: Source::Scopus,
      field: Field::Authors,
    });

    let merged = reconcile(&left, &right, &MatchOptions::default()).unwrap();
    let summary = MergeSummary::from_merge(&left, &right, &merged);
    assert_eq!(summary.doi_joins, 1);
    assert_eq!(summary.title_joins.len(), 1);
    assert_eq!(summary.left_only, 1);
    assert_eq!(summary.right_only, 0);
    assert_eq!(summary.output_rows, 3);
    assert_eq!(summary.warnings.len(), 1);

    let json = serde_json::to_value(&summary).unwrap();
    assert_eq!(json["title_joins"][0]["score"], 1.0);
    assert_eq!(json["warnings"][0]["kind"], "missing_field");

    let mut text = vec![];
    summary.print(&mut text).unwrap();
    assert!(String::from_utf8(text).unwrap().contains("joined by title: 1"));
  }
}
