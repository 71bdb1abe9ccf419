//! Joining two normalized tables into one.
//!
//! Rows are joined on DOI first. Rows without a DOI on both sides are then
//! paired by title similarity: each left row takes its most similar right
//! row. Whatever stays unmatched is kept as a one-sided row.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::matching::{best_match, normalize_title};
use crate::record::{Field, Record, Source, SourceTable};

pub const DEFAULT_THRESHOLD: f64 = 0.95;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchOptions {
  /// Minimum title similarity for a DOI-less pair to be joined.
  pub threshold: f64,
  /// Fold accented titles to ASCII before comparing.
  pub transliterate: bool,
}

impl Default for MatchOptions {
  fn default() -> Self {
    MatchOptions {
      threshold: DEFAULT_THRESHOLD,
      transliterate: false,
    }
  }
}

impl MatchOptions {
  pub fn validate(&self) -> Result<()> {
    if (0.0..=1.0).contains(&self.threshold) {
      Ok(())
    } else {
      Err(Error::InvalidThreshold(self.threshold))
    }
  }
}

/// Why two records ended up on the same row.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MatchKind {
  Doi,
  Title { score: f64 },
  LeftOnly,
  RightOnly,
}

impl MatchKind {
  pub fn label(self) -> &'static str {
    match self {
      MatchKind::Doi => "doi",
      MatchKind::Title { .. } => "title",
      MatchKind::LeftOnly | MatchKind::RightOnly => "",
    }
  }
}

/// One output row, keeping both sides apart until resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct MergedRecord {
  pub left: Option<Record>,
  pub right: Option<Record>,
  pub matched_by: MatchKind,
}

#[derive(Debug, Clone)]
pub struct MergedTable {
  pub left_source: Source,
  pub right_source: Source,
  pub rows: Vec<MergedRecord>,
  /// DOI keys that occur more than once on either side.
  pub duplicate_dois: Vec<String>,
}

/// Which side wins when both carry a value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPriority {
  pub default: Source,
  pub overrides: BTreeMap<Field, Source>,
}

impl Default for FieldPriority {
  /// Scopus first: the merged file follows the Scopus layout.
  fn default() -> Self {
    FieldPriority::new(Source::Scopus)
  }
}

impl FieldPriority {
  pub fn new(default: Source) -> Self {
    FieldPriority {
      default,
      overrides: BTreeMap::new(),
    }
  }

  pub fn prefer(&self, field: Field) -> Source {
    self.overrides.get(&field).copied().unwrap_or(self.default)
  }

  /// Adds an override written as `FIELD=SOURCE`, e.g. `References=isi`.
  pub fn add_override(&mut self, pair: &str) -> Result<()> {
    let invalid = || Error::InvalidPriority(pair.to_string());
    let (field, source) = pair.rsplit_once('=').ok_or_else(invalid)?;
    let field = Field::from_header(field).ok_or_else(invalid)?;
    let source = source.parse::<Source>().map_err(|_| invalid())?;
    self.overrides.insert(field, source);
    Ok(())
  }
}

impl MergedRecord {
  fn one_sided(record: &Record, kind: MatchKind) -> Self {
    let (left, right) = match kind {
      MatchKind::RightOnly => (None, Some(record.clone())),
      _ => (Some(record.clone()), None),
    };
    MergedRecord {
      left,
      right,
      matched_by: kind,
    }
  }

  fn joined(left: &Record, right: &Record, kind: MatchKind) -> Self {
    MergedRecord {
      left: Some(left.clone()),
      right: Some(right.clone()),
      matched_by: kind,
    }
  }

  pub fn is_joined(&self) -> bool {
    self.left.is_some() && self.right.is_some()
  }

  /// Folds both sides into one record, field by field.
  ///
  /// Values are trimmed, and a blank value on the preferred side falls back
  /// to the other side. The DOI is also lower-cased, matching the join key.
  pub fn resolve(&self, right_source: Source, priority: &FieldPriority) -> Record {
    let mut out = Record::new();
    for field in Field::ALL.iter().copied() {
      let (first, second) = if priority.prefer(field) == right_source {
        (&self.right, &self.left)
      } else {
        (&self.left, &self.right)
      };
      let value = first
        .iter()
        .chain(second.iter())
        .map(|record| record.get(field).trim())
        .find(|value| !value.is_empty())
        .unwrap_or("");
      if field == Field::Doi {
        out.set(field, value.to_lowercase());
      } else {
        out.set(field, value);
      }
    }
    out
  }
}

impl MergedTable {
  pub fn resolve(&self, priority: &FieldPriority) -> Vec<Record> {
    self
      .rows
      .iter()
      .map(|row| row.resolve(self.right_source, priority))
      .collect()
  }

  pub fn count(&self, pred: impl Fn(&MatchKind) -> bool) -> usize {
    self.rows.iter().filter(|row| pred(&row.matched_by)).count()
  }
}

/// Merges `right` into `left`.
///
/// Rows sharing a DOI are joined many-to-many. DOI-less rows are paired by
/// normalized title: every left row takes its most similar DOI-less right
/// row scoring at or above the threshold, earliest first on ties, so one
/// right row may join several left rows. The result lists left rows in
/// input order, then the right rows that were never joined.
pub fn reconcile(left: &SourceTable, right: &SourceTable, options: &MatchOptions) -> Result<MergedTable> {
  options.validate()?;

  let mut right_by_doi: HashMap<String, Vec<usize>> = HashMap::new();
  let mut right_titles: Vec<Option<String>> = Vec::with_capacity(right.len());
  for (j, record) in right.records.iter().enumerate() {
    match record.doi_key() {
      Some(key) => {
        right_by_doi.entry(key).or_default().push(j);
        right_titles.push(None);
      }
      None => right_titles.push(Some(normalize_title(
        record.get(Field::Title),
        options.transliterate,
      ))),
    }
  }

  let duplicate_dois = find_duplicate_dois(left, &right_by_doi);
  for doi in &duplicate_dois {
    warn!(doi = %doi, "DOI occurs more than once; joining every combination");
  }

  let mut right_used = vec![false; right.len()];
  let mut rows = Vec::with_capacity(left.len() + right.len());

  for record in &left.records {
    if let Some(key) = record.doi_key() {
      match right_by_doi.get(&key) {
        Some(matches) => {
          for &j in matches {
            right_used[j] = true;
            rows.push(MergedRecord::joined(record, &right.records[j], MatchKind::Doi));
          }
        }
        None => rows.push(MergedRecord::one_sided(record, MatchKind::LeftOnly)),
      }
      continue;
    }

    let key = normalize_title(record.get(Field::Title), options.transliterate);
    let candidates = right_titles
      .iter()
      .enumerate()
      .filter_map(|(j, title)| title.as_deref().map(|title| (j, title)));
    match best_match(&key, candidates, options.threshold) {
      Some(hit) => {
        right_used[hit.index] = true;
        debug!(
          left = %record.get(Field::Title),
          right = %right.records[hit.index].get(Field::Title),
          score = hit.score,
          "joined by title"
        );
        rows.push(MergedRecord::joined(
          record,
          &right.records[hit.index],
          MatchKind::Title { score: hit.score },
        ));
      }
      None => rows.push(MergedRecord::one_sided(record, MatchKind::LeftOnly)),
    }
  }

  for (j, record) in right.records.iter().enumerate() {
    if !right_used[j] {
      rows.push(MergedRecord::one_sided(record, MatchKind::RightOnly));
    }
  }

  let table = MergedTable {
    left_source: left.source,
    right_source: right.source,
    rows,
    duplicate_dois,
  };
  info!(
    rows = table.rows.len(),
    doi = table.count(|k| *k == MatchKind::Doi),
    title = table.count(|k| matches!(k, MatchKind::Title { .. })),
    left_only = table.count(|k| *k == MatchKind::LeftOnly),
    right_only = table.count(|k| *k == MatchKind::RightOnly),
    "reconciled {} with {}",
    left.source,
    right.source
  );
  Ok(table)
}

fn find_duplicate_dois(left: &SourceTable, right_by_doi: &HashMap<String, Vec<usize>>) -> Vec<String> {
  let mut seen = BTreeSet::new();
  let mut duplicates = BTreeSet::new();
  for key in left.records.iter().filter_map(Record::doi_key) {
    if !seen.insert(key.clone()) {
      duplicates.insert(key);
    }
  }
  for (key, rows) in right_by_doi {
    if rows.len() > 1 {
      duplicates.insert(key.clone());
    }
  }
  duplicates.into_iter().collect()
}

#[cfg(test)]
mod tests {
  use super::*;

  fn table(source: Source, rows: &[(&str, &str)]) -> SourceTable {
    let mut table = SourceTable::new(source);
    for (doi, title) in rows {
      table
        .records
        .push(Record::new().with(Field::Doi, *doi).with(Field::Title, *title));
    }
    table
  }

  fn merge(left: &[(&str, &str)], right: &[(&str, &str)]) -> MergedTable {
    reconcile(
      &table(Source::Isi, left),
      &table(Source::Scopus, right),
      &MatchOptions::default(),
    )
    .unwrap()
  }

  #[test]
  fn doi_join_is_case_insensitive() {
    let merged = merge(&[("10.1/X", "Foo")], &[("10.1/x ", "Foo Bar")]);
    assert_eq!(merged.rows.len(), 1);
    assert_eq!(merged.rows[0].matched_by, MatchKind::Doi);

    let resolved = merged.resolve(&FieldPriority::default());
    assert_eq!(resolved[0].get(Field::Doi), "10.1/x");
    assert_eq!(resolved[0].get(Field::Title), "Foo Bar");
  }

  #[test]
  fn identical_normalized_titles_join() {
    let merged = merge(&[("", "Deep Learning Systems")], &[("", "deep learning systems")]);
    assert_eq!(merged.rows.len(), 1);
    assert_eq!(merged.rows[0].matched_by, MatchKind::Title { score: 1.0 });
  }

  #[test]
  fn materially_different_titles_stay_apart() {
    let merged = merge(&[("", "Neural Networks")], &[("", "Neural Networks for Vision")]);
    assert_eq!(merged.rows.len(), 2);
    assert_eq!(merged.rows[0].matched_by, MatchKind::LeftOnly);
    assert_eq!(merged.rows[1].matched_by, MatchKind::RightOnly);
    assert!(merged.rows[0].right.is_none());
    assert!(merged.rows[1].left.is_none());
  }

  #[test]
  fn rows_with_a_doi_are_never_title_matched() {
    let merged = merge(&[("", "Same Title")], &[("10.1/a", "Same Title")]);
    assert_eq!(merged.rows.len(), 2);
    assert!(merged.rows.iter().all(|row| !row.is_joined()));
  }

  #[test]
  fn one_right_row_can_join_several_left_rows() {
    let merged = merge(&[("", "Graph Theory"), ("", "Graph Theory")], &[("", "graph theory")]);
    let kinds: Vec<MatchKind> = merged.rows.iter().map(|r| r.matched_by).collect();
    assert_eq!(
      kinds,
      vec![MatchKind::Title { score: 1.0 }, MatchKind::Title { score: 1.0 }]
    );
  }

  #[test]
  fn duplicate_dois_join_every_combination() {
    let merged = merge(
      &[("10.1/d", "A"), ("10.1/D", "A again")],
      &[("10.1/d", "B"), ("10.1/d", "B again")],
    );
    assert_eq!(merged.count(|k| *k == MatchKind::Doi), 4);
    assert_eq!(merged.duplicate_dois, vec!["10.1/d".to_string()]);
  }

  #[test]
  fn output_lists_left_rows_then_unused_right_rows() {
    let merged = merge(
      &[("10.1/a", "A"), ("", "Lonely")],
      &[("10.1/z", "Z"), ("10.1/a", "A")],
    );
    let kinds: Vec<MatchKind> = merged.rows.iter().map(|r| r.matched_by).collect();
    assert_eq!(kinds, vec![MatchKind::Doi, MatchKind::LeftOnly, MatchKind::RightOnly]);
    assert_eq!(merged.rows[2].right.as_ref().unwrap().get(Field::Title), "Z");
  }

  #[test]
  fn priority_prefers_populated_values() {
    let left = Record::new()
      .with(Field::Title, "ISI title")
      .with(Field::References, "isi refs");
    let right = Record::new().with(Field::Title, "Scopus title");
    let row = MergedRecord::joined(&left, &right, MatchKind::Doi);

    let scopus_first = row.resolve(Source::Scopus, &FieldPriority::default());
    assert_eq!(scopus_first.get(Field::Title), "Scopus title");
    assert_eq!(scopus_first.get(Field::References), "isi refs");

    let mut isi_titles = FieldPriority::default();
    isi_titles.add_override("title=ISI").unwrap();
    assert_eq!(row.resolve(Source::Scopus, &isi_titles).get(Field::Title), "ISI title");
  }

  #[test]
  fn bad_overrides_and_thresholds_are_rejected() {
    let mut priority = FieldPriority::default();
    assert!(priority.add_override("Nope=isi").is_err());
    assert!(priority.add_override("Title").is_err());
    assert!(priority.add_override("Title=pubmed").is_err());

    let options = MatchOptions {
      threshold: 1.5,
      ..MatchOptions::default()
    };
    let err = reconcile(&table(Source::Isi, &[]), &table(Source::Scopus, &[]), &options).unwrap_err();
    assert!(matches!(err, Error::InvalidThreshold(_)));
  }
}
