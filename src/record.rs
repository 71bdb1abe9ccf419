//! Canonical record schema shared by every input source.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

/// The citation database an export came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
  /// Web of Science (ISI) exports: BibTeX, CSV, tab-delimited text, workbooks.
  Isi,
  /// Scopus exports: CSV or workbooks.
  Scopus,
}

impl Source {
  pub fn label(self) -> &'static str {
    match self {
      Source::Isi => "ISI",
      Source::Scopus => "Scopus",
    }
  }

  /// Suffix used to tell the two sides apart in provenance columns.
  pub fn tag(self) -> &'static str {
    match self {
      Source::Isi => "isi",
      Source::Scopus => "scopus",
    }
  }
}

impl fmt::Display for Source {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.label())
  }
}

impl FromStr for Source {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_ascii_lowercase().as_str() {
      "isi" | "wos" => Ok(Source::Isi),
      "scopus" => Ok(Source::Scopus),
      other => Err(format!("unknown source '{}'", other)),
    }
  }
}

/// Canonical fields, declared in export column order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Field {
  Title,
  Authors,
  AuthorFullNames,
  Affiliations,
  AuthorKeywords,
  IndexKeywords,
  References,
  Doi,
  Year,
  SourceTitle,
  Volume,
  Issue,
  PageStart,
  PageEnd,
  Abstract,
  Link,
}

impl Field {
  pub const COUNT: usize = 16;

  pub const ALL: [Field; Field::COUNT] = [
    Field::Title,
    Field::Authors,
    Field::AuthorFullNames,
    Field::Affiliations,
    Field::AuthorKeywords,
    Field::IndexKeywords,
    Field::References,
    Field::Doi,
    Field::Year,
    Field::SourceTitle,
    Field::Volume,
    Field::Issue,
    Field::PageStart,
    Field::PageEnd,
    Field::Abstract,
    Field::Link,
  ];

  /// Fields whose absence from an input is worth a warning.
  pub const EXPECTED: [Field; 3] = [Field::Doi, Field::Title, Field::Authors];

  /// Column header used in the merged CSV (Scopus naming).
  pub fn header(self) -> &'static str {
    match self {
      Field::Title => "Title",
      Field::Authors => "Authors",
      Field::AuthorFullNames => "Author full names",
      Field::Affiliations => "Affiliations",
      Field::AuthorKeywords => "Author Keywords",
      Field::IndexKeywords => "Index Keywords",
      Field::References => "References",
      Field::Doi => "DOI",
      Field::Year => "Year",
      Field::SourceTitle => "Source title",
      Field::Volume => "Volume",
      Field::Issue => "Issue",
      Field::PageStart => "Page start",
      Field::PageEnd => "Page end",
      Field::Abstract => "Abstract",
      Field::Link => "Link",
    }
  }

  /// Resolves a header name, ignoring case and repeated whitespace.
  pub fn from_header(name: &str) -> Option<Field> {
    let wanted = header_key(name);
    Field::ALL
      .iter()
      .copied()
      .find(|field| header_key(field.header()) == wanted)
  }

  fn index(self) -> usize {
    self as usize
  }
}

impl fmt::Display for Field {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.header())
  }
}

/// Lower-cased, whitespace-collapsed form of a column header.
pub fn header_key(raw: &str) -> String {
  raw
    .trim_matches('\u{feff}')
    .split_whitespace()
    .collect::<Vec<_>>()
    .join(" ")
    .to_lowercase()
}

/// One bibliographic record: a text value per canonical field.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Record {
  values: [String; Field::COUNT],
}

impl Record {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn get(&self, field: Field) -> &str {
    &self.values[field.index()]
  }

  pub fn set(&mut self, field: Field, value: impl Into<String>) {
    self.values[field.index()] = value.into();
  }

  pub fn with(mut self, field: Field, value: impl Into<String>) -> Self {
    self.set(field, value);
    self
  }

  pub fn is_blank(&self, field: Field) -> bool {
    self.get(field).trim().is_empty()
  }

  /// Join key: trimmed and lower-cased DOI, `None` when empty.
  pub fn doi_key(&self) -> Option<String> {
    let doi = self.get(Field::Doi).trim();
    if doi.is_empty() {
      None
    } else {
      Some(doi.to_lowercase())
    }
  }

  /// Values in `Field::ALL` order.
  pub fn values(&self) -> impl Iterator<Item = &str> {
    self.values.iter().map(String::as_str)
  }
}

/// Advisory conditions found while loading; they never stop a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Warning {
  /// The input offers no column (or no entry) for an expected field.
  MissingField { source: Source, field: Field },
  /// BibTeX entries that could not be parsed and were skipped.
  SkippedEntries { source: Source, count: usize },
}

impl fmt::Display for Warning {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Warning::MissingField { source, field } => write!(
        f,
        "{} input has no {} field; values left empty",
        source, field
      ),
      Warning::SkippedEntries { source, count } => {
        write!(f, "{} input: skipped {} malformed BibTeX entries", source, count)
      }
    }
  }
}

/// Normalized records loaded from one source, in input order.
#[derive(Debug, Clone)]
pub struct SourceTable {
  pub source: Source,
  pub records: Vec<Record>,
  pub warnings: Vec<Warning>,
}

impl SourceTable {
  pub fn new(source: Source) -> Self {
    SourceTable {
      source,
      records: vec![],
      warnings: vec![],
    }
  }

  pub fn len(&self) -> usize {
    self.records.len()
  }

  pub fn is_empty(&self) -> bool {
    self.records.is_empty()
  }

  /// Appends another table from the same source.
  pub fn extend(&mut self, other: SourceTable) {
    self.records.extend(other.records);
    for warning in other.warnings {
      if !self.warnings.contains(&warning) {
        self.warnings.push(warning);
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn headers_resolve_case_insensitively() {
    assert_eq!(Field::from_header("source  TITLE"), Some(Field::SourceTitle));
    assert_eq!(Field::from_header("\u{feff}Authors"), Some(Field::Authors));
    assert_eq!(Field::from_header("Cited by"), None);
  }

  #[test]
  fn field_order_matches_index() {
    for (i, field) in Field::ALL.iter().enumerate() {
      assert_eq!(field.index(), i);
    }
  }

  #[test]
  fn doi_key_trims_and_lowercases() {
    let record = Record::new().with(Field::Doi, "  10.1/ABC ");
    assert_eq!(record.doi_key().as_deref(), Some("10.1/abc"));
    assert_eq!(Record::new().with(Field::Doi, "   ").doi_key(), None);
  }

  #[test]
  fn source_parses_aliases() {
    assert_eq!("WoS".parse::<Source>(), Ok(Source::Isi));
    assert_eq!(" scopus".parse::<Source>(), Ok(Source::Scopus));
    assert!("pubmed".parse::<Source>().is_err());
  }
}
