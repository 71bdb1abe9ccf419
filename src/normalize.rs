//! Mapping source-specific columns onto the canonical schema.
//!
//! Each source has a resolution table listing, per canonical field, the
//! column names it may arrive under in order of preference. The first
//! listed column holding a non-blank value wins.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::bibtex::Bibliography;
use crate::ingest::RawTable;
use crate::record::{header_key, Field, Record, Source, SourceTable, Warning};

pub type ResolutionTable = &'static [(Field, &'static [&'static str])];

/// Scopus CSV / workbook headers.
pub const SCOPUS_COLUMNS: ResolutionTable = &[
  (Field::Title, &["Title"]),
  (Field::Authors, &["Authors"]),
  (Field::AuthorFullNames, &["Author full names"]),
  (Field::Affiliations, &["Affiliations", "Authors with affiliations"]),
  (Field::AuthorKeywords, &["Author Keywords"]),
  (Field::IndexKeywords, &["Index Keywords"]),
  (Field::References, &["References"]),
  (Field::Doi, &["DOI"]),
  (Field::Year, &["Year"]),
  (Field::SourceTitle, &["Source title"]),
  (Field::Volume, &["Volume"]),
  (Field::Issue, &["Issue"]),
  (Field::PageStart, &["Page start"]),
  (Field::PageEnd, &["Page end"]),
  (Field::Abstract, &["Abstract"]),
  (Field::Link, &["Link"]),
];

/// Web of Science tabular exports: full names, then field tags, then
/// Scopus names for files that were already converted.
pub const ISI_COLUMNS: ResolutionTable = &[
  (Field::Title, &["Article Title", "TI", "Title"]),
  (Field::Authors, &["Authors", "AU"]),
  (Field::AuthorFullNames, &["Author Full Names", "AF"]),
  (Field::Affiliations, &["Addresses", "C1", "Affiliations", "Affiliation"]),
  (Field::AuthorKeywords, &["Author Keywords", "DE"]),
  (Field::IndexKeywords, &["Keywords Plus", "ID", "Index Keywords"]),
  (Field::References, &["Cited References", "CR", "References"]),
  (Field::Doi, &["DOI", "DI"]),
  (Field::Year, &["Publication Year", "PY", "Year"]),
  (Field::SourceTitle, &["Source Title", "SO"]),
  (Field::Volume, &["Volume", "VL"]),
  (Field::Issue, &["Issue", "IS"]),
  (Field::PageStart, &["Start Page", "BP", "Page start"]),
  (Field::PageEnd, &["End Page", "EP", "Page end"]),
  (Field::Abstract, &["Abstract", "AB"]),
  (Field::Link, &["DOI Link", "Link"]),
];

/// Web of Science BibTeX field names. Pages are split separately.
pub const ISI_BIBTEX_FIELDS: ResolutionTable = &[
  (Field::Title, &["title"]),
  (Field::Authors, &["author"]),
  (Field::AuthorFullNames, &["author"]),
  (Field::Affiliations, &["affiliations", "affiliation"]),
  (Field::AuthorKeywords, &["keywords", "keywords-plus"]),
  (Field::IndexKeywords, &["keywords-plus"]),
  (Field::References, &["cited-references", "references"]),
  (Field::Doi, &["doi"]),
  (Field::Year, &["year"]),
  (Field::SourceTitle, &["journal", "booktitle"]),
  (Field::Volume, &["volume"]),
  (Field::Issue, &["number", "issue"]),
  (Field::Abstract, &["abstract"]),
  (Field::Link, &["url"]),
];

/// Combined page columns used when no start/end columns carry a value.
const PAGE_RANGE_COLUMNS: &[&str] = &["Pages", "Page range"];

pub fn columns_for(source: Source) -> ResolutionTable {
  match source {
    Source::Isi => ISI_COLUMNS,
    Source::Scopus => SCOPUS_COLUMNS,
  }
}

/// Splits a page range at its first hyphen.
///
/// A run of hyphens or en dashes there (`123--130`) counts as one
/// separator and the end page is the remainder verbatim. A single page
/// yields the same start and end.
pub fn split_pages(raw: &str) -> (String, String) {
  let raw = raw.trim();
  let is_dash = |c: char| c == '-' || c == '–';
  match raw.find(is_dash) {
    Some(at) => {
      let start = raw[..at].trim();
      let end = raw[at..].trim_start_matches(is_dash).trim();
      (start.to_string(), end.to_string())
    }
    None => (raw.to_string(), raw.to_string()),
  }
}

/// `Smith, John and Doe, Jane` -> `Smith, John; Doe, Jane`.
pub fn bibtex_authors(raw: &str) -> String {
  let mut names: Vec<String> = vec![];
  let mut current: Vec<&str> = vec![];
  for word in raw.split_whitespace() {
    if word.eq_ignore_ascii_case("and") {
      if !current.is_empty() {
        names.push(current.join(" "));
        current.clear();
      }
    } else {
      current.push(word);
    }
  }
  if !current.is_empty() {
    names.push(current.join(" "));
  }
  names.join("; ")
}

/// Normalizes a tabular export.
pub fn from_table(raw: &RawTable, source: Source) -> SourceTable {
  let mut positions: HashMap<String, usize> = HashMap::new();
  for (i, header) in raw.headers.iter().enumerate() {
    positions.entry(header_key(header)).or_insert(i);
  }
  let lookup = |names: &[&str]| -> Vec<usize> {
    names
      .iter()
      .filter_map(|name| positions.get(&header_key(name)).copied())
      .collect()
  };

  let columns = columns_for(source);
  let resolved: Vec<(Field, Vec<usize>)> = columns
    .iter()
    .map(|(field, names)| (*field, lookup(*names)))
    .collect();
  let page_ranges = lookup(PAGE_RANGE_COLUMNS);

  let used: Vec<usize> = resolved
    .iter()
    .flat_map(|(_, columns)| columns.iter().copied())
    .chain(page_ranges.iter().copied())
    .collect();
  let dropped: Vec<&str> = raw
    .headers
    .iter()
    .enumerate()
    .filter(|(i, _)| !used.contains(i))
    .map(|(_, header)| header.as_str())
    .collect();
  if !dropped.is_empty() {
    debug!(source = %source, columns = ?dropped, "dropping unrecognized columns");
  }

  let mut table = SourceTable::new(source);
  for field in Field::EXPECTED.iter().copied() {
    let present = resolved
      .iter()
      .any(|(f, columns)| *f == field && !columns.is_empty());
    if !present {
      table.warnings.push(missing(source, field));
    }
  }

  for row in &raw.rows {
    let mut record = Record::new();
    for (field, columns) in &resolved {
      if let Some(value) = columns.iter().map(|&i| row[i].as_str()).find(|v| !v.is_empty()) {
        record.set(*field, value);
      }
    }
    if record.is_blank(Field::PageStart) && record.is_blank(Field::PageEnd) {
      if let Some(range) = page_ranges.iter().map(|&i| row[i].as_str()).find(|v| !v.is_empty()) {
        let (start, end) = split_pages(range);
        record.set(Field::PageStart, start);
        record.set(Field::PageEnd, end);
      }
    }
    table.records.push(record);
  }
  table
}

/// Normalizes parsed BibTeX entries.
pub fn from_bibtex(bib: &Bibliography, source: Source) -> SourceTable {
  let mut table = SourceTable::new(source);
  for field in Field::EXPECTED.iter().copied() {
    let names = ISI_BIBTEX_FIELDS
      .iter()
      .find(|(f, _)| *f == field)
      .map_or(&[][..], |(_, names)| *names);
    let carried = bib
      .entries
      .iter()
      .any(|entry| names.iter().any(|name| entry.has(name)));
    if !carried {
      table.warnings.push(missing(source, field));
    }
  }
  if bib.skipped > 0 {
    table.warnings.push(Warning::SkippedEntries {
      source,
      count: bib.skipped,
    });
  }

  for entry in &bib.entries {
    let mut record = Record::new();
    for (field, names) in ISI_BIBTEX_FIELDS {
      if let Some(value) = names.iter().filter_map(|name| entry.get(name)).find(|v| !v.is_empty()) {
        let value = match field {
          Field::Authors | Field::AuthorFullNames => bibtex_authors(value),
          _ => value.to_string(),
        };
        record.set(*field, value);
      }
    }
    if let Some(pages) = entry.get("pages") {
      let (start, end) = split_pages(pages);
      record.set(Field::PageStart, start);
      record.set(Field::PageEnd, end);
    }
    table.records.push(record);
  }
  table
}

fn missing(source: Source, field: Field) -> Warning {
  let warning = Warning::MissingField { source, field };
  warn!(source = %source, field = %field, "{}", warning);
  warning
}
