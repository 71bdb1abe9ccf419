//! Merge Web of Science (ISI) and Scopus exports into one Scopus-style CSV.
//!
//! The pipeline is `ingest::load` for each source, `reconcile::reconcile`
//! to join the two tables, then `export::write_file`.

pub mod bibtex;
pub mod error;
pub mod export;
pub mod ingest;
pub mod logging;
pub mod matching;
pub mod normalize;
pub mod reconcile;
pub mod record;
pub mod summary;

pub use error::{Error, Result};
pub use export::ExportOptions;
pub use reconcile::{reconcile, FieldPriority, MatchKind, MatchOptions, MergedRecord, MergedTable};
pub use record::{Field, Record, Source, SourceTable, Warning};
pub use summary::MergeSummary;
