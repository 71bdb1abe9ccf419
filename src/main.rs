use std::io::{self, IsTerminal};
use std::path::PathBuf;
use std::process;

use anyhow::{Context, Result};
use clap::{App, Arg, ArgMatches};
use tracing::info;

use bibmerge::export::{self, ExportOptions};
use bibmerge::ingest;
use bibmerge::logging::{init_logging, LogConfig, LogFormat};
use bibmerge::reconcile::DEFAULT_THRESHOLD;
use bibmerge::{reconcile, FieldPriority, MatchOptions, MergeSummary, Source};

const DEFAULT_OUTPUT: &str = "merged_isi_scopus.csv";

fn cli() -> App<'static, 'static> {
  App::new("bibmerge")
    .version(env!("CARGO_PKG_VERSION"))
    .about("Merge ISI (Web of Science) and Scopus exports into one Scopus-style CSV for VOSviewer")
    .arg(
      Arg::with_name("isi")
        .long("isi")
        .value_name("PATH")
        .takes_value(true)
        .required(true)
        .help("ISI export (.bib, .csv, .txt, .xlsx) or a directory of them"),
    )
    .arg(
      Arg::with_name("scopus")
        .long("scopus")
        .value_name("PATH")
        .takes_value(true)
        .required(true)
        .help("Scopus export (.csv, .xlsx) or a directory of them"),
    )
    .arg(
      Arg::with_name("output")
        .short("o")
        .long("output")
        .value_name("PATH")
        .takes_value(true)
        .default_value(DEFAULT_OUTPUT)
        .help("Merged CSV to write"),
    )
    .arg(
      Arg::with_name("threshold")
        .long("threshold")
        .value_name("F")
        .takes_value(true)
        .help("Minimum title similarity (0-1) for joining records without a DOI [default: 0.95]"),
    )
    .arg(
      Arg::with_name("prefer")
        .long("prefer")
        .value_name("SOURCE")
        .takes_value(true)
        .possible_values(&["isi", "scopus"])
        .default_value("scopus")
        .help("Source whose values win when both records carry a field"),
    )
    .arg(
      Arg::with_name("prefer-field")
        .long("prefer-field")
        .value_name("FIELD=SOURCE")
        .takes_value(true)
        .multiple(true)
        .number_of_values(1)
        .help("Per-field override of --prefer, e.g. \"References=isi\""),
    )
    .arg(
      Arg::with_name("transliterate")
        .long("transliterate")
        .help("Fold accented titles to ASCII before comparing them"),
    )
    .arg(
      Arg::with_name("bom")
        .long("bom")
        .help("Start the CSV with a UTF-8 byte order mark (for Excel)"),
    )
    .arg(
      Arg::with_name("provenance")
        .long("provenance")
        .help("Add Sources and Match columns to the CSV"),
    )
    .arg(
      Arg::with_name("summary-json")
        .long("summary-json")
        .value_name("PATH")
        .takes_value(true)
        .help("Also write the merge summary as JSON"),
    )
    .arg(
      Arg::with_name("dry-run")
        .long("dry-run")
        .help("Merge and report without writing the CSV"),
    )
    .arg(
      Arg::with_name("verbose")
        .short("v")
        .multiple(true)
        .help("More log output (-v info, -vv debug, -vvv trace)"),
    )
    .arg(
      Arg::with_name("quiet")
        .short("q")
        .long("quiet")
        .conflicts_with("verbose")
        .help("Only log errors"),
    )
    .arg(
      Arg::with_name("log-format")
        .long("log-format")
        .value_name("FORMAT")
        .takes_value(true)
        .possible_values(&["pretty", "compact", "json"])
        .default_value("pretty"),
    )
}

struct Options {
  isi: PathBuf,
  scopus: PathBuf,
  output: PathBuf,
  matching: MatchOptions,
  priority: FieldPriority,
  export: ExportOptions,
  summary_json: Option<PathBuf>,
  dry_run: bool,
}

fn options_from(matches: &ArgMatches) -> Result<Options> {
  let path = |name: &str| matches.value_of(name).map(PathBuf::from);

  let threshold = match matches.value_of("threshold") {
    Some(raw) => raw
      .parse::<f64>()
      .with_context(|| format!("invalid --threshold '{}'", raw))?,
    None => DEFAULT_THRESHOLD,
  };
  let prefer = matches
    .value_of("prefer")
    .unwrap_or("scopus")
    .parse::<Source>()
    .map_err(anyhow::Error::msg)?;
  let mut priority = FieldPriority::new(prefer);
  for pair in matches.values_of("prefer-field").into_iter().flatten() {
    priority.add_override(pair)?;
  }

  Ok(Options {
    isi: path("isi").context("missing --isi")?,
    scopus: path("scopus").context("missing --scopus")?,
    output: path("output").unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT)),
    matching: MatchOptions {
      threshold,
      transliterate: matches.is_present("transliterate"),
    },
    priority,
    export: ExportOptions {
      bom: matches.is_present("bom"),
      provenance: matches.is_present("provenance"),
    },
    summary_json: path("summary-json"),
    dry_run: matches.is_present("dry-run"),
  })
}

fn run(opts: &Options) -> Result<()> {
  let isi = ingest::load(&opts.isi, Source::Isi)
    .with_context(|| format!("loading ISI export {}", opts.isi.display()))?;
  let scopus = ingest::load(&opts.scopus, Source::Scopus)
    .with_context(|| format!("loading Scopus export {}", opts.scopus.display()))?;

  let merged = reconcile(&isi, &scopus, &opts.matching)?;
  let summary = MergeSummary::from_merge(&isi, &scopus, &merged);

  if opts.dry_run {
    info!("dry run, merged CSV not written");
    if let Some(path) = &opts.summary_json {
      summary
        .write_json(path)
        .with_context(|| format!("writing summary {}", path.display()))?;
    }
  } else {
    let json = opts.summary_json.as_deref().map(|path| (path, &summary));
    export::write_outputs(&opts.output, json, &merged, &opts.priority, &opts.export)
      .with_context(|| format!("writing {}", opts.output.display()))?;
  }

  let stdout = io::stdout();
  let mut out = stdout.lock();
  summary.print(&mut out)?;
  if !opts.dry_run {
    use std::io::Write;
    writeln!(out, "wrote {}", opts.output.display())?;
  }
  Ok(())
}

fn main() {
  let matches = cli().get_matches();

  let mut log_config = LogConfig::from_flags(matches.occurrences_of("verbose"), matches.is_present("quiet"));
  log_config.format = matches
    .value_of("log-format")
    .and_then(LogFormat::parse)
    .unwrap_or_default();
  log_config.with_ansi = io::stderr().is_terminal();
  init_logging(&log_config);

  let code = match options_from(&matches).and_then(|opts| run(&opts)) {
    Ok(()) => 0,
    Err(error) => {
      eprintln!("error: {:#}", error);
      1
    }
  };
  process::exit(code);
}
