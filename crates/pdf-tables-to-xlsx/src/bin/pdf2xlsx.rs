use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::str::FromStr;

use anyhow::{Context, Result, anyhow};
use chrono::{Local, NaiveDate};
use clap::{Args, Parser, Subcommand};
use pdf_tables_to_xlsx::{
    ArchiveEntry, BundleRequest, ConsolidateOptions, ConsolidationReport, DetectionSettings,
    PageSelection, RunDir, StrategyMode, ZipPackager, build_bundle, consolidate_pdf_to_xlsx,
    vacant_path,
};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "pdf2xlsx",
    version,
    about = "Consolidate PDF tables into one workbook and bundle it as a ZIP"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Build one ZIP bundle per input PDF.
    Bundle(BundleArgs),
    /// Write only the consolidated workbook.
    Tables(TablesArgs),
}

#[derive(Debug, Args)]
struct TuningArgs {
    /// Page selection like 1-3,5. Applies to table detection only.
    #[arg(long)]
    pages: Option<String>,

    /// Detection strategy: auto, lattice or stream.
    #[arg(long, default_value = "auto")]
    strategy: String,

    /// Sheet name prefix.
    #[arg(long, default_value = pdf_tables_to_xlsx::DEFAULT_SHEET_PREFIX)]
    sheet_prefix: String,

    /// Do not write the 0, 1, 2, … column header row.
    #[arg(long)]
    no_header_row: bool,

    /// Words that must share an edge before the stream strategy sees a column.
    #[arg(long, default_value_t = 3)]
    min_words_vertical: usize,

    /// Parent directory for per-run scratch directories.
    #[arg(long)]
    workdir: Option<PathBuf>,

    /// Print every warning and log at info level.
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Debug, Args)]
struct BundleArgs {
    /// Input PDF path. Repeatable.
    #[arg(short, long = "input", required = true)]
    inputs: Vec<PathBuf>,

    /// Directory receiving the ZIP bundles.
    #[arg(short, long)]
    output: PathBuf,

    /// Extra file added to every bundle. Repeatable.
    #[arg(long = "attach")]
    attachments: Vec<PathBuf>,

    /// Content of the info text file.
    #[arg(long)]
    info_text: Option<String>,

    /// Date stamped into archive names, as YYYYMMDD. Defaults to today.
    #[arg(long)]
    date: Option<String>,

    #[command(flatten)]
    tuning: TuningArgs,
}

#[derive(Debug, Args)]
struct TablesArgs {
    /// Input PDF path.
    #[arg(short, long)]
    input: PathBuf,

    /// Output workbook path.
    #[arg(short, long)]
    output: PathBuf,

    #[command(flatten)]
    tuning: TuningArgs,
}

fn parse_options(args: &TuningArgs) -> Result<ConsolidateOptions> {
    let pages = args
        .pages
        .as_deref()
        .map(PageSelection::from_str)
        .transpose()
        .map_err(|error| anyhow!("invalid page selection: {error}"))
        .context("failed to parse --pages")?;
    let strategy = StrategyMode::from_str(&args.strategy)
        .map_err(|error| anyhow!(error))
        .context("failed to parse --strategy")?;

    Ok(ConsolidateOptions {
        pages,
        strategy,
        detection: DetectionSettings {
            min_words_vertical: args.min_words_vertical,
            ..DetectionSettings::default()
        },
        sheet_prefix: args.sheet_prefix.clone(),
        column_header_row: !args.no_header_row,
        ..ConsolidateOptions::default()
    })
}

fn parse_date(value: Option<&str>) -> Result<NaiveDate> {
    match value {
        Some(value) => NaiveDate::parse_from_str(value, "%Y%m%d")
            .with_context(|| format!("invalid --date '{value}', expected YYYYMMDD")),
        None => Ok(Local::now().date_naive()),
    }
}

fn new_run_dir(parent: Option<&Path>) -> Result<RunDir> {
    let run_dir = match parent {
        Some(parent) => {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create '{}'", parent.display()))?;
            RunDir::within(parent)
        }
        None => RunDir::temporary(),
    };
    run_dir.context("failed to create run directory")
}

fn read_attachments(paths: &[PathBuf]) -> Result<Vec<ArchiveEntry>> {
    paths
        .iter()
        .map(|path| {
            let bytes = std::fs::read(path)
                .with_context(|| format!("failed to read attachment '{}'", path.display()))?;
            let name = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();
            Ok(ArchiveEntry::new(name, bytes))
        })
        .collect()
}

fn log_report(source: &Path, report: &ConsolidationReport, verbose: bool) {
    eprintln!(
        "{}: {} sheet(s), {} skipped, identifier '{}'",
        source.display(),
        report.sheet_count(),
        report.skipped_tables,
        report.identifier
    );
    if report.warnings.is_empty() {
        return;
    }

    eprintln!("warning: {} issue(s) detected", report.warnings.len());
    if verbose {
        for warning in &report.warnings {
            eprintln!(
                "  - {:?} page={:?} table={:?}: {}",
                warning.code, warning.page, warning.table, warning.message
            );
        }
    }
}

/// Writes `bytes` to `path`, refusing to replace a file that already exists.
fn write_new_file(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .with_context(|| format!("failed to create '{}'", path.display()))?;
    file.write_all(bytes)
        .with_context(|| format!("failed to write '{}'", path.display()))
}

/// Returns whether every bundle got at least one sheet.
fn run_bundle(args: &BundleArgs) -> Result<bool> {
    let mut options = parse_options(&args.tuning)?;
    if let Some(info_text) = &args.info_text {
        options.info_text.clone_from(info_text);
    }
    let run_date = parse_date(args.date.as_deref())?;
    let attachments = read_attachments(&args.attachments)?;
    std::fs::create_dir_all(&args.output)
        .with_context(|| format!("failed to create '{}'", args.output.display()))?;

    let mut all_have_sheets = true;
    for input in &args.inputs {
        let pdf_bytes = std::fs::read(input)
            .with_context(|| format!("failed to read '{}'", input.display()))?;
        let pdf_name = input
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let run_dir = new_run_dir(args.tuning.workdir.as_deref())?;

        let bundle = build_bundle(
            BundleRequest {
                pdf_name,
                pdf_bytes,
                attachments: attachments.clone(),
                run_date,
            },
            &ZipPackager,
            Some(&run_dir),
            &options,
        )
        .with_context(|| format!("failed to bundle '{}'", input.display()))?;

        let target = vacant_path(&args.output, &bundle.archive_name);
        write_new_file(&target, &bundle.archive_bytes)?;
        log_report(input, &bundle.report, args.tuning.verbose);
        println!("{}", target.display());

        all_have_sheets &= bundle.report.sheet_count() > 0;
    }

    Ok(all_have_sheets)
}

fn run_tables(args: &TablesArgs) -> Result<bool> {
    let options = parse_options(&args.tuning)?;
    let run_dir = new_run_dir(args.tuning.workdir.as_deref())?;
    let report = consolidate_pdf_to_xlsx(&args.input, &args.output, Some(&run_dir), &options)
        .with_context(|| format!("failed to consolidate '{}'", args.input.display()))?;
    log_report(&args.input, &report, args.tuning.verbose);
    Ok(report.sheet_count() > 0)
}

fn init_logging(verbose: bool) {
    let default_level = if verbose {
        "pdf_tables_to_xlsx=info"
    } else {
        "pdf_tables_to_xlsx=warn"
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let (verbose, outcome) = match &cli.command {
        Commands::Bundle(args) => {
            init_logging(args.tuning.verbose);
            (args.tuning.verbose, run_bundle(args))
        }
        Commands::Tables(args) => {
            init_logging(args.tuning.verbose);
            (args.tuning.verbose, run_tables(args))
        }
    };

    match outcome {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => {
            if verbose {
                eprintln!("no table became a sheet");
            }
            ExitCode::from(2)
        }
        Err(error) => {
            eprintln!("error: {error:#}");
            ExitCode::from(1)
        }
    }
}
