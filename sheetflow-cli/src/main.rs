use anyhow::{Context, Result, bail};
use clap::Parser;
use colored::*;
use sheetflow_core::{ErrorPolicy, ReaderConfig, SheetId, XlsxStreamReader};
use std::io::{self, BufWriter};
use std::path::PathBuf;

mod logger;
mod output;

use output::{OutputFormat, RowWriter};

#[derive(Parser)]
#[command(name = "sheetflow")]
#[command(about = "Stream XLSX sheets as CSV or JSON lines", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to the XLSX file to read
    #[arg(value_name = "FILE")]
    file: PathBuf,

    /// Sheet to read (name or relationship id); repeat for several. Default: all sheets
    #[arg(short, long, value_name = "NAME")]
    sheet: Vec<String>,

    /// List the workbook's sheets and exit
    #[arg(short, long)]
    list: bool,

    /// Output format
    #[arg(short, long, value_enum, default_value = "csv")]
    format: OutputFormat,

    /// Pad rows to the width of the first non-empty row plus one
    #[arg(long)]
    pad: bool,

    /// Skip rows that fail to resolve instead of aborting
    #[arg(long)]
    best_effort: bool,

    /// Report cells missing between present ones (cells output)
    #[arg(long)]
    blank_cells: bool,

    /// Path to configuration file (TOML)
    #[arg(short, long, value_name = "CONFIG")]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logger::init(cli.verbose);

    // Load configuration
    let mut config = if let Some(config_path) = &cli.config {
        ReaderConfig::from_file(config_path)
            .with_context(|| format!("Failed to load config from {}", config_path.display()))?
    } else {
        // Try to load default config from current directory if it exists
        let default_config_path = PathBuf::from("sheetflow.toml");
        if default_config_path.exists() {
            ReaderConfig::from_file(&default_config_path).with_context(|| {
                format!(
                    "Failed to load config from {}",
                    default_config_path.display()
                )
            })?
        } else {
            ReaderConfig::default()
        }
    };
    apply_flags(&cli, &mut config);

    let mut reader = XlsxStreamReader::open(&cli.file)
        .with_context(|| format!("Failed to open workbook: {}", cli.file.display()))?;

    if cli.list {
        for sheet in reader.sheets() {
            if sheet.visible {
                println!("{}", sheet.name);
            } else {
                println!("{} {}", sheet.name, "(hidden)".bright_black());
            }
        }
        return Ok(());
    }

    let targets: Vec<SheetId> = if cli.sheet.is_empty() {
        reader.sheets().iter().map(|s| s.id).collect()
    } else {
        cli.sheet
            .iter()
            .map(|name| match reader.find_sheet(name) {
                Some(sheet) => Ok(sheet.id),
                None => bail!("Sheet '{}' not found in {}", name, cli.file.display()),
            })
            .collect::<Result<_>>()?
    };

    let sheet_names = reader.sheets().iter().map(|s| s.name.clone()).collect();
    let stdout = io::stdout();
    let mut writer = RowWriter::new(BufWriter::new(stdout.lock()), cli.format, sheet_names)
        .with_sheet_column(targets.len() > 1);

    for &id in &targets {
        let name = reader.sheets()[id as usize].name.clone();
        let summary = reader
            .read_sheet(id, &config.for_sheet(&name), &mut writer)
            .with_context(|| format!("Failed to read {}", cli.file.display()))?;
        log::info!(
            "{}: {} rows, {} cells, {} skipped",
            name,
            summary.rows_emitted,
            summary.cells_emitted,
            summary.skipped_rows.len()
        );
        if summary.cancelled {
            break;
        }
    }

    let skipped = writer.skipped();
    match writer.finish() {
        Ok(_) => {}
        // downstream closed early, e.g. piped into `head`
        Err(err) if err.kind() == io::ErrorKind::BrokenPipe => {}
        Err(err) => return Err(err).context("Failed to write output"),
    }

    if skipped > 0 {
        eprintln!(
            "{} {} row(s) skipped",
            "Warning:".yellow().bold(),
            skipped
        );
        std::process::exit(1);
    }
    Ok(())
}

/// Command-line flags win over both global and per-sheet configuration
fn apply_flags(cli: &Cli, config: &mut ReaderConfig) {
    if cli.pad {
        config.global.pad_to_reference_width = true;
        for sheet in config.sheets.values_mut() {
            sheet.pad_to_reference_width = Some(true);
        }
    }
    if cli.best_effort {
        config.global.error_policy = ErrorPolicy::BestEffort;
        for sheet in config.sheets.values_mut() {
            sheet.error_policy = Some(ErrorPolicy::BestEffort);
        }
    }
    if cli.blank_cells {
        config.global.emit_blank_cells = true;
        for sheet in config.sheets.values_mut() {
            sheet.emit_blank_cells = Some(true);
        }
    }
}
