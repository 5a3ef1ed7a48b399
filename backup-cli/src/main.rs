//! Command-line front end for the backup engine.

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use tracing::{debug, Level};

use backup::{Mode, Options, RunReport};

/// Checks every bit of every file, but ignores all dates and times.
#[derive(Parser)]
#[command(
    name = "backup",
    version,
    about = "Compare, copy, or cull a destination directory tree against a source.\n\
             Checks every bit of every file, but ignores all dates/times and permissions."
)]
struct Cli {
    /// Source directory
    source: String,
    /// Destination directory
    destination: String,

    /// Show all missing/modified/extra files/dirs, but do nothing (default)
    #[arg(long, group = "job")]
    compare: bool,
    /// Copy (replace) all missing/modified files/dirs
    #[arg(long, group = "job")]
    copy: bool,
    /// Delete only the extra files/dirs (anything not in the source)
    #[arg(long, group = "job")]
    cull: bool,

    /// A safe mode that does nothing except show what WOULD have been done
    #[arg(long)]
    dry_run: bool,
    /// Run minimal threads to prevent slowing your computer down
    #[arg(long)]
    background: bool,
    /// Assume files with the exact same size have the same contents
    #[arg(long, alias = "skip-file-reads")]
    skip_file_read: bool,
    /// Display relative paths instead of absolute paths
    #[arg(long, overrides_with = "show_absolute")]
    show_relative: bool,
    /// Display absolute paths (default)
    #[arg(long, overrides_with = "show_relative")]
    show_absolute: bool,
    /// Show extra info (warns on symlinks and other weird stuff)
    #[arg(long)]
    verbose: bool,
    /// Show only errors and the final result
    #[arg(long)]
    quiet: bool,

    /// Extra files or dirs in the destination are not shown
    #[arg(long, alias = "ignore-extras")]
    ignore_extra: bool,
    /// Errors caused by access/permission problems are not shown
    #[arg(long)]
    ignore_access: bool,
    /// Errors caused by files or dirs with unknown types are not shown
    #[arg(long, alias = "ignore-unknowns")]
    ignore_unknown: bool,
    /// Warnings about unusual counts or possible errors are not shown
    #[arg(long, alias = "ignore-warning")]
    ignore_warnings: bool,
    /// Same as all the ignore options above at once
    #[arg(long)]
    ignore_all: bool,

    /// Enable colored console output
    #[arg(long, alias = "color", overrides_with = "color_off")]
    color_on: bool,
    /// Disable colored console output
    #[arg(long, alias = "no-color", overrides_with = "color_on")]
    color_off: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else if cli.quiet {
        Level::ERROR
    } else {
        Level::INFO
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match run(cli) {
        Ok(report) if report.is_success() => ExitCode::SUCCESS,
        Ok(_) => ExitCode::FAILURE,
        Err(error) => {
            eprintln!("Error: {error:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<RunReport> {
    let mode = if cli.copy {
        Mode::Copy
    } else if cli.cull {
        Mode::Cull
    } else {
        Mode::Compare
    };

    let mut options = Options::new(mode, &cli.source, &cli.destination)?;
    options.dry_run = cli.dry_run;
    options.background = cli.background;
    options.skip_file_read = cli.skip_file_read;
    options.verbose = cli.verbose;
    options.quiet = cli.quiet;
    options.show_relative = cli.show_relative;
    options.ignore_extra = cli.ignore_extra || cli.ignore_all;
    options.ignore_access = cli.ignore_access || cli.ignore_all;
    options.ignore_unknown = cli.ignore_unknown || cli.ignore_all;
    options.ignore_warnings = cli.ignore_warnings || cli.ignore_all;
    if cli.color_on {
        options.color = true;
    }
    if cli.color_off {
        options.color = false;
    }
    options.log_dir = Some(std::env::current_dir()?);

    debug!(mode = mode.as_str(), "options assembled");
    Ok(backup::run(options)?)
}
