//! Picture Sort - sort photos into year/month folders by capture date
//!
//! A CLI tool that reads capture dates from EXIF metadata, file names
//! and printed date stamps, and files pictures into a dated tree.

use anyhow::Result;
use clap::Parser;
use picture_sort::{Cli, Config, PlacementStatus, Processor, ResolutionOutcome};
use std::path::Path;
use tracing::{Level, error, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod cli_output {
    //! Colored terminal output for the end-of-run report

    use crossterm::{
        ExecutableCommand,
        style::{Color, Print, Stylize, style},
    };
    use std::io::stdout;

    pub struct CliTheme;

    impl CliTheme {
        pub const SUCCESS: Color = Color::Green;
        pub const WARNING: Color = Color::Yellow;
        pub const ERROR: Color = Color::Red;
        pub const HINT: Color = Color::DarkGrey;
        pub const ACCENT: Color = Color::Cyan;
    }

    pub fn print_separator() {
        let _ = stdout().execute(Print(&format!("{}\n", "─".repeat(60))));
    }

    pub fn print_title(title: &str) {
        let padding = (60usize.saturating_sub(title.len())) / 2;
        let _ = stdout().execute(Print(" ".repeat(padding)));
        let _ = stdout().execute(Print(style(title).bold()));
        let _ = stdout().execute(Print("\n"));
    }

    pub fn print_error(msg: &str) {
        let _ = stdout().execute(Print(style("✗ ").with(CliTheme::ERROR).bold()));
        let _ = stdout().execute(Print(format!("{}\n", msg)));
    }

    pub fn print_hint(msg: &str) {
        let _ = stdout().execute(Print(style("→ ").with(CliTheme::HINT)));
        let _ = stdout().execute(Print(format!("{}\n", msg)));
    }

    pub fn print_stat(key: &str, value: usize, color: Color) {
        let _ = stdout().execute(Print("  "));
        let _ = stdout().execute(Print(style(key).with(CliTheme::HINT)));
        let _ = stdout().execute(Print(": "));
        let _ = stdout().execute(Print(style(value.to_string()).with(color).bold()));
        let _ = stdout().execute(Print("\n"));
    }

    pub fn print_result(status_icon: &str, status_color: Color, source: &str, detail: &str) {
        let _ = stdout().execute(Print("  "));
        let _ = stdout().execute(Print(style(status_icon).with(status_color).bold()));
        let _ = stdout().execute(Print(" "));
        let _ = stdout().execute(Print(style(source).italic()));
        let _ = stdout().execute(Print(" "));
        let _ = stdout().execute(Print(style(detail).with(CliTheme::HINT)));
        let _ = stdout().execute(Print("\n"));
    }

    pub fn print_blank() {
        let _ = stdout().execute(Print("\n"));
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.print_config {
        print!("{}", Config::sample_config());
        return Ok(());
    }

    let _guard = setup_logging(&cli)?;

    info!(version = env!("CARGO_PKG_VERSION"), "Picture Sort starting");

    let config = load_config(&cli)?;
    if config.verbose {
        info!(?config, "Configuration loaded");
    }

    let processor = Processor::new(config);
    let report = match processor.run() {
        Ok(report) => report,
        Err(e) => {
            error!(error = %e, "Processing failed");
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    use cli_output::*;

    print_separator();
    print_title("Sorting complete");
    print_separator();
    print_blank();
    print_stat("Examined", report.summary.examined, CliTheme::ACCENT);
    print_stat("Placed", report.summary.placed, CliTheme::SUCCESS);
    print_stat("Already present", report.summary.skipped, CliTheme::WARNING);
    print_stat("Unsorted", report.summary.unresolved, CliTheme::WARNING);
    print_stat("Failed", report.summary.failed, CliTheme::ERROR);
    print_blank();

    if cli.verbose {
        print_separator();
        print_hint("Detailed results");
        print_blank();

        for result in &report.results {
            let source = result.source.display().to_string();
            let destination = result
                .destination
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default();
            match result.status {
                PlacementStatus::Placed => {
                    let origin = match result.outcome {
                        ResolutionOutcome::Resolved { source, .. } => format!("{source:?}"),
                        ResolutionOutcome::Unresolved => String::new(),
                    };
                    print_result(
                        "✓",
                        CliTheme::SUCCESS,
                        &source,
                        &format!("→ {} ({})", destination, origin),
                    );
                }
                PlacementStatus::Skipped => print_result(
                    "⊘",
                    CliTheme::WARNING,
                    &source,
                    &format!("already at {}", destination),
                ),
                PlacementStatus::Unsorted => {
                    print_result("?", CliTheme::ACCENT, &source, &format!("→ {}", destination))
                }
                PlacementStatus::Failed => print_result(
                    "✗",
                    CliTheme::ERROR,
                    &source,
                    result.error.as_deref().unwrap_or("unknown error"),
                ),
            }
        }
    }

    let failed: Vec<_> = report
        .results
        .iter()
        .filter(|r| r.status == PlacementStatus::Failed)
        .collect();
    if !failed.is_empty() {
        print_separator();
        print_error(&format!("{} files could not be placed", failed.len()));
        for result in failed {
            print_result(
                "✗",
                CliTheme::ERROR,
                &result.source.display().to_string(),
                result.error.as_deref().unwrap_or("unknown error"),
            );
        }
    }

    info!("Processing complete");
    Ok(())
}

/// Load configuration from file or CLI arguments
fn load_config(cli: &Cli) -> Result<Config> {
    let config = if let Some(ref config_path) = cli.config {
        let resolved_path = resolve_config_path(config_path);
        info!(config_file = %resolved_path.display(), "Loading configuration from file");
        let file_config = Config::load_from_file(&resolved_path)?;
        cli.merge_with_config(file_config)
    } else {
        cli.to_config()
    };

    if config.source_dir.as_os_str().is_empty() {
        anyhow::bail!("No source directory given. Pass SOURCE or set source_dir in the config file");
    }
    if config.destination_dir.as_os_str().is_empty() {
        anyhow::bail!(
            "No destination directory given. Pass DESTINATION or set destination_dir in the config file"
        );
    }

    Ok(config)
}

/// Accept `-C photos` for `photos.toml`
fn resolve_config_path(config_path: &Path) -> std::path::PathBuf {
    if config_path.exists() || config_path.extension().is_some() {
        return config_path.to_path_buf();
    }
    let with_extension = config_path.with_extension("toml");
    if with_extension.exists() {
        with_extension
    } else {
        config_path.to_path_buf()
    }
}

/// Setup logging: console always, plus an optional log file
fn setup_logging(cli: &Cli) -> Result<Option<WorkerGuard>> {
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let env_filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    let subscriber = tracing_subscriber::registry().with(env_filter);

    let Some(log_path) = &cli.log_file else {
        if cli.json_log {
            subscriber
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        } else {
            subscriber
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
        return Ok(None);
    };

    if let Some(parent) = log_path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }

    let file = std::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(log_path)?;

    let (non_blocking, guard) = tracing_appender::non_blocking(file);

    if cli.json_log {
        subscriber
            .with(
                fmt::layer()
                    .json()
                    .with_ansi(false)
                    .with_writer(non_blocking),
            )
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    } else {
        subscriber
            .with(fmt::layer().with_ansi(false).with_writer(non_blocking))
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    Ok(Some(guard))
}
