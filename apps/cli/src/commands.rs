//! CLI command definitions, routing, and tracing setup.

use std::path::PathBuf;

use bodacc_core::filter::{FilterRunConfig, run_filter};
use bodacc_core::pipeline::{DayRangeOrchestrator, ProgressReporter, RunSummary};
use bodacc_core::window::DayWindow;
use bodacc_shared::{AppConfig, Category, init_config, parse_day, resolve_config};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// BODACC announcement fetcher and filter.
#[derive(Parser)]
#[command(
    name = "bodacc",
    version,
    about = "Fetch BODACC announcements day by day and filter them against known SIREN numbers.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Config file (defaults to ~/.bodacc/bodacc.toml).
    #[arg(long, env = "BODACC_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Day bounds shared by `fetch` and `run`.
#[derive(clap::Args, Debug, Clone)]
pub(crate) struct WindowArgs {
    /// First day to fetch (YYYY-MM-DD).
    #[arg(long, value_parser = parse_day)]
    pub start_date: Option<NaiveDate>,

    /// Last day to fetch (YYYY-MM-DD); clamped to yesterday.
    #[arg(long, value_parser = parse_day)]
    pub end_date: Option<NaiveDate>,

    /// Days fetched when no start date is given.
    #[arg(long)]
    pub depth: Option<u32>,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Fetch every missing day of the window into day artifacts.
    Fetch {
        #[command(flatten)]
        window: WindowArgs,
    },

    /// Filter day artifacts against the identifier registry.
    Filter {
        /// Day artifacts to filter instead of the daily directory.
        #[arg(long = "input", num_args = 1..)]
        inputs: Vec<PathBuf>,
    },

    /// Fetch, then filter every day artifact.
    Run {
        #[command(flatten)]
        window: WindowArgs,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "bodacc=info",
        1 => "bodacc=debug",
        _ => "bodacc=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt().with_env_filter(env_filter).with_target(false).init();
        }
        LogFormat::Json => {
            fmt().json().with_env_filter(env_filter).init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let explicit = cli.config.as_deref();
    match cli.command {
        Command::Fetch { window } => {
            let config = resolve_config(explicit)?;
            cmd_fetch(&config, &window).await
        }
        Command::Filter { inputs } => {
            let config = resolve_config(explicit)?;
            let inputs = (!inputs.is_empty()).then_some(inputs);
            cmd_filter(&config, inputs)
        }
        Command::Run { window } => {
            let config = resolve_config(explicit)?;
            cmd_fetch(&config, &window).await?;
            cmd_filter(&config, None)
        }
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(explicit),
        },
    }
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_fetch(config: &AppConfig, args: &WindowArgs) -> Result<()> {
    let depth = args.depth.unwrap_or(config.api.default_days_depth);
    if depth == 0 {
        return Err(eyre!("--depth must be at least 1"));
    }

    let today = chrono::Local::now().date_naive();
    let window = DayWindow::resolve(args.start_date, args.end_date, depth, today)?;
    info!(start = %window.start, end = %window.end, "resolved day window");

    let orchestrator = DayRangeOrchestrator::from_config(config)?;
    let progress = CliProgress::new();
    let summary = orchestrator.run(&window, &progress).await?;

    println!();
    println!("  Fetch complete");
    println!("  Days fetched: {}", summary.days_fetched);
    println!("  Days skipped: {}", summary.days_skipped);
    println!("  Fragments:    {}", summary.fragments);
    println!("  Records:      {}", summary.records);
    println!(
        "  Output:       {}",
        config.directories.daily_path().display()
    );
    println!("  Time:         {:.1}s", summary.elapsed.as_secs_f64());
    if !summary.abandoned.is_empty() {
        println!("  Incomplete (retries exhausted):");
        for (day, category) in &summary.abandoned {
            println!("    {day} category {category}");
        }
    }
    println!();

    Ok(())
}

fn cmd_filter(config: &AppConfig, inputs: Option<Vec<PathBuf>>) -> Result<()> {
    let run_config = FilterRunConfig::from_config(config, inputs)?;
    let summary = run_filter(&run_config)?;

    println!();
    println!("  Filter complete");
    println!("  Files read:    {}", summary.files);
    println!("  Records read:  {}", summary.records_read);
    println!("  Records kept:  {}", summary.records_kept);
    println!("  Days written:  {}", summary.days_written);
    println!("  Days skipped:  {}", summary.days_skipped);
    println!("  Output:        {}", run_config.filtered_dir.display());
    println!();

    Ok(())
}

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(explicit: Option<&std::path::Path>) -> Result<()> {
    let config = resolve_config(explicit)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        match ProgressStyle::with_template("{spinner:.cyan} {msg}") {
            Ok(style) => spinner.set_style(
                style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
            ),
            Err(e) => warn!(error = %e, "invalid spinner template, using default"),
        }
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn day_started(&self, day: NaiveDate, index: usize, total: usize) {
        self.spinner
            .set_message(format!("Fetching [{index}/{total}] {day}"));
    }

    fn day_skipped(&self, day: NaiveDate) {
        self.spinner.set_message(format!("Skipping {day} (already fetched)"));
    }

    fn category_done(&self, day: NaiveDate, category: Category, records: usize) {
        self.spinner
            .set_message(format!("Fetched {day} category {category}: {records} records"));
    }

    fn done(&self, _summary: &RunSummary) {
        self.spinner.finish_and_clear();
    }
}
