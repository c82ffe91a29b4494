//! CLI command definitions, routing, and tracing setup.

use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{HumanDuration, ProgressBar, ProgressStyle};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use tractcheck_core::{
    EnrichConfig, ProgressReporter, ProgressSnapshot, ProgressTier, RunSummary,
    default_output_path, enrich, write_summary,
};
use tractcheck_geocoder::{CensusGeocoder, Geocode};
use tractcheck_shared::{Address, AppConfig, GeocoderConfig, Verdict, init_config, load_config};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// tractcheck: census-tract eligibility for facility addresses.
#[derive(Parser)]
#[command(
    name = "tractcheck",
    version,
    about = "Flag facilities located in low-income or NMTC-qualifying census tracts.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
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

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Geocode a stations table and annotate each row with its eligibility.
    Run(RunArgs),

    /// Geocode a single address and print its census block.
    Geocode {
        #[arg(long)]
        street: String,
        #[arg(long)]
        city: String,
        #[arg(long)]
        state: String,
        #[arg(long)]
        zip: String,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Arguments for `tractcheck run`.
#[derive(clap::Args)]
pub(crate) struct RunArgs {
    /// Stations CSV.
    #[arg(long)]
    input: PathBuf,

    /// Low-income community reference CSV.
    #[arg(long)]
    low_income: PathBuf,

    /// NMTC reference CSV.
    #[arg(long)]
    nmtc: PathBuf,

    /// Keep only rows whose open date contains this text (case-insensitive).
    #[arg(long, default_value = "")]
    date: String,

    /// Annotated output CSV (defaults to <input>_qualified.csv).
    #[arg(short, long)]
    out: Option<PathBuf>,

    /// Also write the run summary as JSON.
    #[arg(long)]
    summary: Option<PathBuf>,

    /// Rows in flight at once.
    #[arg(long, env = "TRACTCHECK_CONCURRENCY")]
    concurrency: Option<usize>,

    /// Rows per batch.
    #[arg(long)]
    batch_size: Option<usize>,

    /// Attempts per address on transport errors.
    #[arg(long)]
    max_attempts: Option<u32>,
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
        0 => "tractcheck=info",
        1 => "tractcheck=debug",
        _ => "tractcheck=trace",
    };

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Run(args) => cmd_run(args).await,
        Command::Geocode {
            street,
            city,
            state,
            zip,
        } => {
            cmd_geocode(Address {
                street,
                city,
                state,
                zip,
            })
            .await
        }
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_run(args: RunArgs) -> Result<()> {
    let mut app = load_config()?;
    apply_overrides(&mut app, &args)?;

    for (label, path) in [
        ("input", &args.input),
        ("low-income", &args.low_income),
        ("nmtc", &args.nmtc),
    ] {
        if !path.is_file() {
            return Err(eyre!("{label} file '{}' does not exist", path.display()));
        }
    }

    let output = args
        .out
        .clone()
        .unwrap_or_else(|| default_output_path(&args.input));

    let config = EnrichConfig {
        input: args.input.clone(),
        low_income: args.low_income.clone(),
        nmtc: args.nmtc.clone(),
        output,
        date_filter: args.date.clone(),
        app,
    };

    info!(
        input = %config.input.display(),
        date = %config.date_filter,
        concurrency = config.app.pipeline.concurrency,
        batch_size = config.app.pipeline.batch_size,
        "starting run"
    );

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, finishing in-flight rows");
            on_signal.cancel();
        }
    });

    let reporter = CliProgress::new();
    let result = enrich(&config, &reporter, &cancel).await?;

    if let Some(path) = &args.summary {
        write_summary(path, &result.summary)?;
    }

    print_summary(&result.summary, result.rows_read, &result.output);
    Ok(())
}

/// Fold CLI flags over file settings.
fn apply_overrides(app: &mut AppConfig, args: &RunArgs) -> Result<()> {
    if let Some(concurrency) = args.concurrency {
        if concurrency == 0 {
            return Err(eyre!("--concurrency must be at least 1"));
        }
        app.pipeline.concurrency = concurrency;
    }
    if let Some(batch_size) = args.batch_size {
        if batch_size == 0 {
            return Err(eyre!("--batch-size must be at least 1"));
        }
        app.pipeline.batch_size = batch_size;
    }
    if let Some(max_attempts) = args.max_attempts {
        app.geocoder.max_attempts = max_attempts;
    }
    Ok(())
}

fn print_summary(summary: &RunSummary, rows_read: usize, output: &std::path::Path) {
    println!();
    if summary.cancelled {
        println!("  Run cancelled; unreached rows are marked unresolved.");
    } else {
        println!("  Run complete.");
    }
    println!("  Run:           {}", summary.run_id);
    println!("  Rows read:     {rows_read}");
    println!("  Checked:       {}", summary.total);
    println!("  Qualified:     {}", summary.qualified);
    println!("  Not qualified: {}", summary.not_qualified);
    println!("  Skipped:       {}", summary.skipped);
    for (reason, count) in summary.skip_reasons.iter().filter(|(_, c)| **c > 0) {
        println!("    {:<20} {count}", reason.as_str());
    }
    println!("  Unresolved:    {}", summary.unresolved);
    println!(
        "  Time:          {:.1}s",
        Duration::from_millis(summary.elapsed_ms).as_secs_f64()
    );
    println!("  Output:        {}", output.display());
    println!();
}

async fn cmd_geocode(address: Address) -> Result<()> {
    let app = load_config()?;
    let geocoder = CensusGeocoder::new(&GeocoderConfig::from(&app))?;

    info!(street = %address.street, zip = %address.zip, "geocoding address");

    match geocoder.geocode(&address).await {
        Ok(geoid) => {
            println!("GEOID:  {geoid}");
            println!("Tract:  {}", geoid.tract_prefix(app.pipeline.tract_suffix_len));
        }
        Err(reason) => println!("Skipped: {reason}"),
    }
    Ok(())
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter: a spinner for phases, then a bar coloured by tier.
struct CliProgress {
    bar: ProgressBar,
    tier: Mutex<Option<ProgressTier>>,
}

impl CliProgress {
    fn new() -> Self {
        let bar = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
            bar.set_style(style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]));
        }
        bar.enable_steady_tick(Duration::from_millis(80));
        Self {
            bar,
            tier: Mutex::new(None),
        }
    }

    fn bar_style(tier: ProgressTier) -> Option<ProgressStyle> {
        let color = match tier {
            ProgressTier::Low => "red",
            ProgressTier::Mid => "yellow",
            ProgressTier::High => "green",
        };
        let template =
            format!("{{spinner:.cyan}} [{{bar:40.{color}}}] {{pos}}/{{len}} {{percent}}% {{msg}}");
        ProgressStyle::with_template(&template)
            .ok()
            .map(|style| style.progress_chars("=> "))
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.bar.set_message(name.to_string());
    }

    fn row_completed(&self, _index: usize, _verdict: &Verdict, progress: &ProgressSnapshot) {
        let tier = progress.tier();
        if let Ok(mut last) = self.tier.lock() {
            if *last != Some(tier) {
                if let Some(style) = Self::bar_style(tier) {
                    self.bar.set_style(style);
                }
                self.bar.set_length(progress.total as u64);
                *last = Some(tier);
            }
        }
        self.bar.set_position(progress.completed as u64);

        let eta = progress
            .eta()
            .map(|eta| format!("eta {}", HumanDuration(eta)))
            .unwrap_or_default();
        self.bar
            .set_message(format!("skipped {} {eta}", progress.skipped));
    }

    fn done(&self, _summary: &RunSummary) {
        self.bar.finish_and_clear();
    }
}
