//! Empirica - hypothesis to cross-country panel analysis
//!
//! A CLI that plans a research design for a plain-language hypothesis,
//! pulls World Bank panel data, cleans it and estimates descriptive
//! models, writing `results.json`, `summary.md` and `reproduce.toml` per run.
//!
//! Exit codes:
//!   0 - Success
//!   1 - Configuration, data or runtime error

use anyhow::{Context, Result};
use empirica::cli::Args;
use empirica::config::{Config, CONFIG_FILE_NAME};
use empirica::pipeline::{Pipeline, RunOutcome, Stage};
use empirica::report;
use empirica::stats::stars;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse_args();

    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    init_logging(&args);

    info!("Empirica v{}", env!("CARGO_PKG_VERSION"));
    debug!(
        hypothesis = args.hypothesis_text(),
        model = ?args.model,
        output_dir = ?args.output_dir,
        "Arguments parsed"
    );

    if let Err(e) = run(&args).await {
        error!("Run failed: {:#}", e);
        eprintln!("\n❌ Error: {:#}", e);
        std::process::exit(1);
    }

    Ok(())
}

/// Handle --init-config: generate a default .empirica.toml.
fn handle_init_config() -> Result<()> {
    let path = Path::new(CONFIG_FILE_NAME);

    if path.exists() {
        eprintln!(
            "⚠️  {} already exists. Remove it first or edit it manually.",
            CONFIG_FILE_NAME
        );
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content).with_context(|| format!("Failed to write {}", CONFIG_FILE_NAME))?;

    println!("✅ Created {} with default settings.", CONFIG_FILE_NAME);
    println!("   Edit it to customize the model, data source, retries and cleaning.");
    Ok(())
}

/// Initialize logging based on verbosity settings.
fn init_logging(args: &Args) {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(args.log_level())
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }
}

async fn run(args: &Args) -> Result<()> {
    let start_time = Instant::now();

    let mut config = load_config(args)?;
    config.merge_with_args(args);

    let pipeline = Pipeline::from_config(&config)?;

    println!("🔬 Hypothesis: {}", args.hypothesis_text());
    println!("   Model: {}", config.llm.model);
    println!(
        "   Literature: {}\n",
        if config.literature.enabled { "on" } else { "off" }
    );

    let spinner = stage_spinner(args.quiet);
    let outcome = pipeline
        .run_empirica(args.hypothesis_text(), |stage: Stage| {
            spinner.set_message(stage.describe());
        })
        .await;
    spinner.finish_and_clear();
    let outcome = outcome?;

    let dir = report::write_outputs(&config.general.output_dir, &outcome)?;

    print_summary(&outcome);
    println!("   Duration: {:.1}s", start_time.elapsed().as_secs_f64());
    println!("\n✅ Results saved to: {}", dir.display());

    Ok(())
}

fn stage_spinner(hidden: bool) -> ProgressBar {
    if hidden {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.enable_steady_tick(Duration::from_millis(120));
    pb
}

fn print_summary(outcome: &RunOutcome) {
    let plan = &outcome.plan;

    println!("📊 {}", plan.display_title());
    println!("   X: {} ({})", plan.x_label, plan.independent_var);
    println!("   Y: {} ({})", plan.y_label, plan.dependent_var);
    println!(
        "   Sample: {} rows, {} countries (dropped {} in cleaning)",
        outcome.cleaning.rows_after,
        outcome.cleaning.countries_after,
        outcome.cleaning.rows_dropped()
    );

    match outcome.results.ols.fitted() {
        Some(ols) => println!(
            "   OLS: β = {:.4}{} (p = {:.4}, R² = {:.4})",
            ols.coefficient,
            stars(ols.p_value),
            ols.p_value,
            ols.r_squared
        ),
        None => println!(
            "   OLS: failed ({})",
            outcome.results.ols.error().unwrap_or("unknown error")
        ),
    }
    if let Some(fe) = outcome.results.fixed_effects.as_ref().and_then(|m| m.fitted()) {
        println!(
            "   Fixed effects: β = {:.4}{} (p = {:.4}, {} countries)",
            fe.coefficient,
            stars(fe.p_value),
            fe.p_value,
            fe.n_countries
        );
    }
    println!("   References: {}", outcome.literature.len());
}

/// Load configuration from file or use defaults.
fn load_config(args: &Args) -> Result<Config> {
    if let Some(ref config_path) = args.config {
        info!("Loading config from: {}", config_path.display());
        return Config::load(config_path);
    }

    match Config::load_default() {
        Ok(Some(config)) => {
            info!("Loaded default config from {}", CONFIG_FILE_NAME);
            Ok(config)
        }
        Ok(None) => {
            debug!("No config file found, using defaults");
            Ok(Config::default())
        }
        Err(e) => {
            warn!("Failed to load config: {}", e);
            Ok(Config::default())
        }
    }
}
