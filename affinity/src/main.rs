//! Affinity - track how your relationships are going.
//!
//! A headless, line-oriented front end: add the people you know, describe
//! what happened, and a language model judges how it moved the relationship.
//!
//! ```bash
//! cargo run -p affinity -- --provider gemini --data-dir ~/.affinity
//! ```

mod headless;

use affinity_core::{Tracker, TrackerConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Logs go to stderr so stdout stays a clean protocol stream
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let options = headless::parse_options(&args)?;

    if options.help {
        print_help();
        return Ok(());
    }

    let config = options.apply(TrackerConfig::from_env()?);
    let provider = config.evaluator.provider;

    // A missing key is not fatal: it is re-checked on every evaluation.
    if provider.api_key_from_env().is_err() {
        eprintln!(
            "Warning: {} is not set; interactions will fail until it is.",
            provider.api_key_var()
        );
    }

    info!(
        provider = %provider,
        data_dir = %config.data_dir.display(),
        "Starting tracker"
    );

    let tracker = Tracker::open(config).await;
    headless::run_headless(tracker).await?;

    Ok(())
}

fn print_help() {
    println!("Affinity - relationship tracker with model-evaluated interactions");
    println!();
    println!("USAGE:");
    println!("  affinity [OPTIONS]");
    println!();
    println!("OPTIONS:");
    println!("  -h, --help              Show this help message");
    println!("  --provider <NAME>       gemini or siliconflow (env: AFFINITY_PROVIDER)");
    println!("  --model <MODEL>         Model override (env: AFFINITY_MODEL)");
    println!("  --data-dir <DIR>        Where characters are saved (env: AFFINITY_DATA_DIR)");
    println!("  --timeout <SECS>        Request timeout (env: AFFINITY_TIMEOUT_SECS)");
    println!();
    println!("CREDENTIALS:");
    println!("  GEMINI_API_KEY          For --provider gemini");
    println!("  SILICONFLOW_API_KEY     For --provider siliconflow");
    println!();
    println!("EXAMPLES:");
    println!("  affinity                                  # Gemini, ./.affinity");
    println!("  affinity --provider siliconflow --timeout 30");
}
