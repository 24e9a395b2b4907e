//! sitechat-ingest — crawl a documentation sitemap into a vector dataset.
//!
//! All functional parameters come from the environment (`SITE_MAP`,
//! `DATASET_PATH`, `OPENAI_API_KEY`, ...); the CLI only carries logging
//! flags. Re-running replaces the dataset.

use clap::Parser;
use color_eyre::eyre::Result;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use sitechat_core::{IngestProgress, IngestReport, ingest};
use sitechat_openai::OpenAiClient;
use sitechat_shared::AppConfig;

/// sitechat-ingest — build a question-answering dataset from a sitemap.
#[derive(Parser)]
#[command(
    name = "sitechat-ingest",
    version,
    about = "Crawl a documentation sitemap, embed its text, and write a vector dataset.",
    long_about = None,
)]
struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "sitechat=info",
        1 => "sitechat=debug",
        _ => "sitechat=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt().json().with_env_filter(env_filter).init();
        }
    }
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// Progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap()
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl IngestProgress for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn page_fetched(&self, url: &str, current: usize, total: usize) {
        self.spinner
            .set_message(format!("Fetching [{current}/{total}] {url}"));
    }

    fn done(&self, _report: &IngestReport) {
        self.spinner.finish_and_clear();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    init_tracing(&cli);

    let config = AppConfig::from_env()?;
    info!(
        dataset = %config.dataset_path.display(),
        "starting ingestion"
    );

    let client = OpenAiClient::new(
        config.api_key.clone(),
        config.base_url.clone(),
        config.chat_model.clone(),
        config.embedding_model.clone(),
    )?;

    let reporter = CliProgress::new();
    let report = ingest(&config, &client, &reporter).await?;

    println!();
    println!("  Dataset built successfully!");
    println!("  Documents: {}", report.documents);
    println!("  Chunks:    {}", report.chunks);
    println!("  Path:      {}", report.dataset_path.display());
    if report.embedding_tokens > 0 {
        println!("  Tokens:    {}", report.embedding_tokens);
    }
    println!("  Time:      {:.1}s", report.elapsed.as_secs_f64());
    println!();

    Ok(())
}
