//! sitechat — ask questions against an ingested documentation dataset.
//!
//! Opens the dataset read-only, retrieves the most relevant chunks for
//! each question, and streams the model's answer to stdout. Questions
//! can also be piped in; the session ends on `quit` or EOF.

use std::io::{self, BufRead, Write};

use clap::Parser;
use color_eyre::eyre::Result;
use tracing::info;

use sitechat_core::{ConversationalAnswerer, Retriever, run_session};
use sitechat_openai::OpenAiClient;
use sitechat_shared::AppConfig;
use sitechat_store::VectorStore;

/// sitechat — conversational question answering over ingested docs.
#[derive(Parser)]
#[command(
    name = "sitechat",
    version,
    about = "Chat with a documentation site ingested by sitechat-ingest.",
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
        0 => "sitechat=warn",
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

/// Prompt for and read one line of input; `None` on EOF.
fn read_question() -> Option<String> {
    print!("\nPlease enter your question (or 'quit' to stop): ");
    io::stdout().flush().ok()?;

    let mut line = String::new();
    match io::stdin().lock().read_line(&mut line) {
        Ok(0) => None,
        Ok(_) => Some(line),
        Err(_) => None,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    init_tracing(&cli);

    let config = AppConfig::from_env()?;
    let store = VectorStore::open_readonly(&config.dataset_path).await?;
    let chunk_count = store.len().await?;
    info!(
        dataset = %config.dataset_path.display(),
        chunks = chunk_count,
        "dataset opened"
    );

    let client = OpenAiClient::new(
        config.api_key.clone(),
        config.base_url.clone(),
        config.chat_model.clone(),
        config.embedding_model.clone(),
    )?;

    let answerer = ConversationalAnswerer::new(
        Retriever::new(store, client.clone()),
        client,
    )
    .with_token_sink(Box::new(|token| {
        print!("{token}");
        let _ = io::stdout().flush();
    }));

    println!(
        "Loaded {chunk_count} chunks from {}.",
        config.dataset_path.display()
    );

    let input = std::iter::from_fn(read_question);
    let summary = run_session(&answerer, input, |_question, outcome| {
        println!();
        if let Some(source) = outcome.top_source() {
            println!("Source: {source}");
        }
    })
    .await?;

    info!(questions = summary.questions_answered, "session ended");
    Ok(())
}
