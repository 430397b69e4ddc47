//! Command-line interface for the market-analyst pipeline
//!
//! # Usage
//!
//! ```bash
//! # Pick a model backend (falls back to heuristics when neither is set)
//! export ANTHROPIC_API_KEY="..."          # or OPENAI_API_KEY / OPENAI_API_BASE
//! export ANALYST_MODELS="claude-3-5-haiku-latest"
//!
//! # Optional collaborators
//! export FINNHUB_API_KEY="..."
//! export ANALYST_DOCUMENT_STORE_URL="http://localhost:8000"
//!
//! analyst analyze "Is RELIANCE a buy for the next few weeks?" --trace
//! analyst run-snippet indicators.rhai --candles candles.json
//! ```

mod output;

use analyst_llm::providers::{AnthropicProvider, OpenAIProvider};
use analyst_llm::{DisabledGenerator, LLMProvider, ModelChain, TextGenerator};
use analyst_pipeline::{
    CachedMarketData, KeywordStore, PipelineConfig, PipelineDirector, RetrievedDocument,
    YahooFinanceProvider, select_document_store, select_news_source,
};
use analyst_sandbox::{Ohlcv, SandboxExecutionRequest, SandboxExecutor};
use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "analyst")]
#[command(about = "Market analysis for Indian equities and indices", long_about = None)]
struct Cli {
    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline for a question
    Analyze {
        /// Natural-language question
        #[arg(value_name = "QUERY")]
        query: String,

        /// Ticker to analyze instead of the one found in the query
        #[arg(short, long)]
        ticker: Option<String>,

        /// Session identifier for log correlation
        #[arg(long)]
        session_id: Option<String>,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = Format::Table)]
        format: Format,

        /// Also print state transitions, stage diagnostics and fallbacks
        #[arg(long)]
        trace: bool,

        /// Directory of `<TICKER>_*.txt` report excerpts for the keyword store
        #[arg(long, value_name = "DIR")]
        reports: Option<PathBuf>,
    },
    /// Execute a computation snippet in the sandbox
    RunSnippet {
        /// Snippet file
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// JSON array of `{open, high, low, close, volume}` rows, oldest first
        #[arg(long, value_name = "JSON")]
        candles: PathBuf,

        /// Deadline in milliseconds (defaults to the configured sandbox deadline)
        #[arg(long)]
        deadline_ms: Option<u64>,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Format {
    Table,
    Json,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.json_logs {
        analyst_utils::init_tracing_json();
    } else {
        analyst_utils::init_tracing();
    }

    let config = PipelineConfig::from_env().context("invalid ANALYST_* configuration")?;

    match cli.command {
        Commands::Analyze {
            query,
            ticker,
            session_id,
            format,
            trace,
            reports,
        } => {
            let director = build_director(config, reports.as_deref()).await?;
            let (recommendation, pipeline_trace) = director
                .analyze_with_trace(&query, ticker.as_deref(), session_id.as_deref())
                .await?;

            match format {
                Format::Json => {
                    let body = if trace {
                        serde_json::json!({ "recommendation": recommendation, "trace": pipeline_trace })
                    } else {
                        serde_json::to_value(&recommendation)?
                    };
                    println!("{}", serde_json::to_string_pretty(&body)?);
                }
                Format::Table => {
                    println!("{}", output::recommendation_table(&recommendation));
                    if let Some(metrics) = output::metrics_table(&recommendation) {
                        println!("{metrics}");
                    }
                    if trace {
                        println!("{}", output::trace_table(&pipeline_trace));
                    }
                }
            }
            Ok(())
        }
        Commands::RunSnippet {
            file,
            candles,
            deadline_ms,
        } => {
            let snippet = tokio::fs::read_to_string(&file)
                .await
                .with_context(|| format!("failed to read snippet {}", file.display()))?;
            let rows = tokio::fs::read_to_string(&candles)
                .await
                .with_context(|| format!("failed to read candles {}", candles.display()))?;
            let dataset: Vec<Ohlcv> =
                serde_json::from_str(&rows).context("candles must be a JSON array of OHLCV rows")?;

            let deadline = deadline_ms.map_or(config.sandbox.default_deadline, Duration::from_millis);
            let executor = SandboxExecutor::new(config.sandbox);
            let output = executor
                .execute(SandboxExecutionRequest::new(snippet, dataset, deadline))
                .await
                .map_err(|e| anyhow::anyhow!("{} ({})", e, e.kind()))?;

            info!(
                operations = output.operations,
                elapsed_ms = output.elapsed.as_millis() as u64,
                "Snippet finished"
            );
            println!("{}", serde_json::to_string_pretty(&output.values)?);
            Ok(())
        }
    }
}

async fn build_director(
    config: PipelineConfig,
    reports: Option<&Path>,
) -> anyhow::Result<PipelineDirector> {
    let generator = build_generator(&config)?;

    let market = Arc::new(CachedMarketData::new(
        Arc::new(YahooFinanceProvider::new()),
        config.cache_ttl_candles,
        config.cache_ttl_snapshot,
    ));

    let keyword_store = Arc::new(KeywordStore::new());
    if let Some(dir) = reports {
        let loaded = load_reports(&keyword_store, dir).await?;
        info!(dir = %dir.display(), excerpts = loaded, "Loaded report excerpts");
    }
    let documents = select_document_store(
        analyst_utils::env_string("ANALYST_DOCUMENT_STORE_URL"),
        Arc::clone(&keyword_store),
    )
    .await;
    let news = select_news_source(
        analyst_utils::env_string("FINNHUB_API_KEY"),
        Arc::new(KeywordStore::new()),
    );

    Ok(PipelineDirector::builder()
        .config(config)
        .generator(generator)
        .market(market)
        .documents(documents)
        .news(news)
        .build()?)
}

fn build_generator(config: &PipelineConfig) -> anyhow::Result<Arc<dyn TextGenerator>> {
    let provider: Arc<dyn LLMProvider> = if analyst_utils::env_string("ANTHROPIC_API_KEY").is_some() {
        Arc::new(AnthropicProvider::from_env()?)
    } else if analyst_utils::env_string("OPENAI_API_KEY").is_some() {
        Arc::new(OpenAIProvider::from_env()?)
    } else {
        warn!("No LLM API key set; every step will use its deterministic fallback");
        return Ok(Arc::new(DisabledGenerator));
    };

    let chain = ModelChain::new(provider, config.models.clone())?
        .with_max_tokens(config.max_tokens)
        .with_temperature(config.temperature);
    info!(models = ?chain.models(), "Model chain ready");
    Ok(Arc::new(chain))
}

/// Load `<TICKER>_*.txt` files, one excerpt per blank-line separated paragraph
async fn load_reports(store: &KeywordStore, dir: &Path) -> anyhow::Result<usize> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .with_context(|| format!("failed to read reports directory {}", dir.display()))?;
    let mut loaded = 0;

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("txt") {
            continue;
        }
        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let Some(ticker) = ticker_from_file_name(file_name) else {
            warn!(file = file_name, "Skipping report without a <TICKER>_ prefix");
            continue;
        };

        let text = tokio::fs::read_to_string(&path).await?;
        for paragraph in text.split("\n\n").map(str::trim).filter(|p| !p.is_empty()) {
            store
                .upsert(&ticker, RetrievedDocument::new(paragraph, file_name))
                .await;
            loaded += 1;
        }
    }
    Ok(loaded)
}

fn ticker_from_file_name(file_name: &str) -> Option<String> {
    let (prefix, _) = file_name.split_once('_')?;
    let ticker = prefix.trim().to_uppercase();
    analyst_pipeline::domain::is_valid_symbol(&ticker).then_some(ticker)
}
