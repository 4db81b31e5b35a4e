//! Command-line interface for hybrid question-answering retrieval.

mod model;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use qa_core::{Candidate, QaConfig, QaError};
use qa_query::RetrievalEngine;
use qa_store::MemoryStore;

use model::CommandModel;

#[derive(Parser)]
#[command(name = "qa")]
#[command(about = "Hybrid BM25, semantic and exact-match retrieval over a document corpus")]
#[command(version)]
struct Cli {
    /// Path to the JSON corpus export
    #[arg(short, long, global = true)]
    corpus: Option<PathBuf>,

    /// Path to a TOML config file
    #[arg(long, global = true, conflicts_with = "preset")]
    config: Option<PathBuf>,

    /// Named fusion preset (balanced, vector, keyword, exact, fast, comprehensive)
    #[arg(long, global = true)]
    preset: Option<String>,

    /// Command that reads a planning prompt on stdin and answers on stdout
    #[arg(long, global = true)]
    llm_command: Option<String>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Single-pass hybrid search
    Search {
        /// Search query
        query: String,

        /// Maximum number of results
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// Context length budget in characters
        #[arg(long)]
        max_context: Option<usize>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Plan the missing dimensions, then search them
    Plan {
        /// Search query
        query: String,

        /// Conversation context already available
        #[arg(long)]
        context: Option<String>,

        /// Maximum number of results
        #[arg(short = 'k', long, default_value = "10")]
        max_results: usize,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the weighted keywords of a query
    Keywords {
        /// Query text
        query: String,

        /// Maximum number of keywords
        #[arg(short = 'k', long)]
        limit: Option<usize>,
    },

    /// Show lexical index statistics
    Stats,
}

fn setup_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber).ok();
}

fn load_config(cli: &Cli) -> Result<QaConfig, QaError> {
    let config = match (&cli.config, &cli.preset) {
        (Some(path), None) => QaConfig::load(path)?,
        (None, Some(name)) => QaConfig::preset(name),
        (None, None) => QaConfig::load_default()?,
        (Some(_), Some(_)) => {
            return Err(QaError::config("--config and --preset cannot be combined"))
        }
    };
    config.validate()?;
    Ok(config)
}

fn corpus_path(cli: &Cli) -> Result<PathBuf, QaError> {
    if let Some(path) = &cli.corpus {
        return Ok(path.clone());
    }
    dirs::data_dir()
        .map(|dir| dir.join("qa-retrieval").join("corpus.json"))
        .ok_or_else(|| QaError::config("no data directory found; pass --corpus"))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let store = match corpus_path(&cli).and_then(MemoryStore::load_json) {
        Ok(store) => store,
        Err(e) => {
            eprintln!("Error loading corpus: {}", e);
            std::process::exit(1);
        }
    };

    let model = cli
        .llm_command
        .as_deref()
        .and_then(CommandModel::parse)
        .map(Arc::new);

    let engine = RetrievalEngine::new(Arc::new(store), model, config);
    engine.rebuild_index().await?;

    match cli.command {
        Commands::Search {
            query,
            top_k,
            max_context,
            json,
        } => {
            let response = match engine.search(&query, top_k, max_context).await {
                Ok(response) => response,
                Err(e) => {
                    eprintln!("Error [{}]: {}", e.error_code(), e);
                    std::process::exit(1);
                }
            };

            if json {
                println!("{}", serde_json::to_string_pretty(&response)?);
                return Ok(());
            }

            if let Some(message) = &response.message {
                println!("{}", message);
                return Ok(());
            }

            println!(
                "Found {} results ({} candidates, {:.3}s)",
                response.ranked.len(),
                response.candidate_count,
                response.search_time_secs
            );
            println!("Keywords: {}\n", response.keywords.join(", "));
            print_ranked(&response.ranked);
            println!("\n{}", response.context.text);
        }

        Commands::Plan {
            query,
            context,
            max_results,
            json,
        } => {
            let response = match engine
                .plan_and_search(&query, context.as_deref(), max_results)
                .await
            {
                Ok(response) => response,
                Err(e) => {
                    eprintln!("Error [{}]: {}", e.error_code(), e);
                    std::process::exit(1);
                }
            };

            if json {
                println!("{}", serde_json::to_string_pretty(&response)?);
                return Ok(());
            }

            let plan = &response.plan;
            println!("Plan ({:?}, confidence {:.2})", plan.origin, plan.confidence);
            println!("  Needs search: {}", response.needs_search);
            println!(
                "  Dimensions:   {}",
                plan.missing_dimensions
                    .iter()
                    .map(|d| d.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            );
            println!("  Reasoning:    {}", plan.reasoning);

            for failure in &response.failures {
                println!(
                    "  Failed:       {} [{}] {}",
                    failure.dimension, failure.code, failure.message
                );
            }
            if response.fallback {
                println!("  Fell back to default semantic search");
            }

            if let Some(message) = &response.message {
                println!("\n{}", message);
                return Ok(());
            }

            println!();
            print_ranked(&response.ranked);
            println!("\n{}", response.context.text);
        }

        Commands::Keywords { query, limit } => {
            let limit = limit.unwrap_or(engine.config().search.max_keywords);
            let keywords = engine.keywords(&query);
            if keywords.is_empty() {
                println!("No keywords extracted.");
            }
            for keyword in keywords.iter().take(limit) {
                println!("{:>8.3}  {}", keyword.weight, keyword.term);
            }
        }

        Commands::Stats => {
            let stats = engine.index_stats();
            println!("Lexical Index");
            println!("  Generation:          {}", stats.generation);
            println!("  Fingerprint:         {}", stats.fingerprint);
            println!("  Documents:           {}", stats.documents);
            println!("  Vocabulary:          {}", stats.vocabulary);
            println!("  Average length:      {:.1}", stats.average_length);
            println!("  Dialogue fragments:  {}", stats.dialogue_fragments);
        }
    }

    Ok(())
}

fn print_ranked(ranked: &[Candidate]) {
    for (i, candidate) in ranked.iter().enumerate() {
        let scores = &candidate.scores;
        println!(
            "{}. {} ({}) score={:.3} [semantic {:.3}, bm25 {:.3}, exact {:.3}]",
            i + 1,
            candidate.id(),
            candidate.fragment.display_source(),
            scores.final_score,
            scores.semantic,
            scores.lexical_normalized,
            scores.exact.unwrap_or(0.0)
        );
    }
}
