//! codescout command-line front-end
//!
//! Thin binary over the library: loads settings, builds the provider
//! container and engine, and exposes `index`, `search`, and `watch`
//! subcommands. Error kinds map to the documented process exit codes.

use std::path::PathBuf;
use std::str::FromStr;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use codescout::application::context::ContextServiceInterface;
use codescout::domain::types::{Language, QueryIntent};
use codescout::infrastructure::config::Settings;
use codescout::infrastructure::di::modules::build_engine;
use codescout::infrastructure::di::ContainerBuilder;
use codescout::{Error, Result};

#[derive(Parser)]
#[command(name = "codescout", version, about = "Semantic code search")]
struct Cli {
    /// Configuration file (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Project root, overriding the configured one
    #[arg(short, long, global = true)]
    project: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Index the project into the vector store
    Index,
    /// Search the indexed project
    Search {
        /// Query text
        query: Vec<String>,
        /// Ranking hint: discovery, debugging, modification,
        /// documentation, comprehension
        #[arg(long)]
        intent: Option<String>,
        /// Restrict results to these languages
        #[arg(long = "language")]
        languages: Vec<String>,
        /// Result budget in estimated tokens
        #[arg(long)]
        token_limit: Option<usize>,
    },
    /// Watch the project and index changes incrementally
    Watch,
}

fn init_tracing() -> anyhow::Result<()> {
    use tracing_subscriber::EnvFilter;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| anyhow::anyhow!("failed to initialize tracing: {err}"))
}

#[tokio::main]
async fn main() {
    if let Err(err) = init_tracing() {
        eprintln!("{err}");
        std::process::exit(1);
    }
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => {}
        Err(err) => {
            eprintln!("error: {err}");
            for suggestion in err.suggestions() {
                eprintln!("  hint: {suggestion}");
            }
            std::process::exit(err.exit_code());
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut settings = Settings::load(cli.config.as_deref())?;
    if let Some(project) = cli.project {
        settings.project_root = project;
    }

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("shutdown requested");
                cancel.cancel();
            }
        });
    }

    let container = ContainerBuilder::new(settings).build().await?;
    let parts = build_engine(&container, cancel.clone())?;

    let result = match cli.command {
        Command::Index => {
            let summary = parts.indexer.index_full().await?;
            println!("{summary}");
            Ok(())
        }
        Command::Search {
            query,
            intent,
            languages,
            token_limit,
        } => {
            let query_text = query.join(" ");
            if query_text.trim().is_empty() {
                return Err(Error::validation("query text must not be empty"));
            }
            let intent = intent
                .as_deref()
                .map(QueryIntent::from_str)
                .transpose()?;
            let focus_languages = if languages.is_empty() {
                None
            } else {
                Some(
                    languages
                        .iter()
                        .map(|name| Language::from_str(name))
                        .collect::<Result<Vec<_>>>()?,
                )
            };

            use shaku::HasComponent;
            let service: &dyn ContextServiceInterface = parts.module.resolve_ref();
            let response = service
                .find_code(&query_text, intent, focus_languages, token_limit)
                .await?;

            for warning in &response.warnings {
                eprintln!("warning: {warning}");
            }
            println!("{}", response.summary);
            for code_match in &response.matches {
                println!(
                    "\n{}:{}-{}  [{} {:.3}]",
                    code_match.file_path,
                    code_match.line_start,
                    code_match.line_end,
                    match code_match.match_kind {
                        codescout::MatchKind::Hybrid => "hybrid",
                        codescout::MatchKind::DenseOnly => "dense",
                        codescout::MatchKind::SparseOnly => "sparse",
                    },
                    code_match.scores.combined,
                );
                for line in code_match.content.lines().take(12) {
                    println!("    {line}");
                }
            }
            Ok(())
        }
        Command::Watch => {
            // Catch up before streaming changes; a degraded collection
            // triggers a full reindex here
            if let Some(summary) = parts.indexer.reconcile().await? {
                println!("{summary}");
            } else {
                let summary = parts.indexer.index_full().await?;
                println!("{summary}");
            }
            parts.indexer.backfill_missing_vectors().await?;
            tracing::info!("watching for changes (ctrl-c to stop)");
            parts.indexer.watch().await
        }
    };

    container.shutdown().await;
    result
}
