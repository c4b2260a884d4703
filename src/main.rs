mod config;
mod embedding;
mod error;
mod index;
mod planner;
mod retriever;
mod toolkit;
mod tools;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use config::{ConfigManager, RoamerConfig};
use embedding::create_embedder;
use index::builder::IndexBuilder;
use index::{field_str, CollectionKind, Document};
use planner::{CandidatePlanner, PlanOutcome, Strategy};
use retriever::{ScoredDocument, SemanticRetriever};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use toolkit::{DestinationQuery, RetrievalToolkit};

// ============================================================================
// CLI Argument Parsing
// ============================================================================

#[derive(Parser)]
#[command(name = "roamer", version, about = "Roamer - semantic retrieval for travel planning")]
struct Cli {
    /// Output JSON instead of human-readable text
    #[arg(long, global = true)]
    json: bool,

    /// Config file (defaults to the platform config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Embed both document collections and write the vector indexes
    Build {
        /// JSON array of destination documents
        #[arg(long)]
        destinations: PathBuf,
        /// JSON array of experience documents
        #[arg(long)]
        experiences: PathBuf,
        /// Output directory (defaults to the configured index_dir)
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Show metadata of the persisted indexes
    Info,
    /// Search destinations by description, or fetch them by id
    Destinations {
        #[arg(long, conflicts_with = "ids")]
        query: Option<String>,
        /// Comma-separated destination ids
        #[arg(long, value_delimiter = ',')]
        ids: Option<Vec<String>>,
        #[arg(long)]
        top_k: Option<usize>,
    },
    /// Search experiences, optionally within one destination
    Experiences {
        #[arg(long)]
        query: String,
        #[arg(long)]
        destination: Option<String>,
        #[arg(long)]
        top_k: Option<usize>,
    },
    /// Plan candidates for a traveller profile, or report an anchor conflict
    Plan {
        /// Traveller profile (interests, pace, must-dos)
        #[arg(long)]
        profile: String,
        /// Defaults to bottom-up when the profile names an anchor event
        #[arg(long, value_enum)]
        strategy: Option<StrategyArg>,
        /// First-stage search text (defaults to the profile)
        #[arg(long)]
        query: Option<String>,
    },
    /// Run an agent tool with JSON arguments
    Tool {
        /// Tool name (destination_retriever, experience_retriever)
        name: String,
        /// Arguments as a JSON object
        #[arg(default_value = "{}")]
        arguments: String,
    },
    /// List the agent tool definitions
    Tools,
    /// Write a default config file
    InitConfig,
}

#[derive(Clone, Copy, ValueEnum)]
enum StrategyArg {
    TopDown,
    BottomUp,
}

/// JSON envelope for non-interactive output
fn json_output(success: bool, data: Value, error: Option<&str>) -> String {
    json!({
        "success": success,
        "data": data,
        "error": error,
    })
    .to_string()
}

#[tokio::main]
async fn main() -> Result<()> {
    // Check for --json flag before initializing logging
    let json_mode = std::env::args().any(|arg| arg == "--json");

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("roamer=info"));

    if json_mode {
        // Keep stdout for the JSON envelope
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_ansi(false)
            .with_writer(std::io::stderr)
            .compact()
            .init();
    } else if std::env::var("ROAMER_LOG_JSON").is_ok() {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .compact()
            .init();
    }

    let cli = Cli::parse();

    let config_manager = match cli.config {
        Some(path) => ConfigManager::from_path(path),
        None => ConfigManager::new(),
    };

    let result = match config_manager {
        Ok(config_manager) => run_command(cli.command, config_manager, cli.json).await,
        Err(e) => Err(e.into()),
    };

    if let Err(e) = result {
        if cli.json {
            println!("{}", json_output(false, Value::Null, Some(&format!("{:#}", e))));
        } else {
            eprintln!("Error: {:#}", e);
        }
        std::process::exit(1);
    }
    Ok(())
}

// ============================================================================
// Command Runner
// ============================================================================

async fn run_command(command: Commands, config_manager: ConfigManager, json_mode: bool) -> Result<()> {
    let config = config_manager.get().clone();

    match command {
        Commands::InitConfig => {
            config_manager.save()?;
            let path = config_manager.config_path().display().to_string();
            if json_mode {
                println!("{}", json_output(true, json!({ "config_path": path }), None));
            } else {
                println!("Config written to {}", path);
            }
        }
        Commands::Tools => {
            let definitions = tools::tool_definitions();
            if json_mode {
                println!("{}", json_output(true, serde_json::to_value(&definitions)?, None));
            } else {
                for tool in definitions {
                    println!("{}", tool.name);
                    println!("  {}", tool.description);
                }
            }
        }
        Commands::Build {
            destinations,
            experiences,
            out,
        } => {
            let index_dir = out.unwrap_or_else(|| config.index_dir.clone());
            let embedder = create_embedder(&config.embedding)?;
            let builder = IndexBuilder::new(embedder)
                .with_batch_size(config.embedding.batch_size)
                .with_fields(config.retrieval.embedded_fields.clone());

            let mut built = Vec::new();
            for (kind, source) in [
                (CollectionKind::Destination, &destinations),
                (CollectionKind::Experience, &experiences),
            ] {
                let (index, path) = builder
                    .build_and_save(kind, source, &index_dir)
                    .await
                    .with_context(|| format!("Failed to build {} index", kind))?;
                built.push(json!({
                    "kind": kind.as_str(),
                    "path": path.display().to_string(),
                    "documents": index.len(),
                    "dimension": index.dimension(),
                }));
            }

            if json_mode {
                println!("{}", json_output(true, Value::Array(built), None));
            } else {
                for entry in &built {
                    println!(
                        "Built {} index: {} documents, dimension {} -> {}",
                        entry["kind"].as_str().unwrap_or("?"),
                        entry["documents"],
                        entry["dimension"],
                        entry["path"].as_str().unwrap_or("?"),
                    );
                }
            }
        }
        Commands::Info => {
            let mut entries = Vec::new();
            for kind in CollectionKind::ALL {
                let path = config.index_dir.join(kind.file_name());
                let index = index::format::load(&path)?;
                entries.push(json!({
                    "path": path.display().to_string(),
                    "metadata": index.metadata(),
                }));
            }

            if json_mode {
                println!("{}", json_output(true, Value::Array(entries), None));
            } else {
                for entry in &entries {
                    let meta = &entry["metadata"];
                    println!("{}", entry["path"].as_str().unwrap_or("?"));
                    println!("  Type: {}", meta["index_type"].as_str().unwrap_or("?"));
                    println!("  Documents: {}", meta["num_documents"]);
                    println!("  Dimension: {}", meta["embedding_dimension"]);
                    println!("  Model: {}", meta["embedding_model"].as_str().unwrap_or("?"));
                    println!("  Fields: {}", meta["fields_embedded"]);
                    println!("  Built: {}", meta["built_at"].as_str().unwrap_or("?"));
                }
            }
        }
        Commands::Destinations { query, ids, top_k } => {
            let toolkit = open_toolkit(&config)?;
            match DestinationQuery::from_parts(query, ids, top_k.or(Some(toolkit.destination_top_k())))? {
                DestinationQuery::Semantic { query, top_k } => {
                    let hits = toolkit.search_destinations_scored(&query, top_k).await?;
                    print_scored(CollectionKind::Destination, &hits, json_mode)?;
                }
                lookup @ DestinationQuery::Lookup { .. } => {
                    let docs = toolkit.search_destinations(lookup).await?;
                    print_documents(CollectionKind::Destination, &docs, json_mode)?;
                }
            }
        }
        Commands::Experiences {
            query,
            destination,
            top_k,
        } => {
            let toolkit = open_toolkit(&config)?;
            let hits = toolkit
                .search_experiences_scored(&query, destination.as_deref(), top_k)
                .await?;
            print_scored(CollectionKind::Experience, &hits, json_mode)?;
        }
        Commands::Plan {
            profile,
            strategy,
            query,
        } => {
            let toolkit = open_toolkit(&config)?;
            let query = query.unwrap_or_else(|| profile.clone());
            let strategy = match strategy {
                Some(StrategyArg::TopDown) => Strategy::TopDown { query },
                Some(StrategyArg::BottomUp) => Strategy::BottomUp { query },
                None => match Strategy::auto(&profile) {
                    Strategy::TopDown { .. } => Strategy::TopDown { query },
                    Strategy::BottomUp { .. } => Strategy::BottomUp { query },
                },
            };
            let outcome = CandidatePlanner::new(&toolkit)
                .with_limits(config.planner)
                .plan(&strategy, &profile)
                .await?;

            if json_mode {
                println!("{}", json_output(true, serde_json::to_value(&outcome)?, None));
                return Ok(());
            }
            match outcome {
                PlanOutcome::Conflict(conflict) => {
                    println!("Conflict in {}: {}", conflict.destination_id, conflict.conflict_question);
                    println!("  Competing: {}", conflict.competing_experiences.join(", "));
                }
                PlanOutcome::Success(candidates) => {
                    println!("Strategy: {}", candidates.strategy);
                    for group in &candidates.destinations {
                        println!(
                            "{} ({})",
                            field_str(&group.destination, "destination_name").unwrap_or("?"),
                            field_str(&group.destination, "destination_id").unwrap_or("?"),
                        );
                        for exp in &group.experiences {
                            println!(
                                "  - {} ({}) [{}]",
                                field_str(exp, "experience_name").unwrap_or("?"),
                                field_str(exp, "experience_id").unwrap_or("?"),
                                field_str(exp, "itinerary_role").unwrap_or("Add-On"),
                            );
                        }
                    }
                }
            }
        }
        Commands::Tool { name, arguments } => {
            let arguments: Value =
                serde_json::from_str(&arguments).context("Tool arguments must be valid JSON")?;
            let toolkit = open_toolkit(&config)?;
            let output = tools::execute_tool(&toolkit, &name, arguments).await?;
            if json_mode {
                let data: Value = serde_json::from_str(&output)?;
                println!("{}", json_output(true, data, None));
            } else {
                println!("{}", output);
            }
        }
    }

    Ok(())
}

/// Embedder + loaded indexes, wired explicitly.
fn open_toolkit(config: &RoamerConfig) -> Result<RetrievalToolkit> {
    let embedder = create_embedder(&config.embedding)?;
    let retriever = SemanticRetriever::new(embedder);
    retriever
        .load_from_dir(&config.index_dir)
        .with_context(|| format!("Run 'roamer build' first to create indexes in {}", config.index_dir.display()))?;
    Ok(RetrievalToolkit::new(Arc::new(retriever)).with_config(&config.retrieval))
}

fn print_scored(kind: CollectionKind, hits: &[ScoredDocument], json_mode: bool) -> Result<()> {
    if json_mode {
        println!("{}", json_output(true, serde_json::to_value(hits)?, None));
        return Ok(());
    }
    if hits.is_empty() {
        println!("No matching {}s", kind);
    }
    for (rank, hit) in hits.iter().enumerate() {
        println!(
            "{}. {} ({}) score={:.3}",
            rank + 1,
            field_str(&hit.document, kind.name_field()).unwrap_or("?"),
            field_str(&hit.document, kind.id_field()).unwrap_or("?"),
            hit.score
        );
    }
    Ok(())
}

fn print_documents(kind: CollectionKind, docs: &[Document], json_mode: bool) -> Result<()> {
    if json_mode {
        println!("{}", json_output(true, serde_json::to_value(docs)?, None));
        return Ok(());
    }
    if docs.is_empty() {
        println!("No matching {}s", kind);
    }
    for doc in docs {
        println!(
            "{} ({})",
            field_str(doc, kind.name_field()).unwrap_or("?"),
            field_str(doc, kind.id_field()).unwrap_or("?"),
        );
    }
    Ok(())
}
