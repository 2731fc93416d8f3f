use clap::{Args, Parser, Subcommand};
use searchgen::{
    EntityType, IndexConfig, IndexDocument, IndexManager, IndexScope, SearchFilters, SearchIndex,
    Tree,
};
use serde::Serialize;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

#[derive(Parser)]
#[command(name = "searchgen", about = "Inspect and rebuild search index generations")]
struct Cli {
    #[arg(long, env = "SEARCHGEN_DATA_DIR", default_value = "./data", global = true)]
    data_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Clone)]
struct ScopeArgs {
    #[arg(long)]
    tenant: String,
    #[arg(long)]
    environment: String,
    /// quote or policy
    #[arg(long, value_parser = parse_entity_type)]
    entity: EntityType,
}

#[derive(Subcommand)]
enum Command {
    /// Print the newest generation of a tree
    Latest {
        #[command(flatten)]
        scope: ScopeArgs,
        #[arg(long)]
        regeneration: bool,
    },
    /// Print the state of a scope's two trees
    State {
        #[command(flatten)]
        scope: ScopeArgs,
    },
    /// Search the newest live generation and print a JSON page
    Search {
        #[command(flatten)]
        scope: ScopeArgs,
        /// Substring search term, repeatable
        #[arg(long = "term")]
        terms: Vec<String>,
        /// Status filter, repeatable; `expired` is derived from the expiry date
        #[arg(long = "status")]
        statuses: Vec<String>,
        #[arg(long)]
        full_text: Option<String>,
        #[arg(long)]
        include_test_data: bool,
        #[arg(long, default_value_t = 1)]
        page: usize,
        #[arg(long)]
        page_size: Option<usize>,
    },
    /// Apply write models from a JSON-lines file as incremental upserts
    Upsert {
        #[command(flatten)]
        scope: ScopeArgs,
        #[arg(long)]
        file: PathBuf,
    },
    /// Rebuild a scope from a JSON-lines file and promote the result
    Regenerate {
        #[command(flatten)]
        scope: ScopeArgs,
        #[arg(long)]
        file: PathBuf,
    },
}

fn parse_entity_type(s: &str) -> Result<EntityType, String> {
    EntityType::parse(s).map_err(|e| e.to_string())
}

fn read_models<D: IndexDocument>(path: &Path) -> CliResult<Vec<D>> {
    let reader = BufReader::new(std::fs::File::open(path)?);
    let mut models = Vec::new();
    for (n, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let model = serde_json::from_str(&line)
            .map_err(|e| format!("{}:{}: {}", path.display(), n + 1, e))?;
        models.push(model);
    }
    Ok(models)
}

fn print_json<T: Serialize>(value: &T) -> CliResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run<D: IndexDocument>(manager: &Arc<IndexManager<D>>, command: Command) -> CliResult<()> {
    match command {
        Command::Latest {
            scope,
            regeneration,
        } => {
            let scope = resolve(manager, &scope)?;
            let tree = if regeneration {
                Tree::Regeneration
            } else {
                Tree::Live
            };
            match manager.list_generations(tree, &scope)?.last() {
                Some(generation) => println!("{}", generation.name()),
                None => println!("none"),
            }
        }
        Command::State { scope } => {
            let scope = resolve(manager, &scope)?;
            print_json(&manager.scope_state(&scope)?)?;
        }
        Command::Search {
            scope,
            terms,
            statuses,
            full_text,
            include_test_data,
            page,
            page_size,
        } => {
            let scope = resolve(manager, &scope)?;
            let filters = SearchFilters {
                full_text,
                include_test_data,
                page,
                page_size,
                ..Default::default()
            }
            .with_search_terms(terms)
            .with_statuses(statuses);
            print_json(&manager.search(&scope, &filters)?)?;
        }
        Command::Upsert { scope, file } => {
            let scope = resolve(manager, &scope)?;
            let models: Vec<D> = read_models(&file)?;
            tracing::info!("Upserting {} documents into {}", models.len(), scope);
            print_json(&manager.upsert_sync(&scope, models).await?)?;
        }
        Command::Regenerate { scope, file } => {
            let scope = resolve(manager, &scope)?;
            let models: Vec<D> = read_models(&file)?;
            tracing::info!("Regenerating {} from {} documents", scope, models.len());
            let info = manager.regenerate_sync(&scope, Arc::new(models)).await?;
            print_json(&info)?;
            if !matches!(info.status, searchgen::RegenerationStatus::Completed { .. }) {
                return Err(format!("regeneration of {} did not complete", scope).into());
            }
        }
    }
    Ok(())
}

fn resolve<D: IndexDocument>(
    manager: &IndexManager<D>,
    args: &ScopeArgs,
) -> searchgen::Result<IndexScope> {
    manager.scope(&args.tenant, &args.environment)
}

fn entity_of(command: &Command) -> EntityType {
    match command {
        Command::Latest { scope, .. }
        | Command::State { scope }
        | Command::Search { scope, .. }
        | Command::Upsert { scope, .. }
        | Command::Regenerate { scope, .. } => scope.entity,
    }
}

#[tokio::main]
async fn main() -> CliResult<()> {
    // stdout carries the JSON output
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = IndexConfig {
        data_dir: cli.data_dir,
        ..IndexConfig::from_env()
    };
    let index = SearchIndex::new(config)?;

    let result = match entity_of(&cli.command) {
        EntityType::Quote => run(index.quotes(), cli.command).await,
        EntityType::Policy => run(index.policies(), cli.command).await,
    };
    index.graceful_shutdown().await;
    result
}
