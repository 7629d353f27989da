use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use cimscope::session::ExplorationSession;
use cimscope::store::cache::{load_or_parse, SnapshotCache};
use cimscope::store::GraphStore;
use cimscope::web::{HttpServer, ViewerState};
use cimscope::{graph, CompositeId, Config};
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "cimscope")]
#[command(version, about = "Explore the object graph of a CIM/CGMES model")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load the dataset, seed the configured entity and serve the viewer
    Serve,
    /// Print one entity and the size of its neighborhood
    Show {
        /// Source file holding the entity, e.g. EQ.xml
        file: String,
        local_id: String,
        /// Traversal depth (defaults to traversal.max_depth)
        #[arg(short, long)]
        depth: Option<usize>,
    },
    /// List loaded files and their prefixes
    Files,
    /// Delete the dataset's snapshot so the next run parses again
    ClearCache,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load()?;

    env_logger::Builder::from_env(
        env_logger::Env::default().filter_or("RUST_LOG", config.dataset.log_level.as_str()),
    )
    .init();

    match cli.command {
        Command::Serve => serve(config).await,
        Command::Show { file, local_id, depth } => {
            let store = load_store(&config).await?;
            show(&store, &config, &file, &local_id, depth)
        }
        Command::Files => {
            let store = load_store(&config).await?;
            for entry in store.registry().files() {
                println!("NSFILE_{}\t{}", entry.prefix, entry.filename);
            }
            Ok(())
        }
        Command::ClearCache => {
            let Some(dir) = &config.dataset.cache_dir else {
                println!("No cache_dir configured");
                return Ok(());
            };
            let name = config.dataset_name();
            if SnapshotCache::new(dir).clear(&name)? {
                println!("Removed snapshot for {}", name);
            } else {
                println!("No snapshot for {}", name);
            }
            Ok(())
        }
    }
}

/// Parsing a large model is blocking work; keep it off the runtime.
async fn load_store(config: &Config) -> Result<GraphStore> {
    let folder = config.folder().to_path_buf();
    let name = config.dataset_name();
    let cache = config.dataset.cache_dir.as_ref().map(SnapshotCache::new);
    let limits = config.query_limits();

    let store = tokio::task::spawn_blocking(move || load_or_parse(&folder, &name, cache.as_ref()))
        .await
        .context("Loader task failed")??;
    Ok(store.with_limits(limits))
}

/// Composite id of the entity `local_id` in `file`, or in any file.
fn resolve_entity(store: &GraphStore, file: Option<&str>, local_id: &str) -> Result<CompositeId> {
    let id = match file {
        Some(file) => {
            let entry = store
                .registry()
                .files()
                .iter()
                .find(|f| f.filename == file)
                .with_context(|| format!("File {} is not part of the dataset", file))?;
            CompositeId::new(entry.prefix.clone(), local_id)
        }
        None => store
            .resolve_local(local_id)
            .with_context(|| format!("No entity with id {}", local_id))?,
    };
    if !store.contains_entity(&id) {
        anyhow::bail!("No entity with id {}", id);
    }
    Ok(id)
}

fn show(store: &GraphStore, config: &Config, file: &str, local_id: &str, depth: Option<usize>) -> Result<()> {
    let id = resolve_entity(store, Some(file), local_id)?;
    let node = graph::project(&store.properties_of(&id), store.registry())?;
    println!("{}", node.title());
    print!("{}", node);

    let depth = depth.unwrap_or(config.traversal.max_depth);
    let max = config.traversal.max_nodes_one_way;
    let down = graph::descendants(store, &id, depth, max);
    let up = graph::ascendants(store, &id, depth, max);
    println!(
        "Descendants: {}{}",
        down.ids.len(),
        if down.truncated { " (truncated)" } else { "" }
    );
    println!(
        "Ascendants: {}{}",
        up.ids.len(),
        if up.truncated { " (truncated)" } else { "" }
    );
    Ok(())
}

async fn serve(config: Config) -> Result<()> {
    log::info!("Starting cimscope v{}", env!("CARGO_PKG_VERSION"));
    log::info!("Dataset: {}", config.folder().display());

    let store = Arc::new(load_store(&config).await?);
    let mut session = ExplorationSession::new(Arc::clone(&store), config.explore_settings());

    match config.dataset.seed_id.as_deref() {
        Some(seed_id) => {
            let seed = resolve_entity(&store, config.dataset.seed_file.as_deref(), seed_id)?;
            session.seed(&seed)?;
        }
        None => log::warn!("No dataset.seed_id configured; the view starts empty until a go-to"),
    }

    let viewer = ViewerState::new(session, config.click_window());
    let server = HttpServer::new(viewer, config.http_server.allowed_origins.clone());
    server.run(config.http_server.port).await?;

    Ok(())
}
