use hybrid_rag::cli::{Cli, CollectionAction, Commands, ConfigAction};
use hybrid_rag::config::{Config, ConfigValidator};
use anyhow::{Context, Result};
use hybrid_rag::pipeline::{load_document, RagPipeline};
use hybrid_rag::retrieval::{Document, MetadataFilter};
use std::path::PathBuf;

fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse_args();

    // Initialize logging
    init_logging(cli.verbose);

    // Handle commands
    match cli.command {
        Commands::Collection { action } => {
            cmd_collection(cli.config, action)?;
        }
        Commands::Ingest { file } => {
            cmd_ingest(cli.config, &file)?;
        }
        Commands::Search {
            query,
            section,
            filters,
            limit,
            separate,
            json,
        } => {
            let filter = match section {
                Some(section) => MetadataFilter::section(section),
                None => filters.into_iter().collect(),
            };
            cmd_search(cli.config, &query, filter, limit, separate, json)?;
        }
        Commands::Config { action } => {
            cmd_config(cli.config, action)?;
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default = if verbose {
        "hybrid_rag=debug"
    } else {
        "hybrid_rag=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn cmd_collection(config_path: Option<PathBuf>, action: CollectionAction) -> Result<()> {
    let pipeline = open_pipeline(load_config(config_path)?)?;
    let name = pipeline.config().collection.name.clone();

    match action {
        CollectionAction::Recreate => {
            let dimension = pipeline
                .recreate_for_model()
                .with_context(|| format!("Failed to recreate collection {}", name))?;
            println!(
                "✓ Recreated collection {} ({}D, model {})",
                name,
                dimension,
                pipeline.dense_model()
            );
        }
        CollectionAction::Status => match pipeline.collection_info()? {
            Some(info) => {
                println!("Collection: {}", info.name);
                println!("  Records:      {}", info.points_count);
                println!(
                    "  Dense vector: {} ({}D, {:?})",
                    info.schema.dense.name, info.schema.dense.size, info.schema.dense.distance
                );
                println!(
                    "  Sparse vector: {} ({:?})",
                    info.schema.sparse.name, info.schema.sparse.modifier
                );
                println!("  Indexed fields: {}", info.schema.payload_indexes.join(", "));
                println!("  Created: {}", info.created_at.format("%Y-%m-%d %H:%M:%S"));
            }
            None => {
                println!("Collection {} does not exist", name);
                println!("Run 'hybrid-rag collection recreate' to create it");
            }
        },
        CollectionAction::Delete => {
            pipeline
                .delete_collection()
                .with_context(|| format!("Failed to drop collection {}", name))?;
            println!("✓ Dropped collection {}", name);
        }
    }

    Ok(())
}

fn cmd_ingest(config_path: Option<PathBuf>, file: &std::path::Path) -> Result<()> {
    let pipeline = open_pipeline(load_config(config_path)?)?;

    let text = load_document(file)?;
    let chunks = pipeline.chunk(&text);
    tracing::info!("Split {} into {} chunk(s)", file.display(), chunks.len());

    let written = pipeline
        .insert(&chunks)
        .with_context(|| format!("Failed to insert chunks from {}", file.display()))?;
    println!(
        "✓ Inserted {} chunk(s) from {} into {}",
        written,
        file.display(),
        pipeline.config().collection.name
    );

    Ok(())
}

fn cmd_search(
    config_path: Option<PathBuf>,
    query: &str,
    filter: MetadataFilter,
    limit: Option<usize>,
    separate: bool,
    json: bool,
) -> Result<()> {
    let mut config = load_config(config_path)?;
    if let Some(limit) = limit {
        config.search.limit = limit;
    }
    let pipeline = open_pipeline(config)?;
    let filter = (!filter.is_empty()).then_some(&filter);

    if separate {
        let results = pipeline
            .search_separately(query, filter)
            .context("Separate dense/sparse search failed")?;
        let contents = results.all_unique_contents();

        if json {
            print_json(&contents)?;
        } else {
            println!(
                "{} unique result(s) from {} hit(s)",
                contents.len(),
                results.total_hits()
            );
            for (rank, content) in contents.iter().enumerate() {
                println!("\n[{}]\n{}", rank + 1, content);
            }
        }
        return Ok(());
    }

    let documents = pipeline
        .search(query, filter)
        .context("Hybrid search failed")?;

    if json {
        print_json(&documents)?;
    } else if documents.is_empty() {
        println!("No results");
    } else {
        for (rank, doc) in documents.iter().enumerate() {
            print_document(rank + 1, doc);
        }
    }

    Ok(())
}

fn print_document(rank: usize, doc: &Document) {
    let headings: Vec<&str> = doc.metadata.iter().map(|(_, title)| title).collect();
    println!("\n[{}] score {:.4}  chunk #{}", rank, doc.score, doc.chunk_index);
    if !headings.is_empty() {
        println!("    {}", headings.join(" > "));
    }
    println!("{}", doc.content);
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize results")?;
    println!("{}", json);
    Ok(())
}

fn cmd_config(config_path: Option<PathBuf>, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = load_config(config_path)?;
            let toml = toml::to_string_pretty(&config).context("Failed to render configuration")?;
            println!("{}", toml);
        }
        ConfigAction::Validate { file } => {
            let path = match file.or(config_path) {
                Some(path) => path,
                None => Config::default_path()?,
            };
            let config = Config::load(&path)
                .with_context(|| format!("Invalid configuration at {}", path.display()))?;
            println!("✓ Configuration is valid");
            println!("  Schema version: {}", config.meta.schema_version);
        }
        ConfigAction::Init { force } => {
            let path = match config_path {
                Some(path) => path,
                None => Config::default_path()?,
            };

            if path.exists() && !force {
                println!("Configuration file already exists at: {}", path.display());
                println!("Use --force to overwrite");
                return Ok(());
            }

            Config::default().save(&path)?;
            println!("✓ Configuration initialized at: {}", path.display());
        }
    }

    Ok(())
}

fn open_pipeline(config: Config) -> Result<RagPipeline> {
    let store = config.store.path.clone();
    RagPipeline::open(config).with_context(|| format!("Failed to open store {}", store.display()))
}

fn load_config(config_path: Option<PathBuf>) -> Result<Config> {
    let path = match config_path {
        Some(path) => path,
        None => Config::default_path()?,
    };

    if !path.exists() {
        tracing::warn!(
            "Config file not found, using defaults. Run 'hybrid-rag config init' to create one."
        );
        let mut config = Config::default();
        config.apply_env_overrides();
        ConfigValidator::validate(&config)?;
        return Ok(config);
    }

    Ok(Config::load(&path)?)
}
