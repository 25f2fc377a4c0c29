use lakihaku::cli::{Cli, Commands, ConfigAction};
use lakihaku::config::{Config, ConfigValidator, RetrievalConfig};
use lakihaku::embedding::{EmbeddingProvider, FastEmbedProvider};
use lakihaku::error::{LakihakuError, Result};
use lakihaku::index::{load_corpus, IndexBuilder, IndexedCorpus};
use lakihaku::query::{FilterSet, HeuristicRewriter};
use lakihaku::retrieval::{
    CandidateSource, CaseLookupSource, FractionalPrefixStrategy, LexicalSource, MetadataSource,
    PrefixLexicalSource, RetrievalPipeline, RetrievalRun, VectorSource,
};
use std::path::PathBuf;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse_args();

    // Initialize logging
    init_logging(cli.verbose);

    // Handle commands
    match cli.command {
        Commands::Query {
            query,
            corpus,
            year_min,
            year_max,
            court,
            domain,
            tenant,
            profile,
            json,
        } => {
            let mut filters = FilterSet::new().with_years(year_min, year_max);
            for c in court {
                filters = filters.with_court(c);
            }
            for d in domain {
                filters = filters.with_domain(d);
            }
            if let Some(tenant) = tenant {
                filters = filters.with_tenant(tenant);
            }

            cmd_query(cli.config, profile, &query, &corpus, filters, json).await?;
        }
        Commands::Config { action } => {
            cmd_config(cli.config, action)?;
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default = if verbose { "lakihaku=debug" } else { "lakihaku=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn cmd_query(
    config_path: Option<PathBuf>,
    profile: Option<String>,
    query: &str,
    corpus_path: &std::path::Path,
    filters: FilterSet,
    json: bool,
) -> Result<()> {
    let config = load_config(config_path, profile)?;

    let documents = load_corpus(corpus_path)?;
    let embedder: Arc<dyn EmbeddingProvider> =
        Arc::new(FastEmbedProvider::new(&config.embedding.model)?);
    if embedder.dimension() != config.embedding.dimension {
        tracing::warn!(
            "Configured dimension {} differs from model dimension {}; using the model's",
            config.embedding.dimension,
            embedder.dimension()
        );
    }

    // Index construction is CPU-bound
    let builder = IndexBuilder::new(
        embedder.clone(),
        config.indexing.clone(),
        config.embedding.batch_size,
    );
    let indexed = tokio::task::spawn_blocking(move || builder.build(&documents))
        .await
        .map_err(|e| LakihakuError::Other(e.into()))??;

    let pipeline = RetrievalPipeline::new(
        build_sources(&indexed, embedder, &config.retrieval),
        Arc::new(HeuristicRewriter::new()),
        config.retrieval.clone(),
    )?;

    let filters = filters.with_years_from_text(query);
    let run = pipeline.retrieve_text(query, &filters).await?;

    if json {
        let out = serde_json::to_string_pretty(&run).map_err(|e| LakihakuError::Json {
            source: e,
            context: "Failed to serialize retrieval run".to_string(),
        })?;
        println!("{}", out);
    } else {
        print_run(&run);
    }

    Ok(())
}

fn build_sources(
    indexed: &IndexedCorpus,
    embedder: Arc<dyn EmbeddingProvider>,
    config: &RetrievalConfig,
) -> Vec<Arc<dyn CandidateSource>> {
    let strategy = Arc::new(FractionalPrefixStrategy::new(
        config.prefix_fractions.clone(),
        config.prefix_min_term_chars,
    ));

    let mut sources: Vec<Arc<dyn CandidateSource>> = vec![
        Arc::new(VectorSource::new(
            embedder,
            indexed.vectors.clone(),
            config.match_threshold,
        )),
        Arc::new(LexicalSource::new(indexed.sections.clone())),
        Arc::new(PrefixLexicalSource::new(indexed.sections.clone(), strategy)),
        Arc::new(MetadataSource::new(indexed.metadata.clone())),
    ];

    if config.case_lookup {
        sources.push(Arc::new(CaseLookupSource::new(indexed.sections.clone())));
    }

    sources
}

fn print_run(run: &RetrievalRun) {
    if run.is_empty() {
        println!("No results found.");
    }

    for (i, candidate) in run.candidates.iter().enumerate() {
        let payload = &candidate.payload;
        let year = payload.year.map(|y| y.to_string()).unwrap_or_default();
        println!(
            "{:>2}. [{:.4}] {} {} {}",
            i + 1,
            candidate.score,
            payload.case_id.as_deref().unwrap_or(&candidate.document_id),
            payload.court.as_deref().unwrap_or(""),
            year
        );
        if let Some(title) = &payload.section_title {
            println!("    {}", title);
        }
        let excerpt: String = payload.text.chars().take(200).collect();
        println!("    {}", excerpt.replace('\n', " "));
    }

    println!();
    println!(
        "run {} | {:?} after {} attempt(s) | sources: {}",
        run.run_id,
        run.termination,
        run.attempt_count(),
        run.sources_consulted
            .iter()
            .map(|s| s.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );
    if !run.degraded_sources.is_empty() {
        println!(
            "degraded: {}",
            run.degraded_sources
                .iter()
                .map(|s| s.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );
    }
}

fn cmd_config(config_path: Option<PathBuf>, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show { section } => {
            let config = load_config(config_path, None)?;
            let value = match section.as_deref() {
                Some("embedding") => serde_json::to_value(&config.embedding),
                Some("indexing") => serde_json::to_value(&config.indexing),
                Some("retrieval") => serde_json::to_value(&config.retrieval),
                Some("profiles") => serde_json::to_value(&config.profiles),
                _ => serde_json::to_value(&config),
            }
            .map_err(|e| LakihakuError::Json {
                source: e,
                context: "Failed to serialize config".to_string(),
            })?;

            let json = serde_json::to_string_pretty(&value).map_err(|e| LakihakuError::Json {
                source: e,
                context: "Failed to serialize config".to_string(),
            })?;
            println!("{}", json);
        }
        ConfigAction::Validate { file } => {
            let path = match file.or(config_path) {
                Some(path) => path,
                None => Config::default_path()?,
            };
            let config = Config::load(&path)?;
            ConfigValidator::validate(&config)?;
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
        ConfigAction::Path => {
            let path = match config_path {
                Some(path) => path,
                None => Config::default_path()?,
            };
            println!("{}", path.display());
        }
    }

    Ok(())
}

fn load_config(config_path: Option<PathBuf>, profile: Option<String>) -> Result<Config> {
    let path = match config_path {
        Some(path) => path,
        None => Config::default_path()?,
    };

    if !path.exists() {
        tracing::warn!(
            "Config file not found, using defaults. Run 'lakihaku config init' to create one."
        );
        let mut config = Config::default();
        config.apply_env_overrides();
        if let Some(profile) = profile {
            config.apply_profile(&profile)?;
        }
        ConfigValidator::validate(&config)?;
        return Ok(config);
    }

    if let Some(profile) = profile {
        Config::load_with_profile(&path, &profile)
    } else {
        Config::load(&path)
    }
}
