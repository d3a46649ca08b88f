//! Application state wiring the research service to its infrastructure.
//!
//! The service is generic over the checkpoint repository; AppState pins it to
//! SQLite and the offline collaborators.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;

use scholarflow_core::service::research::ResearchService;
use scholarflow_core::workflow::engine::Engine;
use scholarflow_infra::config::resolve_corpus_path;
use scholarflow_infra::local::{LocalCorpusSearch, offline_collaborators};
use scholarflow_infra::sqlite::checkpoint::SqliteCheckpointRepository;
use scholarflow_infra::sqlite::pool::{DatabasePool, database_url};
use scholarflow_types::config::GlobalConfig;

/// Concrete service type pinned to the SQLite checkpoint store.
pub type ConcreteResearchService = ResearchService<SqliteCheckpointRepository>;

/// Shared application state used by every CLI command.
#[derive(Clone)]
pub struct AppState {
    pub research: Arc<ConcreteResearchService>,
    pub data_dir: PathBuf,
    pub config: GlobalConfig,
}

impl AppState {
    /// Connect to the database, load the corpus, and wire the engine.
    pub async fn init(data_dir: PathBuf, config: GlobalConfig) -> anyhow::Result<Self> {
        tokio::fs::create_dir_all(&data_dir)
            .await
            .with_context(|| format!("Failed to create data directory {}", data_dir.display()))?;

        let db_pool = DatabasePool::new(&database_url(&data_dir))
            .await
            .context("Failed to open checkpoint database")?;

        let corpus_path = resolve_corpus_path(&config, &data_dir);
        let corpus = LocalCorpusSearch::load(&corpus_path).await?;
        let documents_dir = corpus_path
            .parent()
            .map_or_else(|| data_dir.clone(), |p| p.to_path_buf());

        tracing::info!(
            data_dir = %data_dir.display(),
            corpus = %corpus_path.display(),
            papers = corpus.len(),
            "application state initialized"
        );

        let engine = Engine::new(
            SqliteCheckpointRepository::new(db_pool),
            offline_collaborators(corpus, documents_dir),
        )?;
        let research = ResearchService::new(Arc::new(engine), config.workflow.clone());

        Ok(Self {
            research: Arc::new(research),
            data_dir,
            config,
        })
    }
}
