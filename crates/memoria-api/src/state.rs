//! Application state wiring all services together.
//!
//! AppState holds the concrete service instances used by both CLI and REST API.
//! Core services are generic over repository and collaborator traits; AppState
//! pins them to the SQLite and HTTP implementations from memoria-infra.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use memoria_core::durable::DurableRuntime;
use memoria_core::durable::retry::RuntimePolicy;
use memoria_core::extraction::dispatcher::BatchDispatcher;
use memoria_core::extraction::scheduler::RuntimeScheduler;
use memoria_core::extraction::service::ExtractionService;
use memoria_infra::config::{load_global_config, resolve_data_dir};
use memoria_infra::http::extractor::HttpTopicExtractor;
use memoria_infra::http::persona::HttpPersonaTrigger;
use memoria_infra::sqlite::checkpoint::SqliteCheckpointRepository;
use memoria_infra::sqlite::pool::DatabasePool;
use memoria_infra::sqlite::task::SqliteTaskRepository;
use memoria_infra::sqlite::topic::SqliteTopicRepository;
use memoria_types::config::GlobalConfig;

/// Concrete type aliases for the generics pinned to infra implementations.
pub type ConcreteRuntime = DurableRuntime<SqliteCheckpointRepository>;

pub type ConcreteDispatcher =
    BatchDispatcher<SqliteTaskRepository, HttpTopicExtractor, HttpPersonaTrigger>;

pub type ConcreteExtractionService = ExtractionService<
    SqliteTaskRepository,
    SqliteTopicRepository,
    RuntimeScheduler<SqliteCheckpointRepository, ConcreteDispatcher>,
>;

/// Shared application state.
///
/// Used by both CLI commands and REST API handlers.
#[derive(Clone)]
pub struct AppState {
    pub extraction_service: Arc<ConcreteExtractionService>,
    pub dispatcher: Arc<ConcreteDispatcher>,
    pub runtime: ConcreteRuntime,
    pub topic_repo: Arc<SqliteTopicRepository>,
    pub config: Arc<GlobalConfig>,
    pub data_dir: PathBuf,
}

impl AppState {
    /// Initialize from the resolved data directory and its `config.toml`.
    pub async fn init() -> anyhow::Result<Self> {
        let data_dir = resolve_data_dir();
        let config = load_global_config(&data_dir).await;
        Self::init_at(&data_dir, config).await
    }

    /// Connect to `{data_dir}/memoria.db` and wire the services.
    pub async fn init_at(data_dir: &Path, config: GlobalConfig) -> anyhow::Result<Self> {
        tokio::fs::create_dir_all(data_dir).await?;

        let db_pool = DatabasePool::open(data_dir).await?;

        let ledger = Arc::new(SqliteTaskRepository::new(db_pool.clone()));
        let topic_repo = Arc::new(SqliteTopicRepository::new(db_pool.clone()));

        let runtime = DurableRuntime::new(
            SqliteCheckpointRepository::new(db_pool),
            RuntimePolicy::from_config(&config.extraction),
        );

        let dispatcher = Arc::new(BatchDispatcher::new(
            Arc::clone(&ledger),
            Arc::new(HttpTopicExtractor::new(&config.extractor)),
            Arc::new(HttpPersonaTrigger::new(&config.persona)),
            &config.extraction,
        ));

        let scheduler = RuntimeScheduler::new(runtime.clone(), Arc::clone(&dispatcher));
        let extraction_service =
            ExtractionService::new(ledger, Arc::clone(&topic_repo), scheduler, &config);

        Ok(Self {
            extraction_service: Arc::new(extraction_service),
            dispatcher,
            runtime,
            topic_repo,
            config: Arc::new(config),
            data_dir: data_dir.to_path_buf(),
        })
    }

    /// Re-spawn dispatches interrupted by a previous shutdown or crash.
    pub async fn resume_interrupted(&self) -> anyhow::Result<usize> {
        let resumed = self
            .runtime
            .resume_incomplete(Arc::clone(&self.dispatcher))
            .await?;
        if resumed > 0 {
            tracing::info!(resumed, "resumed interrupted extraction dispatches");
        }
        Ok(resumed)
    }
}
