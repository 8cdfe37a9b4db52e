//! End-to-end wiring of one pipeline run.
//!
//! Config selects the backend and the catalog. Validation (agent roles,
//! dependencies, cycles) happens before any agent is invoked; dynamic
//! parameters are drawn once, then the engine runs the plan.

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::agent::{AgentRegistry, CompletionRequest, LanguageModel};
use crate::catalog::Catalog;
use crate::config::{BackendConfig, BackendKind, Config};
use crate::core::dag::ExecutionPlan;
use crate::core::transcript::{JsonSink, MarkdownFileSink};
use crate::error::{Error, Result};
use crate::orchestration::{ChatBackend, CommandBackend, EngineOptions, ExecutionEngine, RunReport};
use crate::random::RandomProvider;
use crate::{ilog, ilog_debug};

/// Build the configured language-model backend.
pub fn build_backend(
    config: &BackendConfig,
    timeout: Option<Duration>,
) -> Result<Arc<dyn LanguageModel>> {
    match config.kind {
        BackendKind::Chat => Ok(Arc::new(ChatBackend::from_config(config)?)),
        BackendKind::Command => {
            let mut backend = CommandBackend::from_config(config)?;
            if let Some(timeout) = timeout {
                backend = backend.with_timeout(timeout);
            }
            Ok(Arc::new(backend))
        }
    }
}

/// Backend for commands that never invoke agents.
struct OfflineModel;

#[async_trait]
impl LanguageModel for OfflineModel {
    fn name(&self) -> &str {
        "offline"
    }

    async fn complete(&self, _request: &CompletionRequest) -> Result<String> {
        Err(Error::Backend("agents are not invoked while planning".to_string()))
    }
}

/// Validate a catalog and build its plan without drawing random values
/// or contacting any backend. Dynamic parameters take their minimum.
pub fn preview_plan(catalog: &Catalog) -> Result<ExecutionPlan> {
    let table = catalog.table()?;
    table.validate_agents(&catalog.registry(Arc::new(OfflineModel)))?;
    ExecutionPlan::build(&table.finalize_with(|_, param| param.min))
}

pub struct Pipeline {
    config: Config,
    catalog: Catalog,
    backend: Arc<dyn LanguageModel>,
    random: RandomProvider,
}

impl Pipeline {
    pub fn new(
        config: Config,
        catalog: Catalog,
        backend: Arc<dyn LanguageModel>,
        random: RandomProvider,
    ) -> Self {
        Self {
            config,
            catalog,
            backend,
            random,
        }
    }

    pub fn from_config(config: Config) -> Result<Self> {
        let catalog = Catalog::load_or_builtin(config.catalog.as_deref())?;
        let backend = build_backend(&config.backend, config.task_timeout())?;
        let random = RandomProvider::from_config(&config.random);
        ilog_debug!(
            "Pipeline: backend={}, {} agents, {} tasks, random={}",
            backend.name(),
            catalog.agents.len(),
            catalog.tasks.len(),
            if random.has_remote() { "random.org" } else { "pseudo" }
        );
        Ok(Self::new(config, catalog, backend, random))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> AgentRegistry {
        self.catalog.registry(self.backend.clone())
    }

    pub fn transcript_dir(&self) -> PathBuf {
        self.config.transcript_dir()
    }

    /// Validate the catalog, draw dynamic parameters and build the plan.
    pub async fn prepare(&self) -> Result<(AgentRegistry, ExecutionPlan)> {
        let table = self.catalog.table()?;
        let registry = self.registry();
        table.validate_agents(&registry)?;
        let finalized = table.finalize(&self.random).await;
        let plan = ExecutionPlan::build(&finalized)?;
        ilog!(
            "Plan ready: {} tasks in {} waves",
            plan.len(),
            plan.waves().len()
        );
        Ok((registry, plan))
    }

    /// Engine with the Markdown report and JSON transcript sinks.
    pub fn engine(&self, registry: AgentRegistry) -> ExecutionEngine {
        let dir = self.transcript_dir();
        ExecutionEngine::new(registry)
            .with_options(EngineOptions {
                task_timeout: self.config.task_timeout(),
                max_parallel: self.config.max_parallel,
            })
            .with_sink(Box::new(MarkdownFileSink::new(dir.clone())))
            .with_sink(Box::new(JsonSink::new(dir)))
    }

    /// Run the pipeline once. Validation errors are returned before any
    /// agent is invoked; execution failures are carried in the report.
    pub async fn run(&self) -> Result<RunReport> {
        let (registry, plan) = self.prepare().await?;
        let mut engine = self.engine(registry);
        Ok(engine.run(plan).await)
    }
}
