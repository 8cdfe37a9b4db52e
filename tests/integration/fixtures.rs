//! Test fixtures for integration tests.
//!
//! Provides helpers for:
//! - A scripted language model that records every request
//! - Small catalogs with known wiring
//! - Pipelines writing their transcripts into a temporary directory

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tempfile::TempDir;

use ideagen::agent::{AgentPersona, CompletionRequest, LanguageModel};
use ideagen::catalog::Catalog;
use ideagen::config::Config;
use ideagen::core::task::TaskDefinition;
use ideagen::pipeline::Pipeline;
use ideagen::random::RandomProvider;
use ideagen::{Error, Result};

/// Language model answering by task description.
///
/// The first line of every prompt is the task description, so tests key
/// answers and failures on it.
#[derive(Default)]
pub struct ScriptedModel {
    answers: HashMap<String, String>,
    failures: HashSet<String>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn answer(mut self, description: &str, output: &str) -> Self {
        self.answers.insert(description.to_string(), output.to_string());
        self
    }

    pub fn fail_on(mut self, description: &str) -> Self {
        self.failures.insert(description.to_string());
        self
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// First prompt line of every request, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.requests()
            .iter()
            .map(|r| r.prompt.lines().next().unwrap_or_default().to_string())
            .collect()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        self.requests.lock().unwrap().push(request.clone());
        let head = request.prompt.lines().next().unwrap_or_default().to_string();
        if self.failures.contains(&head) {
            return Err(Error::Backend(format!("scripted failure for {}", head)));
        }
        Ok(self
            .answers
            .get(&head)
            .cloned()
            .unwrap_or_else(|| format!("output of {}", head)))
    }
}

pub fn persona(role: &str) -> AgentPersona {
    AgentPersona::new(role, &format!("{} goal", role), &format!("{} backstory", role))
}

/// A and B are independent; C depends on A and B.
pub fn abc_catalog() -> Catalog {
    Catalog {
        agents: [("researcher".to_string(), persona("User Researcher"))]
            .into_iter()
            .collect(),
        tasks: vec![
            TaskDefinition::new("A", "researcher", "Task A"),
            TaskDefinition::new("B", "researcher", "Task B"),
            TaskDefinition::new("C", "researcher", "Task C").depends_on(["A", "B"]),
        ],
    }
}

pub fn abc_model() -> ScriptedModel {
    ScriptedModel::new()
        .answer("Task A", "a")
        .answer("Task B", "b")
        .answer("Task C", "c")
}

/// A pipeline writing into its own temporary transcript directory.
pub struct TestPipeline {
    pub temp_dir: TempDir,
    pub pipeline: Pipeline,
    pub model: Arc<ScriptedModel>,
}

impl TestPipeline {
    pub fn new(catalog: Catalog, model: ScriptedModel) -> Self {
        Self::with_parallelism(catalog, model, 1)
    }

    pub fn with_parallelism(catalog: Catalog, model: ScriptedModel, max_parallel: usize) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let config = Config {
            transcript_dir: Some(temp_dir.path().join("logs").display().to_string()),
            max_parallel,
            ..Default::default()
        };
        let model = Arc::new(model);
        let pipeline = Pipeline::new(config, catalog, model.clone(), RandomProvider::pseudo());
        Self {
            temp_dir,
            pipeline,
            model,
        }
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.temp_dir.path().join("logs")
    }

    /// Files written into the transcript directory, sorted.
    pub fn written_files(&self) -> Vec<String> {
        let Ok(entries) = std::fs::read_dir(self.logs_dir()) else {
            return Vec::new();
        };
        let mut names: Vec<String> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().to_string())
            .collect();
        names.sort();
        names
    }
}
