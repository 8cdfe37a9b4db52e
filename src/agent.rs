//! Role-bound agents and the registry that owns them.
//!
//! An `Agent` pairs a persona with the shared `LanguageModel` backend. The
//! registry is built once per run; building it never touches the network.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::core::task::TaskResult;
use crate::error::{Error, Result};
use crate::ilog_debug;

/// One prompt sent to the language model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionRequest {
    /// Persona framing.
    pub system: String,
    /// Task description followed by the upstream context.
    pub prompt: String,
}

/// The opaque agent-executor capability.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    fn name(&self) -> &str;

    async fn complete(&self, request: &CompletionRequest) -> Result<String>;
}

/// Behavioral description of an agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AgentPersona {
    pub role: String,
    pub goal: String,
    pub backstory: String,
}

impl AgentPersona {
    pub fn new(role: &str, goal: &str, backstory: &str) -> Self {
        Self {
            role: role.to_string(),
            goal: goal.to_string(),
            backstory: backstory.to_string(),
        }
    }
}

pub struct Agent {
    name: String,
    persona: AgentPersona,
    backend: Arc<dyn LanguageModel>,
}

impl Agent {
    pub fn new(name: &str, persona: AgentPersona, backend: Arc<dyn LanguageModel>) -> Self {
        Self {
            name: name.to_string(),
            persona,
            backend,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn persona(&self) -> &AgentPersona {
        &self.persona
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    pub fn system_prompt(&self) -> String {
        format!(
            "You are {}.\n{}\n\nYour personal goal is: {}",
            self.persona.role.trim(),
            self.persona.backstory.trim(),
            self.persona.goal.trim()
        )
    }

    /// Task description followed by each upstream output, labeled by task.
    pub fn render_prompt(description: &str, context: &[Arc<TaskResult>]) -> String {
        let mut prompt = description.trim().to_string();
        if !context.is_empty() {
            prompt.push_str("\n\nThis is the context you're working with:");
            for result in context {
                prompt.push_str(&format!(
                    "\n\n## {} ({})\n{}",
                    result.task_name,
                    result.agent_role,
                    result.output.trim()
                ));
            }
        }
        prompt
    }

    pub async fn invoke(&self, description: &str, context: &[Arc<TaskResult>]) -> Result<String> {
        let request = CompletionRequest {
            system: self.system_prompt(),
            prompt: Self::render_prompt(description, context),
        };
        ilog_debug!(
            "Agent {} invoking {} (prompt {} chars, {} context item(s))",
            self.name,
            self.backend.name(),
            request.prompt.len(),
            context.len()
        );
        self.backend.complete(&request).await
    }
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("name", &self.name)
            .field("role", &self.persona.role)
            .field("backend", &self.backend.name())
            .finish()
    }
}

/// Named agents sharing one backend.
#[derive(Debug, Default, Clone)]
pub struct AgentRegistry {
    agents: BTreeMap<String, Arc<Agent>>,
}

impl AgentRegistry {
    pub fn new<I>(personas: I, backend: Arc<dyn LanguageModel>) -> Self
    where
        I: IntoIterator<Item = (String, AgentPersona)>,
    {
        let agents = personas
            .into_iter()
            .map(|(name, persona)| {
                let agent = Arc::new(Agent::new(&name, persona, backend.clone()));
                (name, agent)
            })
            .collect();
        Self { agents }
    }

    pub fn get_agent(&self, role_name: &str) -> Result<Arc<Agent>> {
        self.agents.get(role_name).cloned().ok_or_else(|| {
            Error::Configuration(format!("no persona defined for agent role '{}'", role_name))
        })
    }

    pub fn contains(&self, role_name: &str) -> bool {
        self.agents.contains_key(role_name)
    }

    /// Registered role names, sorted.
    pub fn roles(&self) -> Vec<&str> {
        self.agents.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}
