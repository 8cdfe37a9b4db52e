//! Task definition table.
//!
//! The table is the closed set of task declarations for one pipeline. It is
//! filled with `define`, checked against the agent registry, then
//! finalized: dynamic parameters are drawn and substituted exactly once and
//! the result is handed to the graph builder.

use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;

use crate::agent::AgentRegistry;
use crate::core::task::{DynamicParam, TaskDefinition};
use crate::error::{Error, Result};
use crate::random::RandomProvider;
use crate::{ilog, ilog_debug};

static PLACEHOLDER_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("Invalid placeholder regex")
});

/// Declared tasks in declaration order.
#[derive(Debug, Clone, Default)]
pub struct TaskTable {
    definitions: Vec<TaskDefinition>,
    index: HashMap<String, usize>,
}

impl TaskTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_definitions<I>(definitions: I) -> Result<Self>
    where
        I: IntoIterator<Item = TaskDefinition>,
    {
        let mut table = Self::new();
        for definition in definitions {
            table.define(definition)?;
        }
        Ok(table)
    }

    pub fn define(&mut self, definition: TaskDefinition) -> Result<()> {
        if definition.name.trim().is_empty() {
            return Err(Error::Configuration("task name must not be empty".to_string()));
        }
        if self.index.contains_key(&definition.name) {
            return Err(Error::DuplicateTask(definition.name));
        }
        self.index
            .insert(definition.name.clone(), self.definitions.len());
        self.definitions.push(definition);
        Ok(())
    }

    pub fn resolve(&self, name: &str) -> Result<&TaskDefinition> {
        self.index
            .get(name)
            .map(|&i| &self.definitions[i])
            .ok_or_else(|| Error::UnknownTask(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TaskDefinition> {
        self.definitions.iter()
    }

    /// Every task must name a registered agent.
    pub fn validate_agents(&self, registry: &AgentRegistry) -> Result<()> {
        for definition in &self.definitions {
            if !registry.contains(&definition.agent_role) {
                return Err(Error::Configuration(format!(
                    "task '{}' is assigned to unknown agent role '{}'",
                    definition.name, definition.agent_role
                )));
            }
        }
        Ok(())
    }

    /// Draw every dynamic parameter from `random` and substitute it.
    pub async fn finalize(self, random: &RandomProvider) -> FinalizedTable {
        let mut drawn: HashMap<(String, String), i64> = HashMap::new();
        for definition in &self.definitions {
            for param in &definition.dynamic_params {
                let value = random.get_random_int(param.min, param.max).await;
                ilog_debug!(
                    "Dynamic param {}.{} = {} (range [{}, {}])",
                    definition.name,
                    param.name,
                    value,
                    param.min,
                    param.max
                );
                drawn.insert((definition.name.clone(), param.name.clone()), value);
            }
        }
        self.finalize_with(|definition, param| {
            drawn
                .get(&(definition.name.clone(), param.name.clone()))
                .copied()
                .unwrap_or(param.min)
        })
    }

    /// Finalize with values supplied by `value_of`.
    pub fn finalize_with<F>(self, mut value_of: F) -> FinalizedTable
    where
        F: FnMut(&TaskDefinition, &DynamicParam) -> i64,
    {
        let tasks: Vec<FinalizedTask> = self
            .definitions
            .into_iter()
            .map(|definition| {
                let params: Vec<(String, i64)> = definition
                    .dynamic_params
                    .iter()
                    .map(|p| (p.name.clone(), value_of(&definition, p)))
                    .collect();
                let description = render_description(&definition, &params);
                if !params.is_empty() {
                    ilog!(
                        "Task {} finalized with {}",
                        definition.name,
                        format_params(&params)
                    );
                }
                FinalizedTask {
                    definition,
                    description,
                    params,
                }
            })
            .collect();

        FinalizedTable {
            tasks,
            index: self.index,
        }
    }
}

fn format_params(params: &[(String, i64)]) -> String {
    params
        .iter()
        .map(|(name, value)| format!("{}={}", name, value))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Substitute `{name}` placeholders, append any parameter the template does
/// not mention, then append the expected output contract.
fn render_description(definition: &TaskDefinition, params: &[(String, i64)]) -> String {
    let template = &definition.description_template;
    let values: HashMap<&str, i64> = params.iter().map(|(n, v)| (n.as_str(), *v)).collect();

    let mut used: Vec<String> = Vec::new();
    let mut description = PLACEHOLDER_REGEX
        .replace_all(template, |caps: &regex::Captures| {
            let name = &caps[1];
            match values.get(name) {
                Some(value) => {
                    used.push(name.to_string());
                    value.to_string()
                }
                None => caps[0].to_string(),
            }
        })
        .trim_end()
        .to_string();

    let unplaced: Vec<(String, i64)> = params
        .iter()
        .filter(|(name, _)| !used.iter().any(|u| u == name))
        .cloned()
        .collect();
    if !unplaced.is_empty() {
        description.push_str(&format!(
            "\nUse these true random values: {}",
            format_params(&unplaced)
        ));
    }

    if let Some(expected) = &definition.expected_output {
        description.push_str(&format!("\n\nExpected output: {}", expected.trim()));
    }
    description
}

/// One task after dynamic-parameter substitution.
#[derive(Debug, Clone, PartialEq)]
pub struct FinalizedTask {
    pub definition: TaskDefinition,
    pub description: String,
    /// Drawn values in declaration order.
    pub params: Vec<(String, i64)>,
}

impl FinalizedTask {
    pub fn name(&self) -> &str {
        &self.definition.name
    }
}

/// A table whose descriptions are final. Input of the graph builder.
#[derive(Debug, Clone)]
pub struct FinalizedTable {
    tasks: Vec<FinalizedTask>,
    index: HashMap<String, usize>,
}

impl FinalizedTable {
    pub fn resolve(&self, name: &str) -> Result<&FinalizedTask> {
        self.index
            .get(name)
            .map(|&i| &self.tasks[i])
            .ok_or_else(|| Error::UnknownTask(name.to_string()))
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FinalizedTask> {
        self.tasks.iter()
    }
}
