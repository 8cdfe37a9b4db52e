//! Task data model for the pipeline.
//!
//! A `TaskDefinition` is the static declaration loaded from the catalog.
//! A `TaskNode` is its runtime counterpart inside an `ExecutionPlan`, and a
//! `TaskResult` is the immutable output an agent produced for it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Role a task plays in its phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    /// One independent candidate output for a phase.
    Proposition,
    /// Evaluates several propositions against each other.
    Comparison,
    /// Merges evaluated outputs into the phase-final result.
    Synthesis,
    #[default]
    Standalone,
}

impl TaskKind {
    /// Infer the kind from the conventional name segments
    /// (`*_proposition_*`, `*_comparison`, `*_synthesis`).
    pub fn infer(name: &str) -> Self {
        let name = name.to_ascii_lowercase();
        if name.contains("_proposition") {
            TaskKind::Proposition
        } else if name.ends_with("_comparison") {
            TaskKind::Comparison
        } else if name.ends_with("_synthesis") {
            TaskKind::Synthesis
        } else {
            TaskKind::Standalone
        }
    }
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskKind::Proposition => write!(f, "proposition"),
            TaskKind::Comparison => write!(f, "comparison"),
            TaskKind::Synthesis => write!(f, "synthesis"),
            TaskKind::Standalone => write!(f, "standalone"),
        }
    }
}

/// A value drawn from the random service when the table is finalized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DynamicParam {
    /// Placeholder name; `{name}` in the template is replaced by the value.
    pub name: String,
    pub min: i64,
    pub max: i64,
}

impl DynamicParam {
    pub fn new(name: &str, min: i64, max: i64) -> Self {
        Self {
            name: name.to_string(),
            min,
            max,
        }
    }

    pub fn placeholder(&self) -> String {
        format!("{{{}}}", self.name)
    }
}

/// Static declaration of one pipeline task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TaskDefinition {
    /// Unique key within the table.
    pub name: String,
    #[serde(rename = "description")]
    pub description_template: String,
    /// Registry key of the agent that runs this task.
    #[serde(rename = "agent")]
    pub agent_role: String,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub dynamic_params: Vec<DynamicParam>,
    pub expected_output: Option<String>,
    pub kind: Option<TaskKind>,
}

impl TaskDefinition {
    pub fn new(name: &str, agent_role: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            description_template: description.to_string(),
            agent_role: agent_role.to_string(),
            depends_on: Vec::new(),
            dynamic_params: Vec::new(),
            expected_output: None,
            kind: None,
        }
    }

    pub fn depends_on<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on = deps.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_param(mut self, name: &str, min: i64, max: i64) -> Self {
        self.dynamic_params.push(DynamicParam::new(name, min, max));
        self
    }

    pub fn expecting(mut self, expected_output: &str) -> Self {
        self.expected_output = Some(expected_output.to_string());
        self
    }

    /// Declared kind, or the kind inferred from the name.
    pub fn kind(&self) -> TaskKind {
        self.kind.unwrap_or_else(|| TaskKind::infer(&self.name))
    }
}

/// Output an agent produced for one task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskResult {
    pub task_name: String,
    pub agent_role: String,
    pub output: String,
}

impl TaskResult {
    pub fn new(task_name: &str, agent_role: &str, output: impl Into<String>) -> Self {
        Self {
            task_name: task_name.to_string(),
            agent_role: agent_role.to_string(),
            output: output.into(),
        }
    }
}

/// Runtime status of a task node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum TaskStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed {
        error: String,
    },
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Pending => write!(f, "pending"),
            TaskStatus::Running => write!(f, "running"),
            TaskStatus::Completed => write!(f, "completed"),
            TaskStatus::Failed { error } => write!(f, "failed: {}", error),
        }
    }
}

/// Runtime node of an execution plan.
#[derive(Debug, Clone)]
pub struct TaskNode {
    pub definition: TaskDefinition,
    /// Description after dynamic-parameter substitution.
    pub description: String,
    /// Results of `definition.depends_on`, in declared order.
    pub resolved_context: Vec<Arc<TaskResult>>,
    pub result: Option<Arc<TaskResult>>,
    pub status: TaskStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl TaskNode {
    pub fn new(definition: TaskDefinition, description: String) -> Self {
        Self {
            definition,
            description,
            resolved_context: Vec::new(),
            result: None,
            status: TaskStatus::Pending,
            started_at: None,
            completed_at: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.definition.name
    }

    pub fn agent_role(&self) -> &str {
        &self.definition.agent_role
    }

    pub fn depends_on(&self) -> &[String] {
        &self.definition.depends_on
    }

    pub fn start(&mut self, context: Vec<Arc<TaskResult>>) {
        self.resolved_context = context;
        self.status = TaskStatus::Running;
        self.started_at = Some(Utc::now());
    }

    /// Record the result. Returns false if a result was already set.
    pub fn complete(&mut self, result: Arc<TaskResult>) -> bool {
        if self.result.is_some() {
            return false;
        }
        self.result = Some(result);
        self.status = TaskStatus::Completed;
        self.completed_at = Some(Utc::now());
        true
    }

    pub fn fail(&mut self, error: &str) {
        self.status = TaskStatus::Failed {
            error: error.to_string(),
        };
        self.completed_at = Some(Utc::now());
    }

    pub fn is_finished(&self) -> bool {
        matches!(
            self.status,
            TaskStatus::Completed | TaskStatus::Failed { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_inference() {
        assert_eq!(
            TaskKind::infer("tobe_scenario_map_proposition_c"),
            TaskKind::Proposition
        );
        assert_eq!(
            TaskKind::infer("writing_hills_comparison"),
            TaskKind::Comparison
        );
        assert_eq!(TaskKind::infer("empathy_map_synthesis"), TaskKind::Synthesis);
        assert_eq!(
            TaskKind::infer("initialization_challenge"),
            TaskKind::Standalone
        );
    }

    #[test]
    fn test_explicit_kind_wins() {
        let mut def = TaskDefinition::new("final_solution_overview", "pm", "Summarize");
        assert_eq!(def.kind(), TaskKind::Standalone);
        def.kind = Some(TaskKind::Synthesis);
        assert_eq!(def.kind(), TaskKind::Synthesis);
    }

    #[test]
    fn test_builder_helpers() {
        let def = TaskDefinition::new("persona", "researcher", "Create a persona")
            .depends_on(["a", "b"])
            .with_param("age", 18, 60)
            .expecting("A persona card");
        assert_eq!(def.depends_on, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(def.dynamic_params[0].placeholder(), "{age}");
        assert_eq!(def.expected_output.as_deref(), Some("A persona card"));
    }

    #[test]
    fn test_definition_from_toml() {
        let def: TaskDefinition = toml::from_str(
            r#"
            name = "empathy_map_comparison"
            agent = "data_analyst"
            description = "Compare interview and observation"
            depends_on = ["empathy_map_collect_a", "empathy_map_collect_b"]
            "#,
        )
        .unwrap();
        assert_eq!(def.agent_role, "data_analyst");
        assert_eq!(def.depends_on.len(), 2);
        assert_eq!(def.kind(), TaskKind::Comparison);
    }

    #[test]
    fn test_definition_rejects_unknown_field() {
        let parsed: std::result::Result<TaskDefinition, _> = toml::from_str(
            r#"
            name = "x"
            agent = "y"
            description = "z"
            context = ["a"]
            "#,
        );
        assert!(parsed.is_err());
    }

    #[test]
    fn test_node_result_set_once() {
        let def = TaskDefinition::new("a", "ux_designer", "Do A");
        let mut node = TaskNode::new(def, "Do A".to_string());
        node.start(Vec::new());
        assert_eq!(node.status, TaskStatus::Running);
        assert!(node.started_at.is_some());

        assert!(node.complete(Arc::new(TaskResult::new("a", "ux_designer", "first"))));
        assert!(!node.complete(Arc::new(TaskResult::new("a", "ux_designer", "second"))));
        assert_eq!(node.result.as_ref().unwrap().output, "first");
        assert!(node.is_finished());
    }

    #[test]
    fn test_node_fail() {
        let mut node = TaskNode::new(TaskDefinition::new("a", "r", "d"), "d".into());
        node.fail("backend down");
        assert_eq!(node.status.to_string(), "failed: backend down");
        assert!(node.is_finished());
        assert!(node.result.is_none());
    }
}
