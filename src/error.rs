use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Task already defined: {0}")]
    DuplicateTask(String),

    #[error("Unknown task: {0}")]
    UnknownTask(String),

    #[error("Task {task} depends on undefined task {dependency}")]
    MissingDependency { task: String, dependency: String },

    #[error("Cyclic dependency: {}", cycle.join(" -> "))]
    CyclicDependency { cycle: Vec<String> },

    #[error("Task {task_name} failed: {cause}")]
    TaskExecution { task_name: String, cause: String },

    #[error("Agent backend error: {0}")]
    Backend(String),

    #[error("Random service error: {0}")]
    RandomService(String),

    #[error("Transcript error: {0}")]
    Transcript(String),

    #[error("Operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Task join error: {0}")]
    TaskJoin(String),
}

impl Error {
    /// Wrap any failure of a single task invocation.
    pub fn task_execution(task_name: &str, cause: impl std::fmt::Display) -> Self {
        Error::TaskExecution {
            task_name: task_name.to_string(),
            cause: cause.to_string(),
        }
    }

    /// True for errors raised while validating the table or graph,
    /// before any agent is invoked.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Error::Configuration(_)
                | Error::DuplicateTask(_)
                | Error::UnknownTask(_)
                | Error::MissingDependency { .. }
                | Error::CyclicDependency { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
