//! Headless CLI agent backend.
//!
//! Runs a CLI agent once per task in non-interactive mode
//! (`<binary> -p <prompt> --output-format json`) and parses its JSON
//! result. The persona framing is prepended to the prompt because the CLI
//! has no separate system channel.

use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::Command;

use crate::agent::{CompletionRequest, LanguageModel};
use crate::config::BackendConfig;
use crate::error::{Error, Result};
use crate::{ilog_debug, ilog_trace};

/// Default timeout for one CLI execution (10 minutes).
pub const DEFAULT_TIMEOUT_SECS: u64 = 600;

/// Outcome reported by the CLI.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandOutcome {
    Success { output: String },
    Error { message: String },
}

#[derive(Debug, Deserialize)]
struct RawCommandResponse {
    subtype: Option<String>,
    result: Option<String>,
    #[serde(default)]
    is_error: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CommandBackend {
    binary: PathBuf,
    model: Option<String>,
    timeout: Duration,
    cwd: Option<PathBuf>,
}

impl CommandBackend {
    /// Resolve the configured command on `PATH`.
    ///
    /// # Errors
    /// Returns `Error::Configuration` if the binary cannot be found.
    pub fn from_config(config: &BackendConfig) -> Result<Self> {
        let command = config.effective_command();
        let binary = which::which(command).map_err(|_| {
            Error::Configuration(format!("agent command '{}' not found in PATH", command))
        })?;
        let mut backend = Self::with_binary(binary);
        backend.model = config.model.clone();
        Ok(backend)
    }

    pub fn with_binary(binary: PathBuf) -> Self {
        Self {
            binary,
            model: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            cwd: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_cwd(mut self, cwd: &Path) -> Self {
        self.cwd = Some(cwd.to_path_buf());
        self
    }

    fn build_prompt(request: &CompletionRequest) -> String {
        if request.system.trim().is_empty() {
            request.prompt.clone()
        } else {
            format!("{}\n\n{}", request.system.trim(), request.prompt)
        }
    }

    fn command(&self, prompt: &str) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.arg("-p").arg(prompt).arg("--output-format").arg("json");
        if let Some(model) = &self.model {
            cmd.arg("--model").arg(model);
        }
        if let Some(cwd) = &self.cwd {
            cmd.current_dir(cwd);
        }
        cmd.kill_on_drop(true);
        cmd
    }

    /// Parse the CLI's JSON result object.
    pub fn parse_json_response(json_str: &str) -> Result<CommandOutcome> {
        let raw: RawCommandResponse = serde_json::from_str(json_str.trim())?;

        let outcome = match raw.subtype.as_deref() {
            Some("success") if !raw.is_error => CommandOutcome::Success {
                output: raw.result.unwrap_or_default(),
            },
            Some(subtype) if subtype.starts_with("error") || raw.is_error => CommandOutcome::Error {
                message: raw.error.or(raw.result).unwrap_or_else(|| subtype.to_string()),
            },
            _ => {
                if let Some(error) = raw.error {
                    CommandOutcome::Error { message: error }
                } else if let Some(result) = raw.result {
                    CommandOutcome::Success { output: result }
                } else {
                    CommandOutcome::Error {
                        message: "Unknown response format".to_string(),
                    }
                }
            }
        };
        Ok(outcome)
    }

    async fn execute(&self, prompt: &str) -> Result<CommandOutcome> {
        let output = tokio::time::timeout(self.timeout, self.command(prompt).output())
            .await
            .map_err(|_| Error::Timeout(self.timeout))?
            .map_err(Error::Io)?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        ilog_trace!("{} stdout: {}", self.binary.display(), stdout);

        if let Ok(outcome) = Self::parse_json_response(&stdout) {
            return Ok(outcome);
        }

        if !output.status.success() {
            let message = if stderr.trim().is_empty() {
                format!(
                    "{} exited with code {}",
                    self.binary.display(),
                    output.status.code().unwrap_or(-1)
                )
            } else {
                stderr.trim().to_string()
            };
            return Ok(CommandOutcome::Error { message });
        }

        Ok(CommandOutcome::Success {
            output: stdout.trim().to_string(),
        })
    }
}

#[async_trait]
impl LanguageModel for CommandBackend {
    fn name(&self) -> &str {
        self.binary
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("command")
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let prompt = Self::build_prompt(request);
        ilog_debug!(
            "Running {} (prompt {} chars, timeout {:?})",
            self.binary.display(),
            prompt.len(),
            self.timeout
        );
        match self.execute(&prompt).await? {
            CommandOutcome::Success { output } => Ok(output),
            CommandOutcome::Error { message } => Err(Error::Backend(message)),
        }
    }
}
