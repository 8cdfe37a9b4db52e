//! Run transcript: the ordered, append-only record of one pipeline run.
//!
//! The engine is the single writer. Each completed task appends one
//! `TranscriptRecord`; the transcript is finalized exactly once, as
//! completed or failed. Sinks mirror the transcript to durable storage.

use async_trait::async_trait;
use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::util::blocking;
use crate::{ilog, ilog_debug};

/// Identifier of one run: local timestamp plus a short random suffix.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(String);

impl RunId {
    pub fn new() -> Self {
        let suffix = Uuid::new_v4().simple().to_string();
        Self(format!(
            "{}_{}",
            Local::now().format("%Y%m%d_%H%M%S"),
            &suffix[..8]
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for RunId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// One executed task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptRecord {
    /// Zero-based position in the transcript.
    pub index: usize,
    pub task_name: String,
    pub agent_role: String,
    /// Names of the tasks whose outputs formed the context, in declared order.
    pub context_refs: Vec<String>,
    pub output: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum TranscriptStatus {
    #[default]
    Open,
    Completed,
    Failed {
        task_name: Option<String>,
        error: String,
    },
}

impl std::fmt::Display for TranscriptStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TranscriptStatus::Open => write!(f, "open"),
            TranscriptStatus::Completed => write!(f, "completed"),
            TranscriptStatus::Failed {
                task_name: Some(task),
                error,
            } => write!(f, "failed at {}: {}", task, error),
            TranscriptStatus::Failed {
                task_name: None,
                error,
            } => write!(f, "failed: {}", error),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunTranscript {
    pub run_id: RunId,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub status: TranscriptStatus,
    records: Vec<TranscriptRecord>,
}

impl RunTranscript {
    pub fn new(run_id: RunId) -> Self {
        Self {
            run_id,
            started_at: Utc::now(),
            finished_at: None,
            status: TranscriptStatus::Open,
            records: Vec::new(),
        }
    }

    pub fn records(&self) -> &[TranscriptRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn is_finalized(&self) -> bool {
        self.status != TranscriptStatus::Open
    }

    /// Append a record; its `index` is assigned here.
    ///
    /// # Errors
    /// Returns `Error::Transcript` once the transcript is finalized.
    pub fn append(
        &mut self,
        task_name: &str,
        agent_role: &str,
        context_refs: Vec<String>,
        output: &str,
        started_at: DateTime<Utc>,
    ) -> Result<&TranscriptRecord> {
        if self.is_finalized() {
            return Err(Error::Transcript(format!(
                "cannot append {} to finalized transcript {}",
                task_name, self.run_id
            )));
        }
        let index = self.records.len();
        self.records.push(TranscriptRecord {
            index,
            task_name: task_name.to_string(),
            agent_role: agent_role.to_string(),
            context_refs,
            output: output.to_string(),
            started_at,
            completed_at: Utc::now(),
        });
        Ok(&self.records[index])
    }

    pub fn complete(&mut self) -> Result<()> {
        self.finalize(TranscriptStatus::Completed)
    }

    pub fn fail(&mut self, task_name: Option<&str>, error: &str) -> Result<()> {
        self.finalize(TranscriptStatus::Failed {
            task_name: task_name.map(str::to_string),
            error: error.to_string(),
        })
    }

    fn finalize(&mut self, status: TranscriptStatus) -> Result<()> {
        if self.is_finalized() {
            return Err(Error::Transcript(format!(
                "transcript {} already finalized as {}",
                self.run_id, self.status
            )));
        }
        self.status = status;
        self.finished_at = Some(Utc::now());
        Ok(())
    }
}

fn markdown_header(transcript: &RunTranscript) -> String {
    format!(
        "# Idea Generation Report\n\n- Run: {}\n- Started: {}\n\n",
        transcript.run_id,
        transcript.started_at.format("%Y-%m-%d %H:%M:%S UTC")
    )
}

fn markdown_record(record: &TranscriptRecord) -> String {
    let context = if record.context_refs.is_empty() {
        "none".to_string()
    } else {
        record.context_refs.join(", ")
    };
    format!(
        "## {}. {}\n\n- Agent: {}\n- Context: {}\n\n{}\n\n",
        record.index + 1,
        record.task_name,
        record.agent_role,
        context,
        record.output.trim()
    )
}

fn markdown_footer(transcript: &RunTranscript) -> String {
    let finished = transcript
        .finished_at
        .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| "-".to_string());
    format!(
        "---\n\n- Status: {}\n- Tasks recorded: {}\n- Finished: {}\n",
        transcript.status,
        transcript.len(),
        finished
    )
}

/// Render a whole transcript as Markdown.
pub fn render_markdown(transcript: &RunTranscript) -> String {
    let mut out = markdown_header(transcript);
    for record in transcript.records() {
        out.push_str(&markdown_record(record));
    }
    if transcript.is_finalized() {
        out.push_str(&markdown_footer(transcript));
    }
    out
}

/// Durable mirror of a transcript.
#[async_trait]
pub trait TranscriptSink: Send {
    fn name(&self) -> &str;

    async fn begin(&mut self, _transcript: &RunTranscript) -> Result<()> {
        Ok(())
    }

    async fn record(&mut self, _record: &TranscriptRecord) -> Result<()> {
        Ok(())
    }

    async fn finish(&mut self, transcript: &RunTranscript) -> Result<()>;
}

/// Appends to `<dir>/idea_generation_report_<run_id>.md` as tasks complete.
pub struct MarkdownFileSink {
    dir: PathBuf,
    path: Option<PathBuf>,
}

impl MarkdownFileSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            path: None,
        }
    }

    pub fn report_path(dir: &Path, run_id: &RunId) -> PathBuf {
        dir.join(format!("idea_generation_report_{}.md", run_id))
    }

    /// Path of the report once `begin` has run.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    async fn append_text(&self, text: String) -> Result<()> {
        let path = self
            .path
            .clone()
            .ok_or_else(|| Error::Transcript("markdown report was not started".to_string()))?;
        blocking(move || {
            let mut file = OpenOptions::new().append(true).open(&path)?;
            file.write_all(text.as_bytes())?;
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl TranscriptSink for MarkdownFileSink {
    fn name(&self) -> &str {
        "markdown"
    }

    async fn begin(&mut self, transcript: &RunTranscript) -> Result<()> {
        let path = Self::report_path(&self.dir, &transcript.run_id);
        let dir = self.dir.clone();
        let header = markdown_header(transcript);
        let target = path.clone();
        blocking(move || {
            if !dir.exists() {
                ilog_debug!("Creating transcript directory: {}", dir.display());
                fs::create_dir_all(&dir)?;
            }
            fs::write(&target, header)?;
            Ok(())
        })
        .await?;
        ilog!("Writing report to {}", path.display());
        self.path = Some(path);
        Ok(())
    }

    async fn record(&mut self, record: &TranscriptRecord) -> Result<()> {
        self.append_text(markdown_record(record)).await
    }

    async fn finish(&mut self, transcript: &RunTranscript) -> Result<()> {
        self.append_text(markdown_footer(transcript)).await
    }
}

/// Writes the full transcript as `<dir>/<run_id>.json` when the run ends.
pub struct JsonSink {
    dir: PathBuf,
}

impl JsonSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn json_path(dir: &Path, run_id: &RunId) -> PathBuf {
        dir.join(format!("{}.json", run_id))
    }
}

#[async_trait]
impl TranscriptSink for JsonSink {
    fn name(&self) -> &str {
        "json"
    }

    async fn finish(&mut self, transcript: &RunTranscript) -> Result<()> {
        let contents = serde_json::to_string_pretty(transcript)?;
        let dir = self.dir.clone();
        let path = Self::json_path(&self.dir, &transcript.run_id);
        blocking(move || {
            if !dir.exists() {
                fs::create_dir_all(&dir)?;
            }
            let temp_path = path.with_extension("json.tmp");
            fs::write(&temp_path, &contents)?;
            fs::rename(&temp_path, &path)?;
            ilog_debug!("Transcript saved: {}", path.display());
            Ok(())
        })
        .await
    }
}

/// In-memory sink; clones share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    records: Arc<Mutex<Vec<TranscriptRecord>>>,
    finished: Arc<Mutex<Option<TranscriptStatus>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<TranscriptRecord> {
        self.records
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    /// Final status, once the transcript was finalized.
    pub fn finished(&self) -> Option<TranscriptStatus> {
        self.finished.lock().ok().and_then(|f| f.clone())
    }
}

#[async_trait]
impl TranscriptSink for MemorySink {
    fn name(&self) -> &str {
        "memory"
    }

    async fn record(&mut self, record: &TranscriptRecord) -> Result<()> {
        self.records
            .lock()
            .map_err(|e| Error::Transcript(e.to_string()))?
            .push(record.clone());
        Ok(())
    }

    async fn finish(&mut self, transcript: &RunTranscript) -> Result<()> {
        *self
            .finished
            .lock()
            .map_err(|e| Error::Transcript(e.to_string()))? = Some(transcript.status.clone());
        Ok(())
    }
}
