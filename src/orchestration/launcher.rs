//! Multi-instance launcher.
//!
//! Starts N isolated pipeline processes at once, relays every line they
//! print with an `[Instance i] ` prefix, waits for all of them and prints a
//! summary. Cancelling the token kills every instance still running.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::{ilog_debug, ilog_error};

/// Environment variable carrying the 1-based instance number.
pub const INSTANCE_ENV: &str = "IDEAGEN_INSTANCE";

/// How one instance ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutcome {
    /// 1-based instance number.
    pub instance: usize,
    /// `None` when the process was killed by a signal or never ran.
    pub exit_code: Option<i32>,
    /// Spawn or wait failure, or cancellation.
    pub error: Option<String>,
}

impl ProcessOutcome {
    pub fn is_success(&self) -> bool {
        self.error.is_none() && self.exit_code == Some(0)
    }

    pub fn summary_line(&self) -> String {
        match (&self.error, self.exit_code) {
            (None, Some(0)) => format!("✅ Instance {} completed successfully", self.instance),
            (None, Some(code)) => {
                format!("❌ Instance {} failed with code {}", self.instance, code)
            }
            (Some(error), _) => format!("❌ Instance {} failed: {}", self.instance, error),
            (None, None) => format!("❌ Instance {} was terminated by a signal", self.instance),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSummary {
    /// Outcomes sorted by instance number.
    pub outcomes: Vec<ProcessOutcome>,
    pub cancelled: bool,
    pub report_dir: PathBuf,
}

impl LaunchSummary {
    pub fn total(&self) -> usize {
        self.outcomes.len()
    }

    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.total() - self.succeeded()
    }

    pub fn lines(&self) -> Vec<String> {
        let mut lines: Vec<String> = self
            .outcomes
            .iter()
            .map(ProcessOutcome::summary_line)
            .collect();
        lines.push(format!(
            "✅ {}/{} instances completed successfully",
            self.succeeded(),
            self.total()
        ));
        if self.failed() > 0 {
            lines.push(format!("❌ {} instance(s) failed", self.failed()));
        } else {
            lines.push(format!(
                "📝 Reports have been generated in the {}/ directory",
                self.report_dir.display()
            ));
        }
        lines
    }
}

/// Cancelled on the first ctrl-c.
pub fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            println!("\nInterruption detected, stopping all processes...");
            token.cancel();
        }
    });
    cancel
}

#[derive(Debug, Clone)]
pub struct Launcher {
    program: PathBuf,
    args: Vec<String>,
    report_dir: PathBuf,
}

impl Launcher {
    pub fn new<I, S>(program: impl Into<PathBuf>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            report_dir: PathBuf::from(crate::config::DEFAULT_TRANSCRIPT_DIR),
        }
    }

    /// Launch this executable with `args` for every instance.
    pub fn current_exe<I, S>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Ok(Self::new(std::env::current_exe()?, args))
    }

    pub fn with_report_dir(mut self, dir: &Path) -> Self {
        self.report_dir = dir.to_path_buf();
        self
    }

    /// Run `count` instances, printing relayed lines and the summary to stdout.
    pub async fn launch(&self, count: usize, cancel: CancellationToken) -> LaunchSummary {
        let (tx, mut rx) = mpsc::unbounded_channel::<String>();
        let printer = tokio::spawn(async move {
            while let Some(line) = rx.recv().await {
                println!("{}", line);
            }
        });

        let summary = self.launch_to(count, cancel, tx).await;
        let _ = printer.await;

        for line in summary.lines() {
            println!("{}", line);
        }
        summary
    }

    /// Run `count` instances, sending every relayed line to `lines`.
    pub async fn launch_to(
        &self,
        count: usize,
        cancel: CancellationToken,
        lines: mpsc::UnboundedSender<String>,
    ) -> LaunchSummary {
        let _ = lines.send(format!(
            "🚀 Launching {} instance(s) of the idea generator...",
            count
        ));

        let mut outcomes = Vec::with_capacity(count);
        let mut instances = JoinSet::new();
        for instance in 1..=count {
            let _ = lines.send(format!("🔄 Launching instance {}...", instance));
            match self.spawn_instance(instance) {
                Ok(child) => {
                    instances.spawn(supervise(instance, child, lines.clone(), cancel.clone()));
                }
                Err(e) => {
                    ilog_error!("Failed to launch instance {}: {}", instance, e);
                    outcomes.push(ProcessOutcome {
                        instance,
                        exit_code: None,
                        error: Some(format!("failed to spawn: {}", e)),
                    });
                }
            }
        }

        let _ = lines.send("⏳ Waiting for all instances to complete...".to_string());
        while let Some(joined) = instances.join_next().await {
            match joined {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => ilog_error!("Instance supervisor failed: {}", e),
            }
        }
        outcomes.sort_by_key(|o| o.instance);

        LaunchSummary {
            outcomes,
            cancelled: cancel.is_cancelled(),
            report_dir: self.report_dir.clone(),
        }
    }

    fn spawn_instance(&self, instance: usize) -> std::io::Result<Child> {
        ilog_debug!(
            "Spawning instance {}: {} {}",
            instance,
            self.program.display(),
            self.args.join(" ")
        );
        Command::new(&self.program)
            .args(&self.args)
            .env(INSTANCE_ENV, instance.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
    }
}

async fn relay<R>(reader: R, prefix: String, lines: mpsc::UnboundedSender<String>)
where
    R: AsyncRead + Unpin,
{
    // Read to EOF even after the receiver is gone; the child must never
    // write into a closed pipe.
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    let mut forwarding = true;
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) if forwarding => {
                let text = String::from_utf8_lossy(&buf);
                let line = text.trim_end_matches(['\n', '\r']);
                forwarding = lines.send(format!("{}{}", prefix, line)).is_ok();
            }
            Ok(_) => {}
            Err(e) => {
                ilog_debug!("{}output closed: {}", prefix, e);
                break;
            }
        }
    }
}

async fn supervise(
    instance: usize,
    mut child: Child,
    lines: mpsc::UnboundedSender<String>,
    cancel: CancellationToken,
) -> ProcessOutcome {
    let prefix = format!("[Instance {}] ", instance);
    let stdout = child
        .stdout
        .take()
        .map(|out| tokio::spawn(relay(out, prefix.clone(), lines.clone())));
    let stderr = child
        .stderr
        .take()
        .map(|err| tokio::spawn(relay(err, prefix, lines)));
    let relays: Vec<JoinHandle<()>> = [stdout, stderr].into_iter().flatten().collect();

    let status = tokio::select! {
        status = child.wait() => status,
        _ = cancel.cancelled() => {
            ilog_debug!("Killing instance {}", instance);
            if let Err(e) = child.kill().await {
                ilog_error!("Failed to kill instance {}: {}", instance, e);
            }
            // Descendants may still hold the pipes; stop relaying now.
            for handle in &relays {
                handle.abort();
            }
            return ProcessOutcome {
                instance,
                exit_code: None,
                error: Some("cancelled".to_string()),
            };
        }
    };

    // Flush the remaining output before reporting, unless cancelled first.
    for handle in relays {
        let abort = handle.abort_handle();
        tokio::select! {
            _ = handle => {}
            _ = cancel.cancelled() => abort.abort(),
        }
    }

    match status {
        Ok(status) => ProcessOutcome {
            instance,
            exit_code: status.code(),
            error: None,
        },
        Err(e) => ProcessOutcome {
            instance,
            exit_code: None,
            error: Some(e.to_string()),
        },
    }
}
