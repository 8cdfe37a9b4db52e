//! Multi-instance launcher against real child processes.
//!
//! Children are small `sh` scripts; `IDEAGEN_INSTANCE` tells each one
//! which instance it is.

use std::time::{Duration, Instant};

use tempfile::TempDir;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use ideagen::orchestration::{LaunchSummary, Launcher, INSTANCE_ENV};

async fn collect(launcher: &Launcher, count: usize) -> (LaunchSummary, Vec<String>) {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let summary = launcher.launch_to(count, CancellationToken::new(), tx).await;
    let mut lines = Vec::new();
    while let Some(line) = rx.recv().await {
        lines.push(line);
    }
    (summary, lines)
}

#[tokio::test]
async fn test_instances_write_their_own_reports() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let script = format!(
        "echo \"instance ${0} running\"; echo \"report ${0}\" > \"{1}/report_${0}.md\"",
        INSTANCE_ENV,
        temp_dir.path().display()
    );
    let launcher = Launcher::new("sh", ["-c", script.as_str()]).with_report_dir(temp_dir.path());

    let (summary, lines) = collect(&launcher, 3).await;

    assert_eq!(summary.succeeded(), 3);
    for instance in 1..=3 {
        let path = temp_dir.path().join(format!("report_{}.md", instance));
        let contents = std::fs::read_to_string(&path).expect("instance report");
        assert_eq!(contents.trim(), format!("report {}", instance));
        assert!(lines.contains(&format!("[Instance {0}] instance {0} running", instance)));
    }

    let last = summary.lines().pop().unwrap();
    assert_eq!(
        last,
        format!("📝 Reports have been generated in the {}/ directory", temp_dir.path().display())
    );
}

#[tokio::test]
async fn test_instances_run_concurrently() {
    let launcher = Launcher::new("sh", ["-c", "sleep 1"]);
    let started = Instant::now();
    let (summary, _) = collect(&launcher, 4).await;

    assert_eq!(summary.succeeded(), 4);
    assert!(
        started.elapsed() < Duration::from_secs(3),
        "instances ran one after another: {:?}",
        started.elapsed()
    );
}

#[tokio::test]
async fn test_stderr_is_relayed_and_failures_counted() {
    let script = format!(
        "if [ \"${0}\" = 2 ]; then echo \"boom\" >&2; exit 7; fi",
        INSTANCE_ENV
    );
    let launcher = Launcher::new("sh", ["-c", script.as_str()]);
    let (summary, lines) = collect(&launcher, 3).await;

    assert_eq!(summary.total(), 3);
    assert_eq!(summary.failed(), 1);
    assert!(lines.contains(&"[Instance 2] boom".to_string()));

    let summary_lines = summary.lines();
    assert!(summary_lines.contains(&"❌ Instance 2 failed with code 7".to_string()));
    assert!(summary_lines.contains(&"✅ 2/3 instances completed successfully".to_string()));
    assert_eq!(summary_lines.last().unwrap(), "❌ 1 instance(s) failed");
}
