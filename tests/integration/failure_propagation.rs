//! What a failed run leaves behind.
//!
//! Validation errors stop a run before any agent is invoked. A task
//! failure halts the run: completed work stays in the transcript, nothing
//! downstream runs, and the failure is visible in the written report.

use ideagen::catalog::Catalog;
use ideagen::core::transcript::{JsonSink, MarkdownFileSink, RunTranscript, TranscriptStatus};
use ideagen::core::{TaskDefinition, TaskStatus};
use ideagen::Error;

use crate::fixtures::{abc_catalog, abc_model, TestPipeline};

#[tokio::test]
async fn test_failed_task_keeps_completed_prefix() {
    let test = TestPipeline::new(abc_catalog(), abc_model().fail_on("Task B"));
    let report = test.pipeline.run().await.expect("validation should pass");

    assert!(!report.is_success());
    match report.error.as_ref() {
        Some(Error::TaskExecution { task_name, cause }) => {
            assert_eq!(task_name, "B");
            assert!(cause.contains("scripted failure"), "cause: {}", cause);
        }
        other => panic!("expected a task failure, got {:?}", other),
    }

    let names: Vec<&str> = report
        .transcript
        .records()
        .iter()
        .map(|r| r.task_name.as_str())
        .collect();
    assert_eq!(names, vec!["A"]);
    assert!(matches!(
        &report.transcript.status,
        TranscriptStatus::Failed { task_name: Some(task), .. } if task == "B"
    ));

    // C is never invoked once B fails.
    assert_eq!(test.model.calls(), vec!["Task A", "Task B"]);
    assert!(matches!(report.plan.node("B").unwrap().status, TaskStatus::Failed { .. }));
    assert_eq!(report.plan.node("C").unwrap().status, TaskStatus::Pending);
}

#[tokio::test]
async fn test_failed_run_reports_are_finalized() {
    let test = TestPipeline::new(abc_catalog(), abc_model().fail_on("Task C"));
    let report = test.pipeline.run().await.unwrap();
    assert!(!report.is_success());

    let markdown =
        std::fs::read_to_string(MarkdownFileSink::report_path(&test.logs_dir(), &report.run_id))
            .expect("partial markdown report");
    assert!(markdown.contains("## 1. A"));
    assert!(markdown.contains("## 2. B"));
    assert!(!markdown.contains("## 3. C"));
    assert!(markdown.contains("- Status: failed at C"));

    let saved: RunTranscript = serde_json::from_str(
        &std::fs::read_to_string(JsonSink::json_path(&test.logs_dir(), &report.run_id))
            .expect("json transcript"),
    )
    .unwrap();
    assert_eq!(saved.len(), 2);
    assert!(saved.is_finalized());

    let err = report.into_result().unwrap_err();
    assert_eq!(err.to_string(), "Task C failed: Agent backend error: scripted failure for Task C");
}

#[tokio::test]
async fn test_empty_output_fails_the_task() {
    let test = TestPipeline::new(abc_catalog(), abc_model().answer("Task B", "   "));
    let report = test.pipeline.run().await.unwrap();

    assert!(matches!(
        report.error,
        Some(Error::TaskExecution { ref task_name, .. }) if task_name == "B"
    ));
    assert_eq!(report.transcript.len(), 1);
}

#[tokio::test]
async fn test_unknown_role_is_rejected_before_any_invocation() {
    let mut catalog = abc_catalog();
    catalog
        .tasks
        .push(TaskDefinition::new("D", "accountant", "Task D").depends_on(["C"]));
    let test = TestPipeline::new(catalog, abc_model());

    let err = test.pipeline.run().await.unwrap_err();
    assert!(matches!(err, Error::Configuration(_)));
    assert!(err.to_string().contains("accountant"));
    assert!(test.model.requests().is_empty());
    assert!(test.written_files().is_empty());
}

#[tokio::test]
async fn test_cycle_is_rejected_before_any_invocation() {
    let mut catalog = abc_catalog();
    catalog.tasks[0] = TaskDefinition::new("A", "researcher", "Task A").depends_on(["C"]);
    let test = TestPipeline::new(catalog, abc_model());

    let err = test.pipeline.run().await.unwrap_err();
    assert!(matches!(err, Error::CyclicDependency { .. }));
    assert!(test.model.requests().is_empty());
    assert!(test.written_files().is_empty());
}

#[tokio::test]
async fn test_missing_dependency_in_builtin_extension() {
    let mut catalog = Catalog::builtin();
    catalog.tasks.push(
        TaskDefinition::new("pitch_deck", "product_manager", "Build a pitch deck")
            .depends_on(["market_sizing"]),
    );
    let test = TestPipeline::new(catalog, abc_model());

    let err = test.pipeline.run().await.unwrap_err();
    match err {
        Error::MissingDependency { task, dependency } => {
            assert_eq!(task, "pitch_deck");
            assert_eq!(dependency, "market_sizing");
        }
        other => panic!("expected a missing dependency, got {:?}", other),
    }
    assert!(test.model.requests().is_empty());
}
