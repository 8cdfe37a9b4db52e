//! End-to-end pipeline runs.
//!
//! Each test builds a `Pipeline` over a scripted model and checks the
//! transcript, the results handed to downstream agents and the report
//! files written to disk.

use ideagen::catalog::Catalog;
use ideagen::core::transcript::{JsonSink, MarkdownFileSink, RunTranscript, TranscriptStatus};

use crate::fixtures::{abc_catalog, abc_model, ScriptedModel, TestPipeline};

#[tokio::test]
async fn test_abc_run_records_every_task_in_order() {
    let test = TestPipeline::new(abc_catalog(), abc_model());
    let report = test.pipeline.run().await.expect("validation should pass");

    assert!(report.is_success(), "run failed: {:?}", report.error);
    assert_eq!(report.transcript.status, TranscriptStatus::Completed);

    let names: Vec<&str> = report
        .transcript
        .records()
        .iter()
        .map(|r| r.task_name.as_str())
        .collect();
    assert_eq!(names, vec!["A", "B", "C"]);
    assert_eq!(test.model.calls(), vec!["Task A", "Task B", "Task C"]);
}

#[tokio::test]
async fn test_context_follows_declared_dependency_order() {
    let test = TestPipeline::new(abc_catalog(), abc_model());
    let report = test.pipeline.run().await.unwrap();

    let c = &report.transcript.records()[2];
    assert_eq!(c.context_refs, vec!["A", "B"]);

    let node = report.plan.node("C").unwrap();
    let outputs: Vec<&str> = node
        .resolved_context
        .iter()
        .map(|r| r.output.as_str())
        .collect();
    assert_eq!(outputs, vec!["a", "b"]);

    // The agent saw A's output before B's.
    let prompt = &test.model.requests()[2].prompt;
    let a_at = prompt.find("## A (").expect("A in context");
    let b_at = prompt.find("## B (").expect("B in context");
    assert!(a_at < b_at);
}

#[tokio::test]
async fn test_independent_inputs_reach_downstream_task() {
    let test = TestPipeline::new(abc_catalog(), abc_model());
    let report = test.pipeline.run().await.unwrap();
    assert!(report.is_success());

    let plan = &report.plan;
    assert_eq!(plan.waves(), vec![vec!["A", "B"], vec!["C"]]);
    assert!(plan.node("A").unwrap().resolved_context.is_empty());
    assert!(plan.node("B").unwrap().resolved_context.is_empty());

    let records = report.transcript.records();
    assert!(records[0].context_refs.is_empty());
    assert!(records[1].context_refs.is_empty());
    assert_eq!(records[2].context_refs, vec!["A", "B"]);

    let prompts = test.model.requests();
    assert!(!prompts[1].prompt.contains("This is the context"));
    let context = report.plan.node("C").unwrap().resolved_context.clone();
    assert_eq!(context.len(), 2);
    assert_eq!((context[0].output.as_str(), context[1].output.as_str()), ("a", "b"));
    assert_eq!(context[0], report.result("A").unwrap());
    assert_eq!(context[1], report.result("B").unwrap());
}

#[tokio::test]
async fn test_run_writes_markdown_report_and_json_transcript() {
    let test = TestPipeline::new(abc_catalog(), abc_model());
    let report = test.pipeline.run().await.unwrap();
    assert!(report.is_success());

    let markdown_path = MarkdownFileSink::report_path(&test.logs_dir(), &report.run_id);
    let markdown = std::fs::read_to_string(&markdown_path).expect("markdown report");
    assert!(markdown.starts_with("# Idea Generation Report"));
    assert!(markdown.contains(report.run_id.as_str()));
    let a_at = markdown.find("## 1. A").expect("A section");
    let c_at = markdown.find("## 3. C").expect("C section");
    assert!(a_at < c_at);
    assert!(markdown.contains("- Context: A, B"));
    assert!(markdown.contains("- Status: completed"));

    let json_path = JsonSink::json_path(&test.logs_dir(), &report.run_id);
    let saved: RunTranscript =
        serde_json::from_str(&std::fs::read_to_string(&json_path).expect("json transcript"))
            .expect("valid transcript json");
    assert_eq!(saved.run_id, report.run_id);
    assert_eq!(saved.len(), 3);
    assert_eq!(saved.status, TranscriptStatus::Completed);
    assert_eq!(saved.records()[1].output, "b");

    assert_eq!(test.written_files().len(), 2);
}

#[tokio::test]
async fn test_parallel_run_matches_sequential_results() {
    let test = TestPipeline::with_parallelism(abc_catalog(), abc_model(), 4);
    let report = test.pipeline.run().await.unwrap();

    assert!(report.is_success());
    assert_eq!(report.transcript.len(), 3);
    assert_eq!(report.result("C").unwrap().output, "c");
    assert_eq!(report.transcript.records()[2].context_refs, vec!["A", "B"]);
}

#[tokio::test]
async fn test_builtin_catalog_runs_to_completion() {
    let test = TestPipeline::new(Catalog::builtin(), ScriptedModel::new());
    let report = test.pipeline.run().await.unwrap();

    assert!(report.is_success(), "run failed: {:?}", report.error);
    assert_eq!(report.transcript.len(), 29);
    assert_eq!(test.model.requests().len(), 29);

    let records = report.transcript.records();
    assert_eq!(records[0].task_name, "initialization_proposition_a");
    assert_eq!(records[28].task_name, "final_solution_overview");

    // Every record only references tasks recorded before it.
    for (i, record) in records.iter().enumerate() {
        for dep in &record.context_refs {
            let at = records.iter().position(|r| &r.task_name == dep).unwrap();
            assert!(at < i, "{} recorded before its dependency {}", record.task_name, dep);
        }
    }
}

#[tokio::test]
async fn test_builtin_persona_values_are_drawn_in_range() {
    let test = TestPipeline::new(Catalog::builtin(), ScriptedModel::new());
    let (_, plan) = test.pipeline.prepare().await.unwrap();

    let first = plan.node("initialization_proposition_a").unwrap();
    let age = value_in(&first.description, "age");
    let pain_points = value_in(&first.description, "number_of_pain_points");
    assert!((18..=60).contains(&age), "age {} out of range", age);
    assert!((1..=9).contains(&pain_points), "pain points {} out of range", pain_points);
    assert!(!first.description.contains("{age}"));
}

/// Value of `name=<n>` in the random-value trailer.
fn value_in(description: &str, name: &str) -> i64 {
    let marker = format!("{}=", name);
    if let Some(at) = description.find(&marker) {
        let digits: String = description[at + marker.len()..]
            .chars()
            .take_while(|c| c.is_ascii_digit())
            .collect();
        return digits.parse().unwrap();
    }
    panic!("{} not found in description:\n{}", name, description);
}
