//! Properties of the execution plan.
//!
//! Ordering must respect every dependency, be identical across builds of
//! the same table and break ties by declaration order. Invalid tables are
//! rejected with the offending names.

use std::collections::HashSet;

use ideagen::catalog::Catalog;
use ideagen::core::{ExecutionPlan, TaskDefinition, TaskTable};
use ideagen::pipeline::preview_plan;
use ideagen::Error;

fn plan_of(definitions: Vec<TaskDefinition>) -> ideagen::Result<ExecutionPlan> {
    let table = TaskTable::from_definitions(definitions)?;
    ExecutionPlan::build(&table.finalize_with(|_, param| param.min))
}

fn task(name: &str, deps: &[&str]) -> TaskDefinition {
    TaskDefinition::new(name, "researcher", &format!("Task {}", name))
        .depends_on(deps.iter().copied())
}

#[test]
fn test_builtin_order_respects_every_dependency() {
    let catalog = Catalog::builtin();
    let plan = preview_plan(&catalog).unwrap();
    let order = plan.order();

    assert_eq!(order.len(), catalog.tasks.len());
    let unique: HashSet<&str> = order.iter().copied().collect();
    assert_eq!(unique.len(), order.len(), "a task was scheduled twice");

    for definition in &catalog.tasks {
        let at = plan.position(&definition.name).unwrap();
        for dep in &definition.depends_on {
            let dep_at = plan.position(dep).unwrap();
            assert!(
                dep_at < at,
                "{} (at {}) scheduled before its dependency {} (at {})",
                definition.name,
                at,
                dep,
                dep_at
            );
        }
    }
}

#[test]
fn test_builtin_order_is_deterministic() {
    let first: Vec<String> = preview_plan(&Catalog::builtin())
        .unwrap()
        .order()
        .iter()
        .map(|s| s.to_string())
        .collect();
    for _ in 0..10 {
        let again = preview_plan(&Catalog::builtin()).unwrap();
        assert_eq!(again.order(), first);
    }
}

#[test]
fn test_waves_never_contain_dependent_tasks() {
    let plan = preview_plan(&Catalog::builtin()).unwrap();
    let mut seen: HashSet<&str> = HashSet::new();
    for wave in plan.waves() {
        for name in &wave {
            for dep in plan.dependencies_of(name) {
                assert!(seen.contains(dep), "{} shares a wave with or precedes {}", name, dep);
            }
        }
        seen.extend(wave);
    }
    assert_eq!(seen.len(), plan.len());
}

#[test]
fn test_independent_tasks_keep_declaration_order() {
    let plan = plan_of(vec![
        task("gamma", &[]),
        task("alpha", &[]),
        task("beta", &[]),
        task("delta", &["alpha"]),
    ])
    .unwrap();
    assert_eq!(plan.order(), vec!["gamma", "alpha", "beta", "delta"]);
}

#[test]
fn test_dependency_declared_later_still_runs_first() {
    let plan = plan_of(vec![task("summary", &["draft"]), task("draft", &[])]).unwrap();
    assert_eq!(plan.order(), vec!["draft", "summary"]);
}

#[test]
fn test_three_task_cycle_is_named() {
    let err = plan_of(vec![
        task("A", &["C"]),
        task("B", &["A"]),
        task("C", &["B"]),
    ])
    .unwrap_err();

    match err {
        Error::CyclicDependency { cycle } => {
            assert_eq!(cycle.first(), cycle.last());
            let members: HashSet<&str> = cycle.iter().map(String::as_str).collect();
            assert_eq!(members, HashSet::from(["A", "B", "C"]));
        }
        other => panic!("expected a cycle, got {:?}", other),
    }
}

#[test]
fn test_cycle_behind_valid_prefix_is_still_rejected() {
    let err = plan_of(vec![
        task("root", &[]),
        task("left", &["root", "right"]),
        task("right", &["left"]),
    ])
    .unwrap_err();
    assert!(matches!(err, Error::CyclicDependency { .. }));
    assert!(err.to_string().contains("left"));
    assert!(err.to_string().contains("right"));
}

#[test]
fn test_missing_dependency_names_both_tasks() {
    let err = plan_of(vec![task("X", &["Y"])]).unwrap_err();
    match &err {
        Error::MissingDependency { task, dependency } => {
            assert_eq!(task, "X");
            assert_eq!(dependency, "Y");
        }
        other => panic!("expected a missing dependency, got {:?}", other),
    }
    assert!(err.is_validation());
}

#[test]
fn test_duplicate_task_names_are_rejected() {
    let err = TaskTable::from_definitions(vec![task("A", &[]), task("A", &[])]).unwrap_err();
    assert!(matches!(err, Error::DuplicateTask(_)));
}
