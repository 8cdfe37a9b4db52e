//! Execution engine.
//!
//! The engine walks an `ExecutionPlan`, invokes each task's agent with the
//! finalized description and the outputs of its declared dependencies, and
//! appends one transcript record per completed task. The engine loop is the
//! only writer of the plan and the transcript; in parallel mode only agent
//! invocations run concurrently.
//!
//! Any task failure aborts the run. Results produced before the failure are
//! kept in the report and in the transcript, which is finalized as failed.

use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinSet;

use crate::agent::{Agent, AgentRegistry};
use crate::core::dag::ExecutionPlan;
use crate::core::task::TaskResult;
use crate::core::transcript::{RunId, RunTranscript, TranscriptSink};
use crate::error::{Error, Result};
use crate::util::{preview, with_timeout};
use crate::{ilog, ilog_debug, ilog_error, ilog_warn};

/// Events emitted by the engine for task lifecycle changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    TaskStarted {
        task_name: String,
        agent_role: String,
    },
    TaskCompleted {
        task_name: String,
        /// Position of the record in the transcript.
        index: usize,
    },
    TaskFailed {
        task_name: String,
        error: String,
    },
    RunFinished {
        run_id: RunId,
        success: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineOptions {
    /// Limit on each agent invocation; `None` waits indefinitely.
    pub task_timeout: Option<Duration>,
    /// Maximum concurrent invocations. 1 runs strictly in plan order.
    pub max_parallel: usize,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            task_timeout: None,
            max_parallel: 1,
        }
    }
}

/// Outcome of one run.
#[derive(Debug)]
pub struct RunReport {
    pub run_id: RunId,
    /// The plan with every produced result attached to its node.
    pub plan: ExecutionPlan,
    pub transcript: RunTranscript,
    pub error: Option<Error>,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Results produced during the run, in plan order.
    pub fn results(&self) -> Vec<Arc<TaskResult>> {
        self.plan.results()
    }

    pub fn result(&self, task_name: &str) -> Option<Arc<TaskResult>> {
        self.plan.node(task_name).and_then(|n| n.result.clone())
    }

    pub fn into_result(self) -> Result<RunTranscript> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.transcript),
        }
    }
}

type Invocation = (String, DateTime<Utc>, Result<String>);

/// Invoke one agent. Owns its inputs so it can be spawned.
async fn invoke_task(
    agent: Arc<Agent>,
    task_name: String,
    description: String,
    context: Vec<Arc<TaskResult>>,
    timeout: Option<Duration>,
) -> Invocation {
    let started_at = Utc::now();
    let outcome = with_timeout(timeout, agent.invoke(&description, &context))
        .await
        .and_then(|output| {
            if output.trim().is_empty() {
                Err(Error::Backend("agent returned an empty output".to_string()))
            } else {
                Ok(output)
            }
        })
        .map_err(|e| Error::task_execution(&task_name, e));
    (task_name, started_at, outcome)
}

/// Inputs of one dispatched task.
struct Dispatch {
    agent: Arc<Agent>,
    description: String,
    context: Vec<Arc<TaskResult>>,
}

pub struct ExecutionEngine {
    registry: AgentRegistry,
    options: EngineOptions,
    sinks: Vec<Box<dyn TranscriptSink>>,
    event_tx: Option<mpsc::Sender<EngineEvent>>,
}

impl ExecutionEngine {
    pub fn new(registry: AgentRegistry) -> Self {
        Self {
            registry,
            options: EngineOptions::default(),
            sinks: Vec::new(),
            event_tx: None,
        }
    }

    pub fn with_options(mut self, options: EngineOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_sink(mut self, sink: Box<dyn TranscriptSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn with_events(mut self, event_tx: mpsc::Sender<EngineEvent>) -> Self {
        self.event_tx = Some(event_tx);
        self
    }

    pub async fn run(&mut self, plan: ExecutionPlan) -> RunReport {
        self.run_with_id(plan, RunId::new()).await
    }

    pub async fn run_with_id(&mut self, mut plan: ExecutionPlan, run_id: RunId) -> RunReport {
        let mut transcript = RunTranscript::new(run_id.clone());
        ilog!(
            "Starting run {} ({} tasks, max_parallel={})",
            run_id,
            plan.len(),
            self.options.max_parallel
        );

        let mut outcome = self.begin_sinks(&transcript).await;
        if outcome.is_ok() {
            outcome = if self.options.max_parallel > 1 {
                self.run_parallel(&mut plan, &mut transcript).await
            } else {
                self.run_sequential(&mut plan, &mut transcript).await
            };
        }

        let finalized = match &outcome {
            Ok(()) => transcript.complete(),
            Err(e) => {
                let failed_task = match e {
                    Error::TaskExecution { task_name, .. } => Some(task_name.as_str()),
                    _ => None,
                };
                transcript.fail(failed_task, &e.to_string())
            }
        };
        if let Err(e) = finalized {
            ilog_error!("Failed to finalize transcript {}: {}", run_id, e);
        }

        for sink in self.sinks.iter_mut() {
            if let Err(e) = sink.finish(&transcript).await {
                ilog_error!("Transcript sink {} failed to finish: {}", sink.name(), e);
                if outcome.is_ok() {
                    outcome = Err(e);
                }
            }
        }

        let success = outcome.is_ok();
        match &outcome {
            Ok(()) => ilog!(
                "Run {} completed: {} task(s) recorded",
                run_id,
                transcript.len()
            ),
            Err(e) => ilog_error!(
                "Run {} failed after {} task(s): {}",
                run_id,
                transcript.len(),
                e
            ),
        }
        self.emit(EngineEvent::RunFinished {
            run_id: run_id.clone(),
            success,
        })
        .await;

        RunReport {
            run_id,
            plan,
            transcript,
            error: outcome.err(),
        }
    }

    async fn begin_sinks(&mut self, transcript: &RunTranscript) -> Result<()> {
        for sink in self.sinks.iter_mut() {
            sink.begin(transcript).await?;
        }
        Ok(())
    }

    async fn emit(&self, event: EngineEvent) {
        if let Some(tx) = &self.event_tx {
            let _ = tx.send(event).await;
        }
    }

    /// Resolve the agent and context of `name` and mark it running.
    fn prepare(&self, plan: &mut ExecutionPlan, name: &str) -> Result<Dispatch> {
        let context = plan.resolve_context(name)?;
        let node = plan
            .node_mut(name)
            .ok_or_else(|| Error::UnknownTask(name.to_string()))?;
        let agent = self
            .registry
            .get_agent(node.agent_role())
            .map_err(|e| Error::task_execution(name, e))?;
        node.start(context.clone());
        ilog_debug!(
            "Task {} context: [{}]",
            name,
            node.depends_on().join(", ")
        );
        Ok(Dispatch {
            agent,
            description: node.description.clone(),
            context,
        })
    }

    /// Record the outcome of one invocation.
    async fn settle(
        &mut self,
        plan: &mut ExecutionPlan,
        transcript: &mut RunTranscript,
        invocation: Invocation,
    ) -> Result<()> {
        let (name, started_at, outcome) = invocation;
        let node = plan
            .node_mut(&name)
            .ok_or_else(|| Error::UnknownTask(name.clone()))?;

        let output = match outcome {
            Ok(output) => output,
            Err(e) => {
                node.fail(&e.to_string());
                ilog_error!("{}", e);
                self.emit(EngineEvent::TaskFailed {
                    task_name: name,
                    error: e.to_string(),
                })
                .await;
                return Err(e);
            }
        };

        let role = node.agent_role().to_string();
        let result = Arc::new(TaskResult::new(&name, &role, output));
        if !node.complete(result.clone()) {
            return Err(Error::task_execution(&name, "result was already recorded"));
        }
        let context_refs = node.depends_on().to_vec();

        let record = transcript
            .append(&name, &role, context_refs, &result.output, started_at)?
            .clone();
        for sink in self.sinks.iter_mut() {
            sink.record(&record).await?;
        }

        ilog!(
            "Task {} completed by {} ({} chars): {}",
            name,
            role,
            result.output.len(),
            preview(&result.output, 80)
        );
        self.emit(EngineEvent::TaskCompleted {
            task_name: name,
            index: record.index,
        })
        .await;
        Ok(())
    }

    async fn announce(&self, plan: &ExecutionPlan, name: &str) {
        let agent_role = plan
            .node(name)
            .map(|n| n.agent_role().to_string())
            .unwrap_or_default();
        ilog!("Starting task {} ({})", name, agent_role);
        self.emit(EngineEvent::TaskStarted {
            task_name: name.to_string(),
            agent_role,
        })
        .await;
    }

    async fn run_sequential(
        &mut self,
        plan: &mut ExecutionPlan,
        transcript: &mut RunTranscript,
    ) -> Result<()> {
        let order: Vec<String> = plan.order().into_iter().map(str::to_string).collect();
        for name in order {
            let dispatch = self.prepare(plan, &name)?;
            self.announce(plan, &name).await;
            let invocation = invoke_task(
                dispatch.agent,
                name,
                dispatch.description,
                dispatch.context,
                self.options.task_timeout,
            )
            .await;
            self.settle(plan, transcript, invocation).await?;
        }
        Ok(())
    }

    async fn run_parallel(
        &mut self,
        plan: &mut ExecutionPlan,
        transcript: &mut RunTranscript,
    ) -> Result<()> {
        let mut completed: HashSet<String> = HashSet::new();
        let mut running: HashSet<String> = HashSet::new();
        let mut in_flight: JoinSet<Invocation> = JoinSet::new();

        let outcome = loop {
            let ready: Vec<String> = plan
                .ready_tasks(&completed)
                .into_iter()
                .filter(|name| !running.contains(*name))
                .map(str::to_string)
                .collect();

            let mut dispatch_error = None;
            for name in ready {
                if running.len() >= self.options.max_parallel {
                    break;
                }
                let dispatch = match self.prepare(plan, &name) {
                    Ok(dispatch) => dispatch,
                    Err(e) => {
                        dispatch_error = Some(e);
                        break;
                    }
                };
                self.announce(plan, &name).await;
                in_flight.spawn(invoke_task(
                    dispatch.agent,
                    name.clone(),
                    dispatch.description,
                    dispatch.context,
                    self.options.task_timeout,
                ));
                running.insert(name);
            }
            if let Some(e) = dispatch_error {
                break Err(e);
            }

            let Some(joined) = in_flight.join_next().await else {
                break Ok(());
            };
            let invocation = match joined {
                Ok(invocation) => invocation,
                Err(e) => break Err(Error::TaskJoin(e.to_string())),
            };
            let name = invocation.0.clone();
            running.remove(&name);
            if let Err(e) = self.settle(plan, transcript, invocation).await {
                break Err(e);
            }
            completed.insert(name);
        };

        if outcome.is_err() && !running.is_empty() {
            in_flight.abort_all();
            ilog_warn!("Aborting {} in-flight task(s)", running.len());
            for name in &running {
                if let Some(node) = plan.node_mut(name) {
                    node.fail("aborted after another task failed");
                }
            }
        }
        outcome
    }
}
