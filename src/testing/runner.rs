//! Scenario runner
//!
//! Drives every scenario through executor and matcher with a bounded number
//! of requests in flight. Each scenario yields exactly one result, stored in
//! an index-tagged slot so the report keeps definition order no matter
//! which request finishes first.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::FutureExt;
use indicatif::ProgressBar;
use serde::{Serialize, Serializer};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use super::config::{Scenario, Suite};
use super::executor::Executor;
use super::matcher::{self, Failure, Outcome};

/// Result of running one scenario
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionResult {
    /// Position of the scenario in the suite
    pub index: usize,
    pub name: String,
    pub outcome: Outcome,
    pub matched: bool,
    /// Absent when no response was received
    pub actual_status: Option<u16>,
    pub actual_body: Option<String>,
    #[serde(rename = "duration_ms", serialize_with = "as_millis")]
    pub duration: Duration,
    pub failures: Vec<Failure>,
}

impl ExecutionResult {
    fn errored(index: usize, name: &str, failure: Failure, duration: Duration) -> Self {
        Self {
            index,
            name: name.to_string(),
            outcome: Outcome::Errored,
            matched: false,
            actual_status: None,
            actual_body: None,
            duration,
            failures: vec![failure],
        }
    }
}

/// Aggregated results of one run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub suite: String,
    pub results: Vec<ExecutionResult>,
    pub total_passed: usize,
    pub total_failed: usize,
    #[serde(rename = "duration_ms", serialize_with = "as_millis")]
    pub duration: Duration,
}

impl RunReport {
    /// Build a report, deriving the counts from the results
    pub fn new(suite: impl Into<String>, results: Vec<ExecutionResult>, duration: Duration) -> Self {
        let total_passed = results.iter().filter(|r| r.matched).count();
        let total_failed = results.len() - total_passed;
        Self {
            suite: suite.into(),
            results,
            total_passed,
            total_failed,
            duration,
        }
    }

    /// True iff every scenario matched
    pub fn success(&self) -> bool {
        self.total_failed == 0
    }
}

fn as_millis<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(duration.as_millis() as u64)
}

/// How a run is scheduled
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Maximum requests in flight, 1 means sequential
    pub concurrency: usize,
    /// Abort whatever is still pending or executing after this long
    pub run_timeout: Option<Duration>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            concurrency: 1,
            run_timeout: None,
        }
    }
}

/// Executes suites against a single executor
pub struct ScenarioRunner {
    executor: Arc<dyn Executor>,
    options: RunOptions,
    progress: Option<ProgressBar>,
}

impl ScenarioRunner {
    pub fn new(executor: Arc<dyn Executor>, options: RunOptions) -> Self {
        Self {
            executor,
            options,
            progress: None,
        }
    }

    /// Tick `bar` once per finished scenario
    pub fn with_progress(mut self, bar: ProgressBar) -> Self {
        self.progress = Some(bar);
        self
    }

    /// Run every scenario in `suite`; never fails as a whole
    pub async fn run(&self, suite: &Suite) -> RunReport {
        let started = Instant::now();
        let total = suite.scenarios.len();
        let concurrency = self
            .options
            .concurrency
            .min(total)
            .min(Semaphore::MAX_PERMITS)
            .max(1);

        tracing::info!(
            suite = %suite.name,
            scenarios = total,
            concurrency,
            "Starting run"
        );

        let semaphore = Arc::new(Semaphore::new(concurrency));
        let mut slots: Vec<Option<ExecutionResult>> = (0..total).map(|_| None).collect();
        let mut tasks = JoinSet::new();

        for (index, scenario) in suite.scenarios.iter().enumerate() {
            let scenario = Arc::clone(scenario);
            let executor = Arc::clone(&self.executor);
            let semaphore = Arc::clone(&semaphore);

            tasks.spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(e) => {
                        let failure = Failure::new("harness", "an execution slot", e.to_string());
                        return (
                            index,
                            ExecutionResult::errored(index, &scenario.name, failure, Duration::ZERO),
                        );
                    }
                };

                let started = Instant::now();
                let result = AssertUnwindSafe(execute_one(index, &scenario, executor.as_ref()))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|panic| {
                        let message = panic_message(panic.as_ref());
                        tracing::error!(
                            scenario = %scenario.name,
                            index,
                            panic = %message,
                            "Harness failure while executing scenario"
                        );
                        let failure =
                            Failure::new("harness", "scenario to complete", format!("panic: {}", message));
                        ExecutionResult::errored(index, &scenario.name, failure, started.elapsed())
                    });
                (index, result)
            });
        }

        let deadline = self
            .options
            .run_timeout
            .map(|timeout| tokio::time::Instant::now() + timeout);
        let mut timed_out = false;

        loop {
            let next = match deadline {
                Some(deadline) => match tokio::time::timeout_at(deadline, tasks.join_next()).await {
                    Ok(next) => next,
                    Err(_) => {
                        timed_out = true;
                        break;
                    }
                },
                None => tasks.join_next().await,
            };

            match next {
                Some(Ok((index, result))) => self.store(&mut slots, index, result),
                Some(Err(e)) => {
                    tracing::error!(error = %e, "Scenario task ended without a result");
                }
                None => break,
            }
        }

        if timed_out {
            tracing::warn!(
                pending = slots.iter().filter(|s| s.is_none()).count(),
                "Run timeout reached, aborting remaining scenarios"
            );
            tasks.abort_all();
            // Keep anything that finished while the abort was in flight
            while let Some(next) = tasks.join_next().await {
                if let Ok((index, result)) = next {
                    self.store(&mut slots, index, result);
                }
            }
        }

        let elapsed = started.elapsed();
        let results = slots
            .into_iter()
            .zip(&suite.scenarios)
            .enumerate()
            .map(|(index, (slot, scenario))| {
                slot.unwrap_or_else(|| unfinished(index, scenario, timed_out, elapsed))
            })
            .collect();

        if let Some(bar) = &self.progress {
            bar.finish_and_clear();
        }

        let report = RunReport::new(suite.name.clone(), results, elapsed);
        tracing::info!(
            passed = report.total_passed,
            failed = report.total_failed,
            elapsed_ms = elapsed.as_millis() as u64,
            "Run finished"
        );
        report
    }

    fn store(&self, slots: &mut [Option<ExecutionResult>], index: usize, result: ExecutionResult) {
        if let Some(bar) = &self.progress {
            bar.set_message(result.name.clone());
            bar.inc(1);
        }
        if let Some(slot) = slots.get_mut(index) {
            *slot = Some(result);
        }
    }
}

/// Pending -> Executing -> {Matched, Mismatched, Errored}
async fn execute_one(index: usize, scenario: &Scenario, executor: &dyn Executor) -> ExecutionResult {
    let started = Instant::now();
    tracing::debug!(scenario = %scenario.name, index, "Executing scenario");

    match executor.execute(&scenario.request).await {
        Ok(response) => {
            let matched = matcher::evaluate(scenario, &response);
            tracing::debug!(
                scenario = %scenario.name,
                status = response.status,
                outcome = ?matched.outcome,
                "Scenario finished"
            );
            ExecutionResult {
                index,
                name: scenario.name.clone(),
                outcome: matched.outcome,
                matched: matched.outcome == Outcome::Matched,
                actual_status: Some(response.status),
                actual_body: Some(response.body),
                duration: started.elapsed(),
                failures: matched.failures,
            }
        }
        Err(e) => {
            tracing::warn!(scenario = %scenario.name, error = %e, "Transport failure");
            let failure = Failure::new(
                "transport",
                format!("HTTP {} response", scenario.expectation.status),
                e.to_string(),
            );
            ExecutionResult::errored(index, &scenario.name, failure, started.elapsed())
        }
    }
}

fn unfinished(index: usize, scenario: &Scenario, timed_out: bool, elapsed: Duration) -> ExecutionResult {
    let failure = if timed_out {
        Failure::new("run", "completion before the run timeout", "run timeout")
    } else {
        Failure::new("harness", "scenario to complete", "task ended without a result")
    };
    ExecutionResult::errored(index, &scenario.name, failure, elapsed)
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
