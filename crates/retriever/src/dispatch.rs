//! Bounded-concurrency task dispatcher for remote generation calls
//!
//! Executes a batch of independent completion tasks under a
//! concurrency gate, with per-task retry against the primary
//! executor and a one-time fallback executor. Individual failures
//! never abort the batch: the dispatcher always returns exactly one
//! result per task, in submission order.
//!
//! A task occupies its concurrency slot while backing off between
//! retries. That throttles throughput under high retry rates but
//! does not affect correctness.

use chainsight_common::errors::{AppError, Result};
use chainsight_common::llm::{ChatClient, ChatMessage, GenerationParams};
use futures::future::join_all;
use metrics::counter;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

/// One independent remote-call task. Immutable once submitted.
#[derive(Debug, Clone)]
pub struct Task {
    pub index: usize,
    pub messages: Vec<ChatMessage>,
    pub params: GenerationParams,
}

impl Task {
    pub fn new(index: usize, messages: Vec<ChatMessage>, params: GenerationParams) -> Self {
        Self {
            index,
            messages,
            params,
        }
    }
}

/// Outcome of one task
#[derive(Debug, Clone)]
pub enum TaskOutcome {
    /// Completion text plus the identifier of the executor that
    /// produced it
    Success { text: String, model: String },
    /// Terminal failure after retries and fallback
    Failure { reason: String },
}

/// Result for one task, index matching the submitted task
#[derive(Debug, Clone)]
pub struct TaskResult {
    pub index: usize,
    pub outcome: TaskOutcome,
}

impl TaskResult {
    pub fn text(&self) -> Option<&str> {
        match &self.outcome {
            TaskOutcome::Success { text, .. } => Some(text),
            TaskOutcome::Failure { .. } => None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, TaskOutcome::Success { .. })
    }
}

/// Outcome counts for one dispatched batch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    pub primary_success: usize,
    pub fallback_success: usize,
    pub failed: usize,
}

/// Dispatcher tuning
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Maximum tasks in flight at once
    pub max_concurrent: usize,

    /// Retries after the first primary attempt
    pub max_retries: u32,

    /// Backoff base; delay before retry n is base^(n-1) seconds
    pub backoff_base_secs: f64,

    /// Hard timeout on every individual remote call
    pub call_timeout: Duration,
}

impl DispatcherConfig {
    pub fn from_llm_config(config: &chainsight_common::config::LlmConfig) -> Self {
        Self {
            max_concurrent: config.max_concurrent,
            max_retries: config.max_retries,
            backoff_base_secs: config.backoff_base_secs,
            call_timeout: Duration::from_secs(config.call_timeout_secs),
        }
    }
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 10,
            max_retries: 3,
            backoff_base_secs: 2.0,
            call_timeout: Duration::from_secs(120),
        }
    }
}

/// Batch executor over a primary and a fallback chat client
pub struct Dispatcher {
    primary: Arc<dyn ChatClient>,
    fallback: Arc<dyn ChatClient>,
    config: DispatcherConfig,
}

impl Dispatcher {
    pub fn new(
        primary: Arc<dyn ChatClient>,
        fallback: Arc<dyn ChatClient>,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            primary,
            fallback,
            config,
        }
    }

    /// Execute all tasks and return one result per task, in
    /// submission order regardless of completion order.
    pub async fn dispatch(&self, tasks: Vec<Task>) -> Vec<TaskResult> {
        let total = tasks.len();
        let gate = Arc::new(Semaphore::new(self.config.max_concurrent));

        let futures = tasks.into_iter().map(|task| {
            let gate = Arc::clone(&gate);
            async move {
                let _permit = match gate.acquire().await {
                    Ok(permit) => permit,
                    Err(_) => {
                        return TaskResult {
                            index: task.index,
                            outcome: TaskOutcome::Failure {
                                reason: "concurrency gate closed".to_string(),
                            },
                        }
                    }
                };
                self.run_task(task).await
            }
        });

        // join_all yields results in future order, which is
        // submission order
        let results = join_all(futures).await;

        let summary = self.summarize(&results);
        counter!("dispatch_primary_success_total").increment(summary.primary_success as u64);
        counter!("dispatch_fallback_success_total").increment(summary.fallback_success as u64);
        counter!("dispatch_failed_total").increment(summary.failed as u64);
        info!(
            tasks = total,
            primary_success = summary.primary_success,
            fallback_success = summary.fallback_success,
            failed = summary.failed,
            "Dispatch batch complete"
        );

        results
    }

    /// Convenience for a single call through the same retry and
    /// fallback path
    pub async fn dispatch_one(
        &self,
        messages: Vec<ChatMessage>,
        params: GenerationParams,
    ) -> Result<String> {
        let mut results = self.dispatch(vec![Task::new(0, messages, params)]).await;
        match results.remove(0).outcome {
            TaskOutcome::Success { text, .. } => Ok(text),
            TaskOutcome::Failure { reason } => Err(AppError::Generation {
                model: self.primary.model_id().to_string(),
                message: reason,
            }),
        }
    }

    /// Count outcomes by executor identity
    pub fn summarize(&self, results: &[TaskResult]) -> DispatchSummary {
        let mut summary = DispatchSummary::default();
        for result in results {
            match &result.outcome {
                TaskOutcome::Success { model, .. } if model == self.primary.model_id() => {
                    summary.primary_success += 1
                }
                TaskOutcome::Success { .. } => summary.fallback_success += 1,
                TaskOutcome::Failure { .. } => summary.failed += 1,
            }
        }
        summary
    }

    async fn run_task(&self, task: Task) -> TaskResult {
        let primary_attempts = self.config.max_retries + 1;
        let mut last_error = String::new();
        let mut attempts_made = 0;

        for attempt in 0..primary_attempts {
            attempts_made = attempt + 1;
            if attempt > 0 {
                let delay = Duration::from_secs_f64(
                    self.config.backoff_base_secs.powi(attempt as i32 - 1),
                );
                debug!(task = task.index, attempt, delay_ms = delay.as_millis() as u64, "Backing off before retry");
                tokio::time::sleep(delay).await;
            }

            match self.attempt(self.primary.as_ref(), &task).await {
                Ok(text) => {
                    return TaskResult {
                        index: task.index,
                        outcome: TaskOutcome::Success {
                            text,
                            model: self.primary.model_id().to_string(),
                        },
                    }
                }
                Err(e) => {
                    warn!(
                        task = task.index,
                        attempt = attempt + 1,
                        max_attempts = primary_attempts,
                        error = %e,
                        "Primary attempt failed"
                    );
                    let transient = e.is_transient();
                    last_error = e.to_string();
                    // Retrying a non-transient failure cannot change
                    // the outcome; go straight to the fallback
                    if !transient {
                        break;
                    }
                }
            }
        }

        warn!(
            task = task.index,
            primary = self.primary.model_id(),
            fallback = self.fallback.model_id(),
            "Primary exhausted, invoking fallback"
        );

        match self.attempt(self.fallback.as_ref(), &task).await {
            Ok(text) => TaskResult {
                index: task.index,
                outcome: TaskOutcome::Success {
                    text,
                    model: self.fallback.model_id().to_string(),
                },
            },
            Err(e) => TaskResult {
                index: task.index,
                outcome: TaskOutcome::Failure {
                    reason: format!(
                        "primary exhausted after {} attempts ({}); fallback failed: {}",
                        attempts_made, last_error, e
                    ),
                },
            },
        }
    }

    /// One remote call with the hard per-call timeout. A blank
    /// completion counts as a failure.
    async fn attempt(&self, client: &dyn ChatClient, task: &Task) -> Result<String> {
        let call = client.complete(&task.messages, &task.params);
        match tokio::time::timeout(self.config.call_timeout, call).await {
            Ok(Ok(text)) if text.trim().is_empty() => Err(AppError::EmptyCompletion {
                model: client.model_id().to_string(),
            }),
            Ok(result) => result,
            Err(_) => Err(AppError::GenerationTimeout {
                timeout_ms: self.config.call_timeout.as_millis() as u64,
            }),
        }
    }
}
