use crate::backend::{Layer, SqlCommand, StagePlan, WarehouseBackend};
use crate::error::{EtlError, Result};
use crate::observability::metrics;
use crate::pipeline::{StageOutcome, StageReport};
use std::time::Duration;
use tracing::{info, warn};

/// Retry behaviour shared by the connectivity probe and every stage command.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 1,
            backoff: Duration::from_secs(300),
        }
    }
}

impl RetryPolicy {
    /// Total invocations allowed, the first attempt included.
    pub fn max_attempts(&self) -> u32 {
        self.attempts + 1
    }
}

/// Runs one layer's command plan against the active backend and translates
/// the outcome into a stage report.
pub struct LayerExecutor<'a> {
    backend: &'a dyn WarehouseBackend,
    retry: RetryPolicy,
}

impl<'a> LayerExecutor<'a> {
    pub fn new(backend: &'a dyn WarehouseBackend, retry: RetryPolicy) -> Self {
        Self { backend, retry }
    }

    pub async fn run_layer(&self, layer: Layer) -> StageReport {
        let stage = layer.stage_name();
        let t_stage = std::time::Instant::now();

        let commands = match self.backend.plan(layer) {
            StagePlan::Sql(commands) => commands,
            StagePlan::NotWired { procedure } => {
                warn!(
                    stage,
                    backend = %self.backend.kind(),
                    procedure,
                    "stage not implemented for this backend; recording explicit no-op"
                );
                metrics::stage::not_implemented(stage);
                return StageReport {
                    stage: stage.to_string(),
                    outcome: StageOutcome::NotImplemented,
                    attempts: 0,
                    retries: 0,
                    detail: Some(format!(
                        "not implemented for {}: {}",
                        self.backend.kind(),
                        procedure
                    )),
                };
            }
        };

        let mut attempts_used = 0;
        let mut retries_used = 0;
        for command in &commands {
            match self.execute_with_retry(stage, command).await {
                Ok(attempts) => {
                    attempts_used += attempts;
                    retries_used += attempts - 1;
                }
                Err(e) => {
                    metrics::stage::failed(stage);
                    metrics::stage::duration(stage, t_stage.elapsed().as_secs_f64());
                    return StageReport {
                        stage: stage.to_string(),
                        outcome: StageOutcome::Failed,
                        attempts: attempts_used + self.retry.max_attempts(),
                        retries: retries_used + self.retry.attempts,
                        detail: Some(e.to_string()),
                    };
                }
            }
        }

        info!(stage, attempts = attempts_used, "stage completed");
        metrics::stage::succeeded(stage);
        metrics::stage::duration(stage, t_stage.elapsed().as_secs_f64());
        StageReport {
            stage: stage.to_string(),
            outcome: StageOutcome::Succeeded,
            attempts: attempts_used,
            retries: retries_used,
            detail: None,
        }
    }

    /// Executes one command, retrying up to the budget. Each attempt gets a
    /// fresh connection from the backend.
    async fn execute_with_retry(&self, stage: &str, command: &SqlCommand) -> Result<u32> {
        let mut attempt = 1;
        loop {
            match self.backend.execute(command).await {
                Ok(()) => return Ok(attempt),
                Err(e) if attempt <= self.retry.attempts => {
                    warn!(
                        stage,
                        label = command.label,
                        attempt,
                        backoff_secs = self.retry.backoff.as_secs(),
                        error = %e,
                        "stage command failed, retrying after backoff"
                    );
                    metrics::stage::retried(stage);
                    tokio::time::sleep(self.retry.backoff).await;
                    attempt += 1;
                }
                Err(e) => {
                    return Err(EtlError::Stage {
                        stage: stage.to_string(),
                        message: format!("{} failed after {} attempts: {}", command.label, attempt, e),
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendKind, ProbeOutcome};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};

    /// Backend that fails a configurable number of times before succeeding.
    struct FlakyBackend {
        failures_remaining: AtomicU32,
        executed: Arc<Mutex<Vec<&'static str>>>,
    }

    impl FlakyBackend {
        fn failing_times(n: u32) -> Self {
            Self {
                failures_remaining: AtomicU32::new(n),
                executed: Arc::new(Mutex::new(Vec::new())),
            }
        }
    }

    #[async_trait]
    impl WarehouseBackend for FlakyBackend {
        fn kind(&self) -> BackendKind {
            BackendKind::Postgres
        }

        async fn probe(&self) -> Result<ProbeOutcome> {
            Ok(ProbeOutcome::Alive)
        }

        fn plan(&self, layer: Layer) -> StagePlan {
            match layer {
                Layer::Silver => StagePlan::Sql(vec![SqlCommand {
                    label: "load_silver",
                    sql: "SELECT silver.load_silver();",
                }]),
                _ => StagePlan::NotWired {
                    procedure: "BEGIN noop; END;",
                },
            }
        }

        async fn execute(&self, command: &SqlCommand) -> Result<()> {
            self.executed.lock().unwrap().push(command.label);
            let remaining = self.failures_remaining.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failures_remaining.store(remaining - 1, Ordering::SeqCst);
                return Err(EtlError::Stage {
                    stage: command.label.to_string(),
                    message: "synthetic failure".to_string(),
                });
            }
            Ok(())
        }
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            attempts: 1,
            backoff: Duration::from_millis(0),
        }
    }

    #[tokio::test]
    async fn test_command_succeeds_first_try() {
        let backend = FlakyBackend::failing_times(0);
        let report = LayerExecutor::new(&backend, fast_retry())
            .run_layer(Layer::Silver)
            .await;
        assert_eq!(report.outcome, StageOutcome::Succeeded);
        assert_eq!(report.attempts, 1);
    }

    #[tokio::test]
    async fn test_command_retries_then_succeeds() {
        let backend = FlakyBackend::failing_times(1);
        let report = LayerExecutor::new(&backend, fast_retry())
            .run_layer(Layer::Silver)
            .await;
        assert_eq!(report.outcome, StageOutcome::Succeeded);
        assert_eq!(report.attempts, 2);
        assert_eq!(backend.executed.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_exhausted_budget_fails_the_stage() {
        let backend = FlakyBackend::failing_times(5);
        let report = LayerExecutor::new(&backend, fast_retry())
            .run_layer(Layer::Silver)
            .await;
        assert_eq!(report.outcome, StageOutcome::Failed);
        // budget of 1 retry means exactly two invocations
        assert_eq!(backend.executed.lock().unwrap().len(), 2);
        assert!(report.detail.unwrap().contains("load_silver"));
    }

    #[tokio::test]
    async fn test_unwired_layer_is_an_explicit_noop() {
        let backend = FlakyBackend::failing_times(0);
        let report = LayerExecutor::new(&backend, fast_retry())
            .run_layer(Layer::Bronze)
            .await;
        assert_eq!(report.outcome, StageOutcome::NotImplemented);
        assert_eq!(report.attempts, 0);
        assert!(backend.executed.lock().unwrap().is_empty());
        assert!(report.detail.unwrap().contains("not implemented"));
    }
}
