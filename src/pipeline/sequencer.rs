use crate::backend::{Layer, ProbeOutcome, WarehouseBackend};
use crate::error::Result;
use crate::notify::Notifier;
use crate::observability::metrics;
use crate::pipeline::quality_gate::QualityCheck;
use crate::pipeline::stage::{LayerExecutor, RetryPolicy};
use crate::pipeline::{PipelineRun, RunState, StageOutcome};
use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

/// Drives one run through the fixed chain:
/// connectivity check, start marker, bronze, silver, gold, quality gate,
/// end marker. Strictly sequential; a failed stage fails the run and every
/// stage after it is recorded as skipped, never as failed.
pub struct Sequencer {
    backend: Arc<dyn WarehouseBackend>,
    quality: Arc<dyn QualityCheck>,
    notifier: Arc<dyn Notifier>,
    retry: RetryPolicy,
    notify_on_retry: bool,
    cancel: Arc<AtomicBool>,
}

impl Sequencer {
    pub fn new(
        backend: Arc<dyn WarehouseBackend>,
        quality: Arc<dyn QualityCheck>,
        notifier: Arc<dyn Notifier>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            backend,
            quality,
            notifier,
            retry,
            notify_on_retry: false,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Also alert when a stage only succeeded after retries.
    pub fn with_retry_alerts(mut self, enabled: bool) -> Self {
        self.notify_on_retry = enabled;
        self
    }

    /// Installs an external cancellation flag. Cancellation stops issuing
    /// new stage invocations; work already handed to the warehouse runs to
    /// its natural completion.
    pub fn with_cancel_flag(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = cancel;
        self
    }

    #[instrument(skip(self, run), fields(run_id = %run.run_id, backend = %run.backend))]
    pub async fn execute(&self, run: &mut PipelineRun) {
        let t_run = std::time::Instant::now();
        metrics::run::started(run.backend.as_str());

        if !self.check_connectivity(run).await {
            metrics::run::duration(t_run.elapsed().as_secs_f64());
            return;
        }

        self.mark_succeeded(run, "start_etl", None);
        info!(logical_date = %run.logical_date, "Starting ETL process");

        for layer in Layer::ALL {
            if self.cancelled(run, layer.stage_name()) {
                metrics::run::duration(t_run.elapsed().as_secs_f64());
                return;
            }
            run.state = match layer {
                Layer::Bronze => RunState::Bronze,
                Layer::Silver => RunState::Silver,
                Layer::Gold => RunState::Gold,
            };
            self.set_outcome(run, layer.stage_name(), StageOutcome::Running);
            info!(stage = layer.stage_name(), "stage starting");

            let report = LayerExecutor::new(self.backend.as_ref(), self.retry)
                .run_layer(layer)
                .await;
            let failed = report.outcome == StageOutcome::Failed;
            if self.notify_on_retry && report.retries > 0 && !failed {
                self.notifier
                    .alert(
                        "stage recovered after retries",
                        &format!("{} needed {} retries", report.stage, report.retries),
                    )
                    .await;
            }
            if let Some(slot) = run.stage_mut(layer.stage_name()) {
                *slot = report;
            }
            if failed {
                self.fail_run(run, layer.stage_name());
                metrics::run::duration(t_run.elapsed().as_secs_f64());
                return;
            }
        }

        if self.cancelled(run, "run_data_quality_checks") {
            metrics::run::duration(t_run.elapsed().as_secs_f64());
            return;
        }
        self.run_quality_gate(run).await;
        if run.state == RunState::Failed {
            metrics::run::duration(t_run.elapsed().as_secs_f64());
            return;
        }

        self.mark_succeeded(run, "end_etl", None);
        run.state = RunState::Completed;
        run.finished_at = Some(Utc::now());
        metrics::run::completed();
        metrics::run::duration(t_run.elapsed().as_secs_f64());
        info!(logical_date = %run.logical_date, "ETL process completed");
    }

    /// Probe phase. Retries within the budget; a probe that stays down fails
    /// the run before any transformation is attempted.
    async fn check_connectivity(&self, run: &mut PipelineRun) -> bool {
        run.state = RunState::Probing;
        self.set_outcome(run, "check_db_connection", StageOutcome::Running);

        match self.probe_with_retry().await {
            Ok((ProbeOutcome::Alive, attempts)) => {
                metrics::probe::success(run.backend.as_str());
                if let Some(slot) = run.stage_mut("check_db_connection") {
                    slot.outcome = StageOutcome::Succeeded;
                    slot.attempts = attempts;
                    slot.retries = attempts - 1;
                }
                true
            }
            Ok((ProbeOutcome::Skipped, attempts)) => {
                // Recorded as its own outcome so "probed and alive" can never
                // be confused with "probe skipped".
                metrics::probe::skipped(run.backend.as_str());
                let detail = format!("probe not implemented for {}", run.backend);
                if let Some(slot) = run.stage_mut("check_db_connection") {
                    slot.outcome = StageOutcome::NotImplemented;
                    slot.attempts = attempts;
                    slot.detail = Some(detail);
                }
                true
            }
            Err(e) => {
                error!(backend = %run.backend, "connectivity check failed: {}", e);
                metrics::probe::failure(run.backend.as_str());
                if let Some(slot) = run.stage_mut("check_db_connection") {
                    slot.outcome = StageOutcome::Failed;
                    slot.attempts = self.retry.max_attempts();
                    slot.retries = self.retry.attempts;
                    slot.detail = Some(e.to_string());
                }
                self.notifier
                    .alert(
                        "connectivity check failed",
                        &format!("{} is unreachable: {}", run.backend, e),
                    )
                    .await;
                self.fail_run(run, "check_db_connection");
                false
            }
        }
    }

    async fn probe_with_retry(&self) -> Result<(ProbeOutcome, u32)> {
        let mut attempt = 1;
        loop {
            match self.backend.probe().await {
                Ok(outcome) => return Ok((outcome, attempt)),
                Err(e) if attempt <= self.retry.attempts => {
                    warn!(
                        attempt,
                        backoff_secs = self.retry.backoff.as_secs(),
                        error = %e,
                        "connectivity probe failed, retrying after backoff"
                    );
                    tokio::time::sleep(self.retry.backoff).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn run_quality_gate(&self, run: &mut PipelineRun) {
        run.state = RunState::QualityCheck;
        self.set_outcome(run, "run_data_quality_checks", StageOutcome::Running);

        match self.quality.validate().await {
            Ok(report) if report.passed => {
                metrics::quality::passed();
                self.mark_succeeded(run, "run_data_quality_checks", None);
            }
            Ok(report) => {
                metrics::quality::failed();
                let detail = format!(
                    "validation rejected the gold layer ({} diagnostic rows)",
                    report.diagnostics.len()
                );
                if let Some(slot) = run.stage_mut("run_data_quality_checks") {
                    slot.outcome = StageOutcome::Failed;
                    slot.attempts = 1;
                    slot.detail = Some(detail.clone());
                }
                self.notifier
                    .alert("data quality checks failed", &detail)
                    .await;
                self.fail_run(run, "run_data_quality_checks");
            }
            Err(e) => {
                metrics::quality::failed();
                if let Some(slot) = run.stage_mut("run_data_quality_checks") {
                    slot.outcome = StageOutcome::Failed;
                    slot.attempts = 1;
                    slot.detail = Some(e.to_string());
                }
                self.notifier
                    .alert("data quality checks failed", &e.to_string())
                    .await;
                self.fail_run(run, "run_data_quality_checks");
            }
        }
    }

    fn cancelled(&self, run: &mut PipelineRun, next_stage: &str) -> bool {
        if !self.cancel.load(Ordering::SeqCst) {
            return false;
        }
        warn!(next_stage, "run cancelled; no further stages will be issued");
        for slot in run
            .stages
            .iter_mut()
            .filter(|s| s.outcome == StageOutcome::Pending)
        {
            slot.outcome = StageOutcome::Skipped;
            slot.detail = Some("skipped: run cancelled".to_string());
            metrics::stage::skipped(&slot.stage);
        }
        run.state = RunState::Failed;
        run.finished_at = Some(Utc::now());
        metrics::run::failed();
        true
    }

    /// Marks every stage after the failure point as skipped and the run as
    /// failed. Skipped is a propagated consequence, not an error of its own,
    /// so it is never retried and never reported as failed.
    fn fail_run(&self, run: &mut PipelineRun, failed_stage: &str) {
        for slot in run
            .stages
            .iter_mut()
            .filter(|s| s.outcome == StageOutcome::Pending)
        {
            slot.outcome = StageOutcome::Skipped;
            slot.detail = Some(format!("skipped: upstream stage '{}' failed", failed_stage));
            metrics::stage::skipped(&slot.stage);
        }
        run.state = RunState::Failed;
        run.finished_at = Some(Utc::now());
        metrics::run::failed();
        error!(failed_stage, "run failed");
    }

    fn set_outcome(&self, run: &mut PipelineRun, stage: &str, outcome: StageOutcome) {
        if let Some(slot) = run.stage_mut(stage) {
            slot.outcome = outcome;
        }
    }

    fn mark_succeeded(&self, run: &mut PipelineRun, stage: &str, detail: Option<String>) {
        if let Some(slot) = run.stage_mut(stage) {
            slot.outcome = StageOutcome::Succeeded;
            slot.detail = detail;
        }
    }
}
