//! Metric recording helpers for the ETL orchestrator.
//!
//! Thin wrappers around the `metrics` macros so call sites stay free of
//! metric-name strings. Names follow Prometheus conventions.

pub mod probe {
    /// Record a successful connectivity probe
    pub fn success(backend: &str) {
        ::metrics::counter!("dwh_probe_success_total", "backend" => backend.to_string())
            .increment(1);
    }

    /// Record a probe that was skipped because none is wired for the backend
    pub fn skipped(backend: &str) {
        ::metrics::counter!("dwh_probe_skipped_total", "backend" => backend.to_string())
            .increment(1);
    }

    /// Record a failed connectivity probe
    pub fn failure(backend: &str) {
        ::metrics::counter!("dwh_probe_failure_total", "backend" => backend.to_string())
            .increment(1);
    }
}

pub mod stage {
    /// Record a stage that finished successfully
    pub fn succeeded(stage: &str) {
        ::metrics::counter!("dwh_stage_success_total", "stage" => stage.to_string()).increment(1);
    }

    /// Record a stage that exhausted its retry budget
    pub fn failed(stage: &str) {
        ::metrics::counter!("dwh_stage_failure_total", "stage" => stage.to_string()).increment(1);
    }

    /// Record a retry of a stage command
    pub fn retried(stage: &str) {
        ::metrics::counter!("dwh_stage_retries_total", "stage" => stage.to_string()).increment(1);
    }

    /// Record a stage skipped because an upstream stage failed
    pub fn skipped(stage: &str) {
        ::metrics::counter!("dwh_stage_skipped_total", "stage" => stage.to_string()).increment(1);
    }

    /// Record a stage with no implementation for the active backend
    pub fn not_implemented(stage: &str) {
        ::metrics::counter!("dwh_stage_not_implemented_total", "stage" => stage.to_string())
            .increment(1);
    }

    /// Record stage duration
    pub fn duration(stage: &str, secs: f64) {
        ::metrics::histogram!("dwh_stage_duration_seconds", "stage" => stage.to_string())
            .record(secs);
    }
}

pub mod run {
    /// Record the start of a pipeline run
    pub fn started(backend: &str) {
        ::metrics::counter!("dwh_runs_total", "backend" => backend.to_string()).increment(1);
    }

    /// Record a run that reached the completed state
    pub fn completed() {
        ::metrics::counter!("dwh_runs_completed_total").increment(1);
    }

    /// Record a run that reached the failed state
    pub fn failed() {
        ::metrics::counter!("dwh_runs_failed_total").increment(1);
    }

    /// Record total run duration
    pub fn duration(secs: f64) {
        ::metrics::histogram!("dwh_run_duration_seconds").record(secs);
    }
}

pub mod quality {
    /// Record a passing data-quality check
    pub fn passed() {
        ::metrics::counter!("dwh_quality_checks_passed_total").increment(1);
    }

    /// Record a failing data-quality check
    pub fn failed() {
        ::metrics::counter!("dwh_quality_checks_failed_total").increment(1);
    }
}
