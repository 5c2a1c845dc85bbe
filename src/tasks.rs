use crate::backend::create_backend;
use crate::config::Config;
use crate::error::Result;
use crate::notify::create_notifier;
use crate::pipeline::quality_gate::ProcessQualityCheck;
use crate::pipeline::run_log::RunLog;
use crate::pipeline::sequencer::Sequencer;
use crate::pipeline::stage::RetryPolicy;
use crate::pipeline::PipelineRun;
use chrono::NaiveDate;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::info;

pub struct TriggerParams {
    pub logical_date: NaiveDate,
    /// Re-run an interval that already has a completed run.
    pub force: bool,
    pub cancel: Arc<AtomicBool>,
}

pub enum TriggerOutcome {
    Ran(PipelineRun),
    AlreadySucceeded,
}

/// Wires one pipeline run from configuration and drives it to a terminal
/// state. The backend selection, retry budget, quality command, and alert
/// channel all come from the config; nothing is ambient.
pub async fn trigger_run(config: &Config, params: TriggerParams) -> Result<TriggerOutcome> {
    let run_log = RunLog::open_at_root(&config.pipeline.data_root)?;
    if !params.force
        && run_log.has_succeeded(&config.pipeline.name, params.logical_date)?
    {
        return Ok(TriggerOutcome::AlreadySucceeded);
    }

    let kind = config.backend_kind();
    let backend = Arc::from(create_backend(kind, config));
    let quality = Arc::new(ProcessQualityCheck::from_config(&config.quality));
    let notifier = create_notifier(&config.notify, &config.pipeline.name);
    let retry = RetryPolicy {
        attempts: config.retry.attempts,
        backoff: config.retry_backoff(),
    };

    let mut run = PipelineRun::new(&config.pipeline.name, params.logical_date, kind);
    info!(
        run_id = %run.run_id,
        logical_date = %params.logical_date,
        backend = %kind,
        owner = %config.pipeline.owner,
        force = params.force,
        "triggering pipeline run"
    );

    let sequencer = Sequencer::new(backend, quality, notifier, retry)
        .with_retry_alerts(config.notify.on_retry)
        .with_cancel_flag(params.cancel);
    sequencer.execute(&mut run).await;

    run_log.record_run(&run)?;
    Ok(TriggerOutcome::Ran(run))
}
