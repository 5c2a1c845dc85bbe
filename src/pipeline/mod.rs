pub mod quality_gate;
pub mod run_log;
pub mod sequencer;
pub mod stage;

use crate::backend::BackendKind;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Fixed task order of the pipeline topology.
pub const STAGE_NAMES: [&str; 7] = [
    "check_db_connection",
    "start_etl",
    "bronze_layer",
    "silver_layer",
    "gold_layer",
    "run_data_quality_checks",
    "end_etl",
];

/// Position of a run in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    NotStarted,
    Probing,
    Bronze,
    Silver,
    Gold,
    QualityCheck,
    Completed,
    Failed,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Completed | RunState::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunState::NotStarted => "not_started",
            RunState::Probing => "probing",
            RunState::Bronze => "bronze",
            RunState::Silver => "silver",
            RunState::Gold => "gold",
            RunState::QualityCheck => "quality_check",
            RunState::Completed => "completed",
            RunState::Failed => "failed",
        }
    }
}

/// Outcome of one stage within a run.
///
/// `Skipped` and `NotImplemented` are deliberately distinct from `Failed`:
/// a skipped stage was never invoked, and a not-implemented stage is a
/// recorded no-op for the active backend, not work that happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageOutcome {
    Pending,
    Running,
    Succeeded,
    Failed,
    Skipped,
    NotImplemented,
}

impl StageOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageOutcome::Pending => "pending",
            StageOutcome::Running => "running",
            StageOutcome::Succeeded => "succeeded",
            StageOutcome::Failed => "failed",
            StageOutcome::Skipped => "skipped",
            StageOutcome::NotImplemented => "not_implemented",
        }
    }
}

/// Record of one stage's execution within a run.
#[derive(Debug, Clone, Serialize)]
pub struct StageReport {
    pub stage: String,
    pub outcome: StageOutcome,
    /// Command attempts actually issued, retries included.
    pub attempts: u32,
    /// How many of those attempts were retries.
    pub retries: u32,
    pub detail: Option<String>,
}

impl StageReport {
    fn pending(stage: &str) -> Self {
        Self {
            stage: stage.to_string(),
            outcome: StageOutcome::Pending,
            attempts: 0,
            retries: 0,
            detail: None,
        }
    }
}

/// One execution instance of the fixed pipeline topology.
///
/// Owns its stage outcomes exclusively; nothing here is shared across runs.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineRun {
    pub run_id: Uuid,
    pub pipeline: String,
    pub logical_date: NaiveDate,
    pub backend: BackendKind,
    pub state: RunState,
    pub stages: Vec<StageReport>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl PipelineRun {
    pub fn new(pipeline: &str, logical_date: NaiveDate, backend: BackendKind) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            pipeline: pipeline.to_string(),
            logical_date,
            backend,
            state: RunState::NotStarted,
            stages: STAGE_NAMES.iter().map(|s| StageReport::pending(s)).collect(),
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn stage(&self, name: &str) -> Option<&StageReport> {
        self.stages.iter().find(|s| s.stage == name)
    }

    pub fn stage_mut(&mut self, name: &str) -> Option<&mut StageReport> {
        self.stages.iter_mut().find(|s| s.stage == name)
    }

    /// The first stage that failed, if any. Later stages are skipped, never
    /// failed, so this is the true cause of a failed run.
    pub fn first_failure(&self) -> Option<&StageReport> {
        self.stages
            .iter()
            .find(|s| s.outcome == StageOutcome::Failed)
    }
}
