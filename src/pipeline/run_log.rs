use crate::error::Result;
use crate::pipeline::PipelineRun;
use chrono::NaiveDate;
use rusqlite::{params, Connection};
use std::path::Path;

/// Local archive of pipeline runs and their stage outcomes.
///
/// Also the scheduler's memory: an interval with a completed run is never
/// triggered again unless forced, and missed past intervals are never
/// backfilled.
pub struct RunLog {
    conn: Connection,
}

impl RunLog {
    pub fn open_at_root<P: AsRef<Path>>(data_root: P) -> Result<Self> {
        let db_path = data_root.as_ref().join("run_log").join("meta.db");
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(db_path)?;
        conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;
            CREATE TABLE IF NOT EXISTS pipeline_runs (
                run_id        TEXT PRIMARY KEY,
                pipeline      TEXT NOT NULL,
                logical_date  TEXT NOT NULL,
                backend       TEXT NOT NULL,
                state         TEXT NOT NULL,
                started_at    INTEGER NOT NULL,
                finished_at   INTEGER
            );
            CREATE TABLE IF NOT EXISTS stage_outcomes (
                run_id    TEXT NOT NULL,
                position  INTEGER NOT NULL,
                stage     TEXT NOT NULL,
                outcome   TEXT NOT NULL,
                attempts  INTEGER NOT NULL,
                detail    TEXT,
                PRIMARY KEY (run_id, position)
            );
            "#,
        )?;
        Ok(Self { conn })
    }

    /// Archives a terminated run, stage outcomes included.
    pub fn record_run(&self, run: &PipelineRun) -> Result<()> {
        let run_id = run.run_id.to_string();
        self.conn.execute(
            "INSERT OR REPLACE INTO pipeline_runs
             (run_id, pipeline, logical_date, backend, state, started_at, finished_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                run_id,
                run.pipeline,
                run.logical_date.to_string(),
                run.backend.as_str(),
                run.state.as_str(),
                run.started_at.timestamp(),
                run.finished_at.map(|t| t.timestamp()),
            ],
        )?;
        self.conn
            .execute("DELETE FROM stage_outcomes WHERE run_id = ?1", params![run_id])?;
        for (position, stage) in run.stages.iter().enumerate() {
            self.conn.execute(
                "INSERT INTO stage_outcomes (run_id, position, stage, outcome, attempts, detail)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    run_id,
                    position as i64,
                    stage.stage,
                    stage.outcome.as_str(),
                    stage.attempts as i64,
                    stage.detail,
                ],
            )?;
        }
        Ok(())
    }

    /// Whether this interval already has a completed run.
    pub fn has_succeeded(&self, pipeline: &str, logical_date: NaiveDate) -> Result<bool> {
        let mut stmt = self.conn.prepare(
            "SELECT 1 FROM pipeline_runs
             WHERE pipeline = ?1 AND logical_date = ?2 AND state = 'completed'
             LIMIT 1",
        )?;
        let mut rows = stmt.query(params![pipeline, logical_date.to_string()])?;
        Ok(rows.next()?.is_some())
    }

    pub fn last_success_date(&self, pipeline: &str) -> Result<Option<NaiveDate>> {
        let mut stmt = self.conn.prepare(
            "SELECT logical_date FROM pipeline_runs
             WHERE pipeline = ?1 AND state = 'completed'
             ORDER BY logical_date DESC
             LIMIT 1",
        )?;
        let mut rows = stmt.query(params![pipeline])?;
        if let Some(row) = rows.next()? {
            let date: String = row.get(0)?;
            Ok(date.parse().ok())
        } else {
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BackendKind;
    use crate::pipeline::{RunState, StageOutcome};
    use chrono::Utc;
    use tempfile::tempdir;

    fn finished_run(date: NaiveDate, state: RunState) -> PipelineRun {
        let mut run = PipelineRun::new("data_warehouse_etl", date, BackendKind::Postgres);
        run.state = state;
        run.finished_at = Some(Utc::now());
        if state == RunState::Completed {
            for stage in &mut run.stages {
                stage.outcome = StageOutcome::Succeeded;
            }
        }
        run
    }

    #[test]
    fn test_record_and_query_success() {
        let dir = tempdir().unwrap();
        let log = RunLog::open_at_root(dir.path()).unwrap();
        let date = NaiveDate::from_ymd_opt(2025, 6, 17).unwrap();

        assert!(!log.has_succeeded("data_warehouse_etl", date).unwrap());
        log.record_run(&finished_run(date, RunState::Completed)).unwrap();
        assert!(log.has_succeeded("data_warehouse_etl", date).unwrap());
        assert_eq!(
            log.last_success_date("data_warehouse_etl").unwrap(),
            Some(date)
        );
        // other pipelines are unaffected
        assert!(!log.has_succeeded("other_pipeline", date).unwrap());
    }

    #[test]
    fn test_failed_run_does_not_mark_the_interval_done() {
        let dir = tempdir().unwrap();
        let log = RunLog::open_at_root(dir.path()).unwrap();
        let date = NaiveDate::from_ymd_opt(2025, 6, 18).unwrap();

        log.record_run(&finished_run(date, RunState::Failed)).unwrap();
        assert!(!log.has_succeeded("data_warehouse_etl", date).unwrap());
        assert_eq!(log.last_success_date("data_warehouse_etl").unwrap(), None);
    }

    #[test]
    fn test_rerecording_a_run_replaces_its_stages() {
        let dir = tempdir().unwrap();
        let log = RunLog::open_at_root(dir.path()).unwrap();
        let date = NaiveDate::from_ymd_opt(2025, 6, 19).unwrap();

        let mut run = finished_run(date, RunState::Failed);
        log.record_run(&run).unwrap();
        run.state = RunState::Completed;
        log.record_run(&run).unwrap();
        assert!(log.has_succeeded("data_warehouse_etl", date).unwrap());
    }
}
