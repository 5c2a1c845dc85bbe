use crate::config::Config;
use crate::error::Result;
use crate::tasks::{trigger_run, TriggerOutcome, TriggerParams};
use chrono::{DateTime, Duration as ChronoDuration, NaiveTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// The next daily trigger strictly after `now`, at minute zero of the
/// configured hour (UTC).
pub fn next_trigger_after(now: DateTime<Utc>, hour: u32) -> DateTime<Utc> {
    let at = NaiveTime::from_hms_opt(hour, 0, 0).unwrap_or(NaiveTime::MIN);
    let candidate = now.date_naive().and_time(at).and_utc();
    if candidate > now {
        candidate
    } else {
        candidate + ChronoDuration::days(1)
    }
}

/// Resident daily scheduler. One run per interval, no catchup: a missed past
/// interval is never triggered retroactively, the loop only ever sleeps
/// toward the next future occurrence.
pub struct Scheduler {
    config: Config,
    cancel: Arc<AtomicBool>,
}

impl Scheduler {
    pub fn new(config: Config, cancel: Arc<AtomicBool>) -> Self {
        Self { config, cancel }
    }

    pub async fn run_forever(&self) -> Result<()> {
        info!(
            pipeline = %self.config.pipeline.name,
            hour = self.config.schedule.hour,
            "scheduler started; triggering daily"
        );
        loop {
            let now = Utc::now();
            let next = next_trigger_after(now, self.config.schedule.hour);
            info!(next = %next, "sleeping until next trigger");
            let wait = (next - now).to_std().unwrap_or(Duration::ZERO);
            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = self.wait_for_cancel() => {
                    info!("scheduler stopped");
                    return Ok(());
                }
            }

            let params = TriggerParams {
                logical_date: next.date_naive(),
                force: false,
                cancel: self.cancel.clone(),
            };
            match trigger_run(&self.config, params).await {
                Ok(TriggerOutcome::Ran(run)) => {
                    info!(run_id = %run.run_id, state = run.state.as_str(), "scheduled run finished");
                }
                Ok(TriggerOutcome::AlreadySucceeded) => {
                    info!(logical_date = %next.date_naive(), "interval already has a completed run; skipping");
                }
                Err(e) => {
                    warn!("scheduled run could not be triggered: {}", e);
                }
            }
        }
    }

    async fn wait_for_cancel(&self) {
        while !self.cancel.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_trigger_later_today() {
        let now = Utc.with_ymd_and_hms(2025, 6, 17, 0, 30, 0).unwrap();
        let next = next_trigger_after(now, 2);
        assert_eq!(next, Utc.with_ymd_and_hms(2025, 6, 17, 2, 0, 0).unwrap());
    }

    #[test]
    fn test_trigger_rolls_to_tomorrow() {
        let now = Utc.with_ymd_and_hms(2025, 6, 17, 2, 0, 0).unwrap();
        let next = next_trigger_after(now, 2);
        assert_eq!(next, Utc.with_ymd_and_hms(2025, 6, 18, 2, 0, 0).unwrap());
    }

    #[test]
    fn test_trigger_is_always_in_the_future() {
        let now = Utc.with_ymd_and_hms(2025, 6, 17, 23, 59, 59).unwrap();
        let next = next_trigger_after(now, 2);
        assert!(next > now);
        assert_eq!(next.date_naive(), now.date_naive() + ChronoDuration::days(1));
    }
}
