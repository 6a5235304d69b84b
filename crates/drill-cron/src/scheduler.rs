//! Timer-driven job execution.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Local, Utc};
use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{CronError, CronSchedule};

/// Callback invoked on every occurrence with the boundary instant that fired.
pub type JobCallback = Arc<dyn Fn(DateTime<Utc>) -> BoxFuture<'static, ()> + Send + Sync>;

/// Something that can run callbacks on cron boundaries.
///
/// Several registrations may share one key; cancelling a key stops all of them.
pub trait SchedulerBackend: Send + Sync {
    fn register(
        &self,
        job_key: &str,
        schedule: &CronSchedule,
        callback: JobCallback,
    ) -> Result<(), CronError>;

    /// Cancel every job under `job_key`, returning how many were stopped.
    fn cancel_all(&self, job_key: &str) -> usize;

    fn job_count(&self, job_key: &str) -> usize;
}

/// Runs each registered job as its own tokio task.
///
/// Occurrences are computed in local time. Callbacks are spawned
/// fire-and-forget so a slow callback never delays the next boundary.
#[derive(Default)]
pub struct CronScheduler {
    jobs: Mutex<HashMap<String, Vec<CancellationToken>>>,
}

impl CronScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keys with at least one live job.
    pub fn job_keys(&self) -> Vec<String> {
        let jobs = self.jobs.lock().unwrap_or_else(PoisonError::into_inner);
        let mut keys: Vec<String> = jobs.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Cancel every job.
    pub fn shutdown(&self) {
        let mut jobs = self.jobs.lock().unwrap_or_else(PoisonError::into_inner);
        let count: usize = jobs.values().map(Vec::len).sum();
        for token in jobs.drain().flat_map(|(_, tokens)| tokens) {
            token.cancel();
        }
        info!("Cron scheduler stopped {count} jobs");
    }
}

impl SchedulerBackend for CronScheduler {
    fn register(
        &self,
        job_key: &str,
        schedule: &CronSchedule,
        callback: JobCallback,
    ) -> Result<(), CronError> {
        let cancel = CancellationToken::new();
        tokio::spawn(run_job(
            job_key.to_string(),
            schedule.clone(),
            callback,
            cancel.clone(),
        ));

        let mut jobs = self.jobs.lock().unwrap_or_else(PoisonError::into_inner);
        jobs.entry(job_key.to_string()).or_default().push(cancel);
        debug!(job_key, schedule = %schedule, "Registered cron job");
        Ok(())
    }

    fn cancel_all(&self, job_key: &str) -> usize {
        let mut jobs = self.jobs.lock().unwrap_or_else(PoisonError::into_inner);
        let tokens = jobs.remove(job_key).unwrap_or_default();
        for token in &tokens {
            token.cancel();
        }
        if !tokens.is_empty() {
            debug!(job_key, count = tokens.len(), "Cancelled cron jobs");
        }
        tokens.len()
    }

    fn job_count(&self, job_key: &str) -> usize {
        let jobs = self.jobs.lock().unwrap_or_else(PoisonError::into_inner);
        jobs.get(job_key).map_or(0, Vec::len)
    }
}

async fn run_job(
    job_key: String,
    schedule: CronSchedule,
    callback: JobCallback,
    cancel: CancellationToken,
) {
    let mut last_fired: Option<DateTime<Local>> = None;

    loop {
        // Never fire the same boundary twice, even if the clock lags behind.
        let now = Local::now();
        let reference = match last_fired {
            Some(fired) if fired > now => fired,
            _ => now,
        };

        let Some(next) = schedule.next_occurrence(&reference) else {
            warn!(job_key = %job_key, schedule = %schedule, "Schedule has no future occurrence, job stopped");
            return;
        };

        let wait = (next - Local::now()).to_std().unwrap_or_default();
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!(job_key = %job_key, "Cron job cancelled");
                return;
            }
            _ = tokio::time::sleep(wait) => {}
        }

        debug!(job_key = %job_key, fired_at = %next, "Cron job fired");
        tokio::spawn(callback(next.with_timezone(&Utc)));
        last_fired = Some(next);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn channel_callback(tx: mpsc::UnboundedSender<DateTime<Utc>>) -> JobCallback {
        Arc::new(move |fired_at| {
            let tx = tx.clone();
            Box::pin(async move {
                let _ = tx.send(fired_at);
            })
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_job_fires_on_boundary() {
        let scheduler = CronScheduler::new();
        let schedule = CronSchedule::parse("* * * * *").unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();

        scheduler
            .register("42:* * * * *", &schedule, channel_callback(tx))
            .unwrap();
        assert_eq!(scheduler.job_count("42:* * * * *"), 1);

        let fired_at = tokio::time::timeout(Duration::from_secs(120), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fired_at.timestamp() % 60, 0);

        assert_eq!(scheduler.cancel_all("42:* * * * *"), 1);
        assert_eq!(scheduler.job_count("42:* * * * *"), 0);
    }

    #[tokio::test]
    async fn test_cancel_all_counts_every_registration() {
        let scheduler = CronScheduler::new();
        let schedule = CronSchedule::parse("0 11 * * *").unwrap();
        let noop: JobCallback = Arc::new(|_| Box::pin(async {}));

        scheduler.register("a", &schedule, noop.clone()).unwrap();
        scheduler.register("a", &schedule, noop.clone()).unwrap();
        scheduler.register("b", &schedule, noop).unwrap();

        assert_eq!(scheduler.job_keys(), vec!["a".to_string(), "b".to_string()]);
        assert_eq!(scheduler.cancel_all("a"), 2);
        assert_eq!(scheduler.cancel_all("a"), 0);
        assert_eq!(scheduler.job_count("b"), 1);

        scheduler.shutdown();
        assert!(scheduler.job_keys().is_empty());
    }

    #[tokio::test]
    async fn test_impossible_schedule_stops_quietly() {
        let scheduler = CronScheduler::new();
        let schedule = CronSchedule::parse("0 0 31 2 *").unwrap();
        let noop: JobCallback = Arc::new(|_| Box::pin(async {}));
        scheduler.register("feb31", &schedule, noop).unwrap();
        // The job task exits on its own; its token stays until cancelled.
        assert_eq!(scheduler.cancel_all("feb31"), 1);
    }
}
