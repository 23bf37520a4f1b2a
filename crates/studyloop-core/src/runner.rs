//! Background scheduling loop.
//!
//! One runner per datastore. It wakes every `tick_secs`, generates the daily
//! review queue once per local calendar day (at or after `generation_hour`)
//! and sends due-review reminders during `reminder_hour`. The last run day of
//! each job is kept in the `kv` table so a restart never repeats a day.
//!
//! The stop signal is only observed between wake-ups; a tick that has started
//! runs to completion.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, FixedOffset, NaiveDate, Timelike};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::error::Result;
use crate::review::{GenerationSummary, ReminderSummary};
use crate::service::StudyCore;
use crate::storage::RunnerConfig;

pub const LAST_GENERATION_KEY: &str = "runner.last_generation_date";
pub const LAST_REMINDER_KEY: &str = "runner.last_reminder_date";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunnerState {
    Stopped,
    Starting,
    Running,
}

/// What one wake-up did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickReport {
    pub local_time: DateTime<FixedOffset>,
    pub generated: Option<GenerationSummary>,
    pub reminders: Option<ReminderSummary>,
}

struct Lifecycle {
    state: RunnerState,
    stop_tx: Option<watch::Sender<bool>>,
    handle: Option<JoinHandle<()>>,
}

pub struct PeriodicRunner {
    core: Arc<StudyCore>,
    config: RunnerConfig,
    lifecycle: Arc<Mutex<Lifecycle>>,
}

impl PeriodicRunner {
    pub fn new(core: Arc<StudyCore>, config: RunnerConfig) -> Self {
        Self {
            core,
            config,
            lifecycle: Arc::new(Mutex::new(Lifecycle {
                state: RunnerState::Stopped,
                stop_tx: None,
                handle: None,
            })),
        }
    }

    pub fn state(&self) -> RunnerState {
        self.lifecycle
            .lock()
            .map(|l| l.state)
            .unwrap_or(RunnerState::Stopped)
    }

    /// Spawn the loop on the current tokio runtime.
    ///
    /// Starting a runner that is already starting or running is a no-op.
    /// Returns the state after the call.
    pub fn start(&self) -> RunnerState {
        let Ok(mut lifecycle) = self.lifecycle.lock() else {
            return RunnerState::Stopped;
        };
        if lifecycle.state != RunnerState::Stopped {
            return lifecycle.state;
        }
        if !self.config.enabled {
            tracing::info!("periodic runner disabled by config");
            return RunnerState::Stopped;
        }

        let (stop_tx, stop_rx) = watch::channel(false);
        lifecycle.state = RunnerState::Starting;
        lifecycle.stop_tx = Some(stop_tx);
        lifecycle.handle = Some(tokio::spawn(run_loop(
            Arc::clone(&self.core),
            self.config.clone(),
            Arc::clone(&self.lifecycle),
            stop_rx,
        )));
        tracing::info!(tick_secs = self.config.tick_secs, "periodic runner starting");
        lifecycle.state
    }

    /// Signal the loop to stop and wait for it to exit.
    ///
    /// Stopping a stopped runner is a no-op.
    pub async fn stop(&self) {
        let handle = {
            let Ok(mut lifecycle) = self.lifecycle.lock() else {
                return;
            };
            if lifecycle.state == RunnerState::Stopped {
                return;
            }
            lifecycle.state = RunnerState::Stopped;
            if let Some(tx) = lifecycle.stop_tx.take() {
                let _ = tx.send(true);
            }
            lifecycle.handle.take()
        };
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::warn!("periodic runner task ended abnormally: {e}");
            }
        }
        tracing::info!("periodic runner stopped");
    }

    /// Run one wake-up synchronously.
    pub fn run_tick(&self) -> Result<TickReport> {
        tick(&self.core, &self.config)
    }
}

async fn run_loop(
    core: Arc<StudyCore>,
    config: RunnerConfig,
    lifecycle: Arc<Mutex<Lifecycle>>,
    mut stop_rx: watch::Receiver<bool>,
) {
    if let Ok(mut l) = lifecycle.lock() {
        if l.state == RunnerState::Starting {
            l.state = RunnerState::Running;
        }
    }
    tracing::info!("periodic runner running");

    loop {
        if *stop_rx.borrow() {
            break;
        }

        let tick_core = Arc::clone(&core);
        let tick_config = config.clone();
        let outcome = tokio::task::spawn_blocking(move || tick(&tick_core, &tick_config)).await;
        let delay = match outcome {
            Ok(Ok(_)) => config.tick_secs,
            Ok(Err(e)) => {
                tracing::error!(retry_secs = config.retry_secs, "runner tick failed: {e}");
                config.retry_secs
            }
            Err(e) => {
                tracing::error!(retry_secs = config.retry_secs, "runner tick panicked: {e}");
                config.retry_secs
            }
        };

        tokio::select! {
            changed = stop_rx.changed() => {
                if changed.is_err() || *stop_rx.borrow() {
                    break;
                }
            }
            _ = tokio::time::sleep(Duration::from_secs(delay.max(1))) => {}
        }
    }
}

fn last_run(core: &StudyCore, key: &str) -> Result<Option<NaiveDate>> {
    Ok(core
        .database()
        .kv_get(key)?
        .and_then(|raw| NaiveDate::parse_from_str(&raw, "%Y-%m-%d").ok()))
}

fn mark_run(core: &StudyCore, key: &str, day: NaiveDate) -> Result<()> {
    core.database()
        .kv_set(key, &day.format("%Y-%m-%d").to_string())
}

/// The body of one wake-up.
fn tick(core: &StudyCore, config: &RunnerConfig) -> Result<TickReport> {
    let local_time = core.clock().local_now();
    let today = local_time.date_naive();
    let hour = local_time.hour();

    let mut report = TickReport {
        local_time,
        generated: None,
        reminders: None,
    };

    if hour >= config.generation_hour && last_run(core, LAST_GENERATION_KEY)? != Some(today) {
        report.generated = Some(core.generate_daily_queue(today)?);
        mark_run(core, LAST_GENERATION_KEY, today)?;
    }

    if hour == config.reminder_hour && last_run(core, LAST_REMINDER_KEY)? != Some(today) {
        report.reminders = Some(core.send_due_reminders(today)?);
        mark_run(core, LAST_REMINDER_KEY, today)?;
    }

    tracing::debug!(
        %local_time,
        generated = report.generated.is_some(),
        reminded = report.reminders.is_some(),
        "runner tick"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::grade::Grade;
    use crate::notify::{MemoryGateway, NotificationIntent};
    use crate::storage::Database;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn runner_at(date: NaiveDate, hour: u32) -> (PeriodicRunner, Arc<FixedClock>, Arc<MemoryGateway>) {
        let db = Database::open_memory().unwrap();
        let clock = Arc::new(FixedClock::at(date, hour));
        let gateway = Arc::new(MemoryGateway::new());
        let core = Arc::new(StudyCore::new(db, clock.clone(), gateway.clone()));
        (PeriodicRunner::new(core, RunnerConfig::default()), clock, gateway)
    }

    #[test]
    fn generation_runs_once_per_day() {
        let (runner, clock, _) = runner_at(day(2024, 1, 2), 0);
        assert!(runner.run_tick().unwrap().generated.is_some());
        clock.advance(chrono::Duration::hours(1));
        assert!(runner.run_tick().unwrap().generated.is_none());
        clock.advance(chrono::Duration::hours(23));
        assert!(runner.run_tick().unwrap().generated.is_some());
    }

    #[test]
    fn generation_survives_restart() {
        let (runner, _, _) = runner_at(day(2024, 1, 2), 3);
        assert!(runner.run_tick().unwrap().generated.is_some());
        let again = PeriodicRunner::new(Arc::clone(&runner.core), RunnerConfig::default());
        assert!(again.run_tick().unwrap().generated.is_none());
    }

    #[test]
    fn reminders_only_at_reminder_hour() {
        let (runner, clock, gateway) = runner_at(day(2024, 1, 3), 7);
        runner
            .core
            .on_submission_graded(1, 10, Grade::Good, day(2024, 1, 1))
            .unwrap();

        assert!(runner.run_tick().unwrap().reminders.is_none());
        clock.advance(chrono::Duration::hours(1));
        let report = runner.run_tick().unwrap();
        assert_eq!(report.reminders.map(|r| r.notified), Some(1));
        assert!(runner.run_tick().unwrap().reminders.is_none());
        assert!(matches!(
            gateway.sent_to(1).as_slice(),
            [NotificationIntent::ReviewDue { due_count: 1, .. }]
        ));
    }

    #[tokio::test]
    async fn start_and_stop_are_idempotent() {
        let (runner, _, _) = runner_at(day(2024, 1, 2), 0);
        assert_eq!(runner.state(), RunnerState::Stopped);
        assert_ne!(runner.start(), RunnerState::Stopped);
        assert_ne!(runner.start(), RunnerState::Stopped);

        // Wait for the first tick to land.
        for _ in 0..200 {
            if runner.core.database().kv_get(LAST_GENERATION_KEY).unwrap().is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(
            runner.core.database().kv_get(LAST_GENERATION_KEY).unwrap().as_deref(),
            Some("2024-01-02")
        );
        assert_eq!(runner.state(), RunnerState::Running);

        runner.stop().await;
        assert_eq!(runner.state(), RunnerState::Stopped);
        runner.stop().await;
        assert_eq!(runner.state(), RunnerState::Stopped);
    }

    #[tokio::test]
    async fn disabled_runner_does_not_start() {
        let db = Database::open_memory().unwrap();
        let core = Arc::new(StudyCore::new(
            db,
            Arc::new(FixedClock::at(day(2024, 1, 2), 0)),
            Arc::new(MemoryGateway::new()),
        ));
        let config = RunnerConfig {
            enabled: false,
            ..RunnerConfig::default()
        };
        let runner = PeriodicRunner::new(core, config);
        assert_eq!(runner.start(), RunnerState::Stopped);
    }
}
