pub mod activity;
pub mod config;
pub mod grade;
pub mod leaderboard;
pub mod points;
pub mod review;
pub mod runner;
pub mod streak;
pub mod user;

use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;
use studyloop_core::{Config, Database, LogGateway, StudyCore, SystemClock};

pub type CliResult = Result<(), Box<dyn std::error::Error>>;

/// Shared state for one CLI invocation.
pub struct Context {
    pub config: Config,
    date: Option<NaiveDate>,
}

impl Context {
    pub fn new(config: Config, date: Option<NaiveDate>) -> Self {
        Self { config, date }
    }

    /// Open the on-disk database and wire up the core.
    pub fn core(&self) -> Result<StudyCore, Box<dyn std::error::Error>> {
        let db = Database::open()?;
        let clock = Arc::new(SystemClock::from_config(&self.config.clock));
        Ok(StudyCore::new(db, clock, Arc::new(LogGateway)).with_config(&self.config))
    }

    /// `--date` if given, else the configured local today.
    pub fn today(&self, core: &StudyCore) -> NaiveDate {
        self.date.unwrap_or_else(|| core.today())
    }
}

pub fn print_json<T: Serialize>(value: &T) -> CliResult {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
