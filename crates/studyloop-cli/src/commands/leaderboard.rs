use clap::{Args, Subcommand};
use studyloop_core::{Period, PeriodKind};

use super::{print_json, CliResult, Context};

#[derive(Args)]
pub struct PeriodArgs {
    /// month or quarter
    #[arg(long, default_value = "month")]
    period: PeriodKind,
    /// Defaults to the current year
    #[arg(long)]
    year: Option<i32>,
    /// Month (1-12) or quarter (1-4); defaults to the current one
    #[arg(long)]
    value: Option<u32>,
}

#[derive(Subcommand)]
pub enum LeaderboardAction {
    /// Ranked students for a period
    Show {
        #[command(flatten)]
        period: PeriodArgs,
        /// Defaults to leaderboard.default_limit
        #[arg(long)]
        limit: Option<u32>,
    },
    /// One student's rank for a period
    Rank {
        user_id: i64,
        #[command(flatten)]
        period: PeriodArgs,
    },
}

impl PeriodArgs {
    fn resolve(&self, today: chrono::NaiveDate) -> Result<Period, Box<dyn std::error::Error>> {
        let current = Period::containing(self.period, today);
        let period = Period::new(
            self.period,
            self.year.unwrap_or(current.year),
            self.value.unwrap_or(current.value),
        )?;
        Ok(period)
    }
}

pub fn run(action: LeaderboardAction, ctx: &Context) -> CliResult {
    let core = ctx.core()?;
    let today = ctx.today(&core);

    match action {
        LeaderboardAction::Show { period, limit } => {
            let period = period.resolve(today)?;
            print_json(&core.get_leaderboard(period.kind, period.year, period.value, limit)?)
        }
        LeaderboardAction::Rank { user_id, period } => {
            let period = period.resolve(today)?;
            match core.rank_of(user_id, period)? {
                Some(entry) => print_json(&entry),
                None => Err(format!("user {user_id} is not an active student").into()),
            }
        }
    }
}
