use clap::Subcommand;

use super::{print_json, CliResult, Context};

#[derive(Subcommand)]
pub enum StreakAction {
    /// Current and best streak
    Show { user_id: i64 },
    /// Day-by-day check-in chart
    Chart {
        user_id: i64,
        #[arg(long, default_value_t = 14)]
        days: u32,
    },
    /// Streak, points and this week's check-ins
    Overview { user_id: i64 },
}

pub fn run(action: StreakAction, ctx: &Context) -> CliResult {
    let core = ctx.core()?;
    let today = ctx.today(&core);

    match action {
        StreakAction::Show { user_id } => print_json(&core.get_streak_summary(user_id)?),
        StreakAction::Chart { user_id, days } => {
            print_json(&core.checkin_chart(user_id, today, days)?)
        }
        StreakAction::Overview { user_id } => print_json(&core.learning_overview(user_id, today)?),
    }
}
