use clap::Subcommand;

use super::{print_json, CliResult, Context};

#[derive(Subcommand)]
pub enum PointsAction {
    /// Most recent point grants
    History {
        user_id: i64,
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },
}

pub fn run(action: PointsAction, ctx: &Context) -> CliResult {
    let core = ctx.core()?;
    match action {
        PointsAction::History { user_id, limit } => print_json(&core.score_history(user_id, limit)?),
    }
}
