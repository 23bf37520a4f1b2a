use clap::Subcommand;
use studyloop_core::ActivityKind;

use super::{print_json, CliResult, Context};

#[derive(Subcommand)]
pub enum ActivityAction {
    /// Record one user action (task_view, submission, review_complete, collection_view)
    Record { user_id: i64, kind: ActivityKind },
}

pub fn run(action: ActivityAction, ctx: &Context) -> CliResult {
    let core = ctx.core()?;
    match action {
        ActivityAction::Record { user_id, kind } => {
            let today = ctx.today(&core);
            print_json(&core.on_user_action(user_id, kind, today)?)?;
        }
    }
    Ok(())
}
