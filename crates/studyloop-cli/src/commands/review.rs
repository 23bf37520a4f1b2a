use clap::Subcommand;

use super::{print_json, CliResult, Context};

#[derive(Subcommand)]
pub enum ReviewAction {
    /// Reviews due today, most overdue first
    Due { user_id: i64 },
    /// Complete the pending review of a submission
    Complete { user_id: i64, submission_id: i64 },
    /// Abandon a submission's review chain
    Skip { user_id: i64, submission_id: i64 },
    /// Run the daily generation pass now
    Generate,
    /// Mastered / pending / due counts
    Stats { user_id: i64 },
    /// Mastered submissions
    Mastered { user_id: i64 },
}

pub fn run(action: ReviewAction, ctx: &Context) -> CliResult {
    let core = ctx.core()?;
    let today = ctx.today(&core);

    match action {
        ReviewAction::Due { user_id } => print_json(&core.get_due_reviews(user_id, today)?),
        ReviewAction::Complete {
            user_id,
            submission_id,
        } => print_json(&core.complete_review(user_id, submission_id, today)?),
        ReviewAction::Skip {
            user_id,
            submission_id,
        } => print_json(&core.skip_review(user_id, submission_id)?),
        ReviewAction::Generate => print_json(&core.generate_daily_queue(today)?),
        ReviewAction::Stats { user_id } => print_json(&core.mastery_stats(user_id, today)?),
        ReviewAction::Mastered { user_id } => print_json(&core.list_mastered(user_id)?),
    }
}
