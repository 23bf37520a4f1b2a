use clap::Args;
use studyloop_core::Grade;

use super::{print_json, CliResult, Context};

#[derive(Args)]
pub struct GradeArgs {
    pub user_id: i64,
    pub submission_id: i64,
    /// pending, good or excellent
    pub grade: Grade,
}

pub fn run(args: GradeArgs, ctx: &Context) -> CliResult {
    let core = ctx.core()?;
    let today = ctx.today(&core);
    let outcome = core.on_submission_graded(args.user_id, args.submission_id, args.grade, today)?;
    print_json(&outcome)
}
