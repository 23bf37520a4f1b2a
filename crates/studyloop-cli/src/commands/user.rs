use clap::Subcommand;
use studyloop_core::{Role, StudyCore};

use super::{print_json, CliResult, Context};

#[derive(Subcommand)]
pub enum UserAction {
    /// Register a user or change their role
    Add {
        user_id: i64,
        /// student, teacher or admin
        #[arg(long, default_value = "student")]
        role: Role,
    },
    /// Exclude a user from leaderboards and the daily review pass
    Deactivate { user_id: i64 },
    /// Re-include a deactivated user
    Activate { user_id: i64 },
    /// List active students
    List,
}

pub fn run(action: UserAction, ctx: &Context) -> CliResult {
    let core = ctx.core()?;
    let users = core.users();

    match action {
        UserAction::Add { user_id, role } => {
            print_json(&users.register_user(user_id, role)?)?;
        }
        UserAction::Deactivate { user_id } => set_active(&core, user_id, false)?,
        UserAction::Activate { user_id } => set_active(&core, user_id, true)?,
        UserAction::List => {
            print_json(&users.active_students()?)?;
        }
    }
    Ok(())
}

fn set_active(core: &StudyCore, user_id: i64, active: bool) -> CliResult {
    if !core.users().set_active(user_id, active)? {
        return Err(format!("unknown user: {user_id}").into());
    }
    print_json(&core.users().get(user_id)?)
}
