use std::sync::Arc;

use clap::Subcommand;
use studyloop_core::PeriodicRunner;

use super::{print_json, CliResult, Context};

#[derive(Subcommand)]
pub enum RunnerAction {
    /// Run the scheduler in the foreground until Ctrl-C
    Start,
    /// Run a single wake-up now
    Tick,
}

pub fn run(action: RunnerAction, ctx: &Context) -> CliResult {
    let core = Arc::new(ctx.core()?);
    let runner = PeriodicRunner::new(core, ctx.config.runner.clone());

    match action {
        RunnerAction::Start => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(async {
                let state = runner.start();
                tracing::info!(?state, "press Ctrl-C to stop");
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::warn!("failed to listen for Ctrl-C: {e}");
                }
                runner.stop().await;
            });
            Ok(())
        }
        RunnerAction::Tick => print_json(&runner.run_tick()?),
    }
}
