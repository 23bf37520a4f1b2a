use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use studyloop_core::Config;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "studyloop", version, about = "studyloop CLI")]
struct Cli {
    /// Act as if today were this local date (YYYY-MM-DD)
    #[arg(long, global = true)]
    date: Option<NaiveDate>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// User registry
    User {
        #[command(subcommand)]
        action: commands::user::UserAction,
    },
    /// Record learner activity
    Activity {
        #[command(subcommand)]
        action: commands::activity::ActivityAction,
    },
    /// Record a submission grade
    Grade(commands::grade::GradeArgs),
    /// Streak summary and check-in chart
    Streak {
        #[command(subcommand)]
        action: commands::streak::StreakAction,
    },
    /// Spaced review queue
    Review {
        #[command(subcommand)]
        action: commands::review::ReviewAction,
    },
    /// Period rankings
    Leaderboard {
        #[command(subcommand)]
        action: commands::leaderboard::LeaderboardAction,
    },
    /// Point ledger
    Points {
        #[command(subcommand)]
        action: commands::points::PointsAction,
    },
    /// Background scheduler
    Runner {
        #[command(subcommand)]
        action: commands::runner::RunnerAction,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_env("STUDYLOOP_LOG")
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.filter));
    // Logs go to stderr; stdout carries JSON.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn main() {
    let cli = Cli::parse();
    let config = Config::load_or_default();
    init_tracing(&config);

    let ctx = commands::Context::new(config, cli.date);
    let result = match cli.command {
        Commands::User { action } => commands::user::run(action, &ctx),
        Commands::Activity { action } => commands::activity::run(action, &ctx),
        Commands::Grade(args) => commands::grade::run(args, &ctx),
        Commands::Streak { action } => commands::streak::run(action, &ctx),
        Commands::Review { action } => commands::review::run(action, &ctx),
        Commands::Leaderboard { action } => commands::leaderboard::run(action, &ctx),
        Commands::Points { action } => commands::points::run(action, &ctx),
        Commands::Runner { action } => commands::runner::run(action, &ctx),
        Commands::Config { action } => commands::config::run(action),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
