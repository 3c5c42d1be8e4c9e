mod commands;

use anyhow::Result;
use arena_common::Config;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "arena-cli")]
#[command(about = "Arena CLI - Run, evaluate and grade contest programs locally", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile and run one program against one input
    Run {
        /// Source file
        #[arg(short, long)]
        source: PathBuf,

        /// File fed to stdin (empty input when omitted)
        #[arg(short, long)]
        input: Option<PathBuf>,
    },

    /// Run a program against a JSON array of test cases and score it
    Evaluate {
        /// Source file
        #[arg(short, long)]
        source: PathBuf,

        /// JSON file: [{"input": "...", "expected_output": "..."}]
        #[arg(short, long)]
        tests: PathBuf,

        /// Marks awarded for passing every test case
        #[arg(short, long, default_value = "10")]
        marks: u32,
    },

    /// Grade a team's drafts against a contest file and print a report
    Grade {
        /// Contest configuration JSON
        #[arg(short, long, default_value = "config/contest.json")]
        contest: PathBuf,

        /// JSON file: {"<question_id>": {"code": "...", "selected_option": "..."}}
        #[arg(short, long)]
        drafts: PathBuf,

        /// Team id used for the run
        #[arg(long, default_value = "local")]
        team: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();

    match cli.command {
        Commands::Run { source, input } => {
            commands::run(&config, &source, input.as_deref()).await?;
        }
        Commands::Evaluate {
            source,
            tests,
            marks,
        } => {
            commands::evaluate(&config, &source, &tests, marks).await?;
        }
        Commands::Grade {
            contest,
            drafts,
            team,
        } => {
            let report = commands::grade(&config, &contest, &drafts, &team).await?;
            println!("{}", report);
        }
    }

    Ok(())
}
