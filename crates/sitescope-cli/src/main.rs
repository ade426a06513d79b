//! Sitescope CLI - crawl websites into snapshots and analyse them.
//!
//! A thin wrapper over the `sitescope-engine` library API; all engine
//! behaviour lives behind that API so other consumers (scheduler, RPC)
//! share it.

use clap::Parser;
use colored::Colorize;
use std::path::PathBuf;

mod commands;
mod error;
mod output;
mod progress;

use error::ExitCode;

#[derive(Parser)]
#[command(name = "sitescope")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Website analysis engine: crawl, snapshot, analyse, track issues", long_about = None)]
struct Cli {
    /// Workspace root holding all projects
    #[arg(long, env = "SITESCOPE_WORKSPACE", default_value = ".sitescope")]
    workspace: PathBuf,

    /// Suppress progress output
    #[arg(long, short = 'q', global = true)]
    quiet: bool,

    /// Verbose logging (equivalent to RUST_LOG=debug)
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Manage projects
    #[command(subcommand)]
    Project(commands::project::ProjectCommand),

    /// Crawl a project's site into a new snapshot
    #[command(subcommand)]
    Crawl(commands::crawl::CrawlCommand),

    /// Run analyzers and inspect results and issues
    #[command(subcommand)]
    Test(commands::test::TestCommand),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let code = match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{} {}", "error:".red().bold(), err);
            ExitCode::from_error(&err)
        }
    };
    std::process::exit(code.as_i32());
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::EnvFilter;
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<ExitCode, sitescope_types::EngineError> {
    let engine = sitescope_engine::Engine::new(&cli.workspace)?;
    match cli.command {
        Commands::Project(command) => commands::project::run(&engine, command),
        Commands::Crawl(command) => commands::crawl::run(&engine, command, cli.quiet).await,
        Commands::Test(command) => commands::test::run(&engine, command, cli.quiet).await,
    }
}
