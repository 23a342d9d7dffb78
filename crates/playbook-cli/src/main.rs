mod cmd;
mod output;
mod root;

use clap::{Parser, Subcommand};
use cmd::{config::ConfigSubcommand, run::RunSubcommand, view::ViewArgs};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "playbook",
    about = "Outreach playbook analytics: funnels, benchmarks, health scores and insights",
    version,
    propagate_version = true
)]
struct Cli {
    /// Workspace root (default: auto-detect from .playbook/)
    #[arg(long, global = true, env = "PLAYBOOK_ROOT")]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create .playbook/config.yaml in the workspace
    Init {
        /// Base URL of the playbook API
        #[arg(long)]
        api_url: Option<String>,
    },

    /// Fetch playbooks and runs from the API into the local snapshot
    Fetch {
        /// Print the API's own summary instead of fetching runs
        #[arg(long)]
        summary: bool,
    },

    /// Every view for one window: summary, funnel, matrix, health, timeline, insights
    Report {
        #[command(flatten)]
        view: ViewArgs,
    },

    /// Stage-by-stage conversion funnel
    Funnel {
        #[command(flatten)]
        view: ViewArgs,
    },

    /// Segment x channel benchmark matrix for one metric
    Matrix {
        #[command(flatten)]
        view: ViewArgs,
    },

    /// Segment x channel health scores
    Health {
        #[command(flatten)]
        view: ViewArgs,
    },

    /// Runs laid out on a time axis
    Timeline {
        #[command(flatten)]
        view: ViewArgs,
    },

    /// Ranked, evidence-backed recommendations
    Insights {
        #[command(flatten)]
        view: ViewArgs,
    },

    /// Headline totals across every playbook and run
    Summary,

    /// Repairs applied while sanitizing fetched records
    Quality,

    /// Inspect runs
    Run {
        #[command(subcommand)]
        subcommand: RunSubcommand,
    },

    /// Show or validate the configuration
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },

    /// Serve the analytics API
    Serve {
        /// Port to listen on (default: server.port from config)
        #[arg(long)]
        port: Option<u16>,

        /// Read the local snapshot instead of the live API
        #[arg(long)]
        offline: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Serve { .. } => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let root = root::resolve_root(cli.root.as_deref());

    let result = match cli.command {
        Commands::Init { api_url } => cmd::init::run(&root, api_url.as_deref()),
        Commands::Fetch { summary } => cmd::fetch::run(&root, summary, cli.json),
        Commands::Report { view } => cmd::analytics::report(&root, &view, cli.json),
        Commands::Funnel { view } => cmd::analytics::funnel(&root, &view, cli.json),
        Commands::Matrix { view } => cmd::analytics::matrix(&root, &view, cli.json),
        Commands::Health { view } => cmd::analytics::health(&root, &view, cli.json),
        Commands::Timeline { view } => cmd::analytics::timeline(&root, &view, cli.json),
        Commands::Insights { view } => cmd::analytics::insights(&root, &view, cli.json),
        Commands::Summary => cmd::analytics::summary(&root, cli.json),
        Commands::Quality => cmd::analytics::quality(&root, cli.json),
        Commands::Run { subcommand } => cmd::run::run(&root, subcommand, cli.json),
        Commands::Config { subcommand } => cmd::config::run(&root, subcommand, cli.json),
        Commands::Serve { port, offline } => cmd::serve::run(&root, port, offline),
    };

    if let Err(e) = result {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
