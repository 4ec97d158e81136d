//! European Lobbying Tracker: entry point.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::NaiveDate;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use lobby_tracker::registry::JurisdictionId;
use lobby_tracker::Aggregator;
use lobby_tracker_web::cli::{self, SearchOutput};
use lobby_tracker_web::config::{self, TrackerOverrides};
use lobby_tracker_web::render::Pages;
use lobby_tracker_web::AppState;

#[derive(Parser)]
#[command(
    name = "lobby-tracker-web",
    about = "Search European lobbying transparency registers from one place",
    version
)]
struct Cli {
    /// Log level (trace, debug, info, warn, error). RUST_LOG takes precedence.
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    /// Per-jurisdiction deadline in seconds.
    #[arg(long, global = true)]
    timeout: Option<u64>,

    /// Earliest GOV.UK publication date searched (YYYY-MM-DD).
    #[arg(long, global = true)]
    uk_since: Option<NaiveDate>,

    /// Base URL of a mirror serving every source.
    /// Also reads LOBBY_TRACKER_UPSTREAM.
    #[arg(long, global = true)]
    upstream: Option<String>,

    /// Add a jurisdiction to the default selection (repeatable).
    #[arg(long, global = true)]
    enable: Vec<JurisdictionId>,

    /// Remove a jurisdiction from the default selection (repeatable).
    #[arg(long, global = true)]
    disable: Vec<JurisdictionId>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the web server (default).
    Serve {
        /// Listen host. Also reads HOST.
        #[arg(long)]
        host: Option<String>,

        /// Listen port. Also reads PORT.
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Run one search and print a summary.
    Search {
        /// Search term; supports AND, OR, NOT, quotes and parentheses.
        term: String,

        /// Jurisdiction to search (repeatable). Defaults to the default selection.
        #[arg(short = 'j', long = "jurisdiction")]
        jurisdictions: Vec<JurisdictionId>,

        /// Print the full result as JSON.
        #[arg(long)]
        json: bool,

        /// Write the XLSX workbook to this path.
        #[arg(long)]
        export: Option<PathBuf>,
    },

    /// List supported jurisdictions.
    Jurisdictions,

    /// Generate shell completion scripts.
    ///
    /// Examples:
    ///   lobby-tracker-web completions bash > ~/.local/share/bash-completion/completions/lobby-tracker-web
    ///   lobby-tracker-web completions zsh > ~/.zfunc/_lobby-tracker-web
    Completions {
        /// Shell type (bash, zsh, fish, powershell, elvish).
        shell: Shell,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let overrides = TrackerOverrides {
        timeout_secs: cli.timeout,
        uk_since: cli.uk_since,
        upstream: config::resolve_upstream(cli.upstream.as_deref()),
    };
    let defaults = config::default_selection(&cli.enable, &cli.disable);

    match cli.command.unwrap_or(Commands::Serve {
        host: None,
        port: None,
    }) {
        Commands::Serve { host, port } => {
            let host = config::resolve_host(host.as_deref());
            let port = config::resolve_port(port);
            let tracker = config::tracker_config(&overrides);
            let state = Arc::new(AppState {
                aggregator: Aggregator::live(&tracker)?,
                defaults,
                pages: Pages::new()?,
            });
            lobby_tracker_web::serve(&host, port, state).await?;
        }

        Commands::Search {
            term,
            jurisdictions,
            json,
            export,
        } => {
            let tracker = config::tracker_config(&overrides);
            let aggregator = Aggregator::live(&tracker)?;
            let ids = if jurisdictions.is_empty() {
                defaults
            } else {
                jurisdictions
            };
            let output = SearchOutput { json, export };
            let mut stdout = std::io::stdout().lock();
            let result = cli::run_search(&aggregator, &term, &ids, &output, &mut stdout).await?;
            if result.outcomes.iter().all(|o| o.status.is_error()) {
                std::process::exit(2);
            }
        }

        Commands::Jurisdictions => {
            cli::print_jurisdictions(&defaults, &mut std::io::stdout().lock())?;
        }

        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(
                shell,
                &mut cmd,
                "lobby-tracker-web",
                &mut std::io::stdout(),
            );
        }
    }

    Ok(())
}
