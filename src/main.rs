use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use fingrab::app::{AccountsRequest, App, TransactionsRequest};
use fingrab::config::{default_config_path, Config};
use fingrab::duration::parse_duration;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("FINGRAB_BUILD_SHA"),
    ")"
);

#[derive(Parser)]
#[command(name = "fingrab")]
#[command(about = "Export bank transactions to MoneyDance and YNAB CSV")]
#[command(version = VERSION)]
struct Cli {
    /// Path to config file (default: ./fingrab.toml or the user config dir)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable coloured output
    #[arg(long = "no-colour", global = true)]
    no_colour: bool,

    /// Bank to export from (monzo, starling)
    bank: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Export transactions between two dates
    #[command(after_help = "\
Examples:
  fingrab monzo transactions --token <api-token> --start 2025-03-01 --end 2025-03-31

  export MONZO_TOKEN=<api-token>
  fingrab monzo transactions --start 2025-03-01

  export MONZO_CLIENT_ID=<client-id> MONZO_CLIENT_SECRET=<client-secret>
  fingrab monzo transactions --start 2025-03-01 --format ynab")]
    Transactions {
        /// Start date (YYYY-MM-DD)
        #[arg(long)]
        start: String,

        /// End date (YYYY-MM-DD, default: tomorrow)
        #[arg(long)]
        end: Option<String>,

        /// API auth token (alternative: <BANK>_TOKEN, or OAuth via <BANK>_CLIENT_ID and <BANK>_CLIENT_SECRET)
        #[arg(long)]
        token: Option<String>,

        /// API request timeout, e.g. 5s or 1m30s
        #[arg(long, value_parser = parse_timeout)]
        timeout: Option<Duration>,

        /// Account ID (default: the first account)
        #[arg(long)]
        account: Option<String>,

        /// Output format (moneydance, ynab)
        #[arg(long)]
        format: Option<String>,

        /// Timezone for output dates, e.g. Europe/London
        #[arg(long)]
        timezone: Option<String>,
    },

    /// List account IDs for the authenticated user
    Accounts {
        /// API auth token
        #[arg(long)]
        token: Option<String>,

        /// API request timeout, e.g. 5s
        #[arg(long, value_parser = parse_timeout)]
        timeout: Option<Duration>,
    },
}

fn parse_timeout(value: &str) -> Result<Duration, String> {
    parse_duration(value).map_err(|err| err.to_string())
}

fn init_tracing(verbose: bool, no_colour: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(!no_colour)
                .with_target(verbose),
        )
        .init();
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.unwrap_or_else(default_config_path);
    let config = Config::load_or_default(&config_path)
        .with_context(|| format!("Failed to load fingrab config: {}", config_path.display()))?;
    tracing::debug!(
        build.version = env!("CARGO_PKG_VERSION"),
        build.sha = env!("FINGRAB_BUILD_SHA"),
        config = %config_path.display(),
        "starting"
    );

    let app = App::new(config);
    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    match cli.command {
        Command::Transactions {
            start,
            end,
            token,
            timeout,
            account,
            format,
            timezone,
        } => {
            let request = TransactionsRequest {
                bank: cli.bank,
                start,
                end,
                token,
                timeout,
                account_id: account,
                format,
                timezone,
            };
            app.transactions(&request, &mut out, shutdown_signal())
                .await?;
        }
        Command::Accounts { token, timeout } => {
            let request = AccountsRequest {
                bank: cli.bank,
                token,
                timeout,
            };
            app.accounts(&request, &mut out, shutdown_signal()).await?;
        }
    }

    out.flush()?;
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.no_colour);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::FAILURE
        }
    }
}
