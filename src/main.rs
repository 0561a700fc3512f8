//! Cryptalias server binary and verifying client.

use clap::{Parser, Subcommand};
use cryptalias::client;
use cryptalias::error::{ResolverError, ResolverResult};
use cryptalias::server;
use std::process::ExitCode;

/// Signed cryptocurrency-address resolution service
#[derive(Parser, Debug)]
#[command(name = "cryptalias", version, about, long_about = None)]
#[command(args_conflicts_with_subcommands = true)]
struct Cli {
    /// Path to the YAML config file
    #[arg(default_value = "config.yml")]
    config: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Resolve an alias and verify the signed response
    Resolve {
        /// Output JSON instead of plain text
        #[arg(long)]
        json: bool,
        /// Alias identifier ([ticker:]alias[+tag]$domain)
        alias: String,
        /// Ticker symbol (e.g. xmr)
        ticker: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let result = match cli.command {
        Some(Command::Resolve {
            json,
            alias,
            ticker,
        }) => run_resolve(json, &alias, &ticker).await,
        None => run_server(&cli.config).await,
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run_server(config: &str) -> ResolverResult<()> {
    if unsafe { libc::geteuid() } == 0 {
        return Err(ResolverError::Internal(
            "refusing to run as root".to_string(),
        ));
    }
    server::run(config).await
}

async fn run_resolve(json: bool, alias: &str, ticker: &str) -> ResolverResult<()> {
    let alias = alias.trim();
    let ticker = ticker.trim();
    if alias.is_empty() || ticker.is_empty() {
        return Err(ResolverError::InvalidAlias(
            "alias and ticker are required".to_string(),
        ));
    }
    if !alias.contains('$') {
        return Err(ResolverError::InvalidAlias(
            "alias must be in the format alias$domain (tip: quote it to avoid shell expansion)"
                .to_string(),
        ));
    }

    let outcome = client::resolve_address(ticker, alias).await?;
    if json {
        let out = serde_json::json!({
            "alias": outcome.alias,
            "ticker": outcome.ticker,
            "address": outcome.address,
        });
        let rendered = serde_json::to_string_pretty(&out)
            .map_err(|e| ResolverError::Internal(format!("encode output: {e}")))?;
        println!("{rendered}");
    } else {
        println!("{} {}", outcome.ticker, outcome.address);
    }
    Ok(())
}
