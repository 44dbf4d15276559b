//! Clearswap CLI
//!
//! Command-line interface for the Clearswap relay: runs the HTTP API over
//! an authenticated clearnode session, and offers small inspection helpers.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use tracing_subscriber::EnvFilter;

use clearswap_api::{ApiServer, AppState};
use clearswap_client::{ClearnodeClient, SignerAdapter};
use clearswap_core::RelayConfig;
use clearswap_engine::{PlanStore, SessionLifecycle};

/// Clearswap - multi-party asset swaps over state-channel sessions
#[derive(Parser)]
#[command(name = "clearswap")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect, authenticate, and serve the HTTP API
    Serve {
        /// Port override for the HTTP API
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Show the relay configuration resolved from the environment
    Config,

    /// Print a skeleton request body for the create-swap endpoint
    PlanTemplate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Serve { port } => serve(port).await,
        Commands::Config => show_config(),
        Commands::PlanTemplate => {
            println!("{}", plan_template());
            Ok(())
        }
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn serve(port: Option<u16>) -> Result<()> {
    let config = RelayConfig::from_env().context("loading relay configuration")?;
    let port = port.unwrap_or(config.http_port);

    let signer =
        SignerAdapter::from_private_key(&config.private_key).context("loading main signer")?;
    println!("{} {}", "wallet:".bold(), signer.address());
    println!("{} {}", "clearnode:".bold(), config.clearnode.ws_url);

    let client = Arc::new(ClearnodeClient::new(config.clearnode.clone(), signer));
    client.connect().await.context("connecting to clearnode")?;
    client
        .authenticate()
        .await
        .context("authenticating with clearnode")?;
    println!("{}", "authenticated with clearnode".green());

    let lifecycle = SessionLifecycle::new(client, Arc::new(PlanStore::new()));
    let server = ApiServer::new(AppState::new(lifecycle));

    let url = format!("http://0.0.0.0:{port}");
    println!("{} {}", "serving swap API on".bold(), url.as_str().cyan());
    server
        .run(([0, 0, 0, 0], port))
        .await
        .context("running HTTP server")?;
    Ok(())
}

fn show_config() -> Result<()> {
    let config = RelayConfig::from_env().context("loading relay configuration")?;
    let node = &config.clearnode;

    println!("{}", "clearswap relay configuration".bold());
    println!("  ws_url:           {}", node.ws_url);
    println!("  app_name:         {}", node.app_name);
    println!("  scope:            {}", node.scope);
    println!("  allowance:        {} {}", node.allowance_amount, node.allowance_asset);
    println!("  session_ttl_secs: {}", node.session_ttl_secs);
    println!("  http_port:        {}", config.http_port);
    Ok(())
}

fn plan_template() -> String {
    let template = serde_json::json!({
        "seller": "0xSellerAddress",
        "provider": "0xProviderAddress",
        "fills": [
            {"buyer": "0xBuyerOne", "asset_amount": "30", "payment_amount": "300"},
            {"buyer": "0xBuyerTwo", "asset_amount": "40", "payment_amount": "400"},
            {"buyer": "0xBuyerThree", "asset_amount": "30", "payment_amount": "300"}
        ],
        "asset": "wood",
        "payment_asset": "ytest.usd",
        "provider_fee": "25"
    });
    serde_json::to_string_pretty(&template).expect("static template serializes")
}
