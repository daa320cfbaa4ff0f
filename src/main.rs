//! rewire DNS server - entry point.
//!
//! This binary serves DNS-over-UDP, answers A queries matching configured
//! rules with operator-chosen addresses, and forwards everything else to a
//! single upstream resolver.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::UdpSocket;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use rewire::config::{Config, Overrides};
use rewire::dns::UpstreamResolver;
use rewire::server::{run_server, QueryHandler};

#[derive(Parser)]
#[command(name = "rewire")]
#[command(version)]
#[command(about = "Serve DNS queries with your own answers and see what is being asked")]
struct Cli {
    /// Configuration file (defaults to ./.rewire.toml, then ~/.rewire.toml)
    #[arg(short = 'c', long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Port for the DNS server to listen on
    #[arg(short = 'p', long)]
    port: Option<u16>,

    /// Upstream resolver to forward queries to
    #[arg(short = 'r', long, value_name = "HOST:PORT")]
    resolver: Option<SocketAddr>,

    /// Answer every query with this address
    #[arg(short = 'a', long, value_name = "IP")]
    always: Option<IpAddr>,
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    let mut config =
        Config::discover(cli.config.as_deref()).context("failed to load configuration")?;

    // Environment variable overrides the flag.
    let port = match std::env::var("REWIRE_PORT") {
        Ok(value) => Some(value.parse::<u16>().context("invalid REWIRE_PORT")?),
        Err(_) => cli.port,
    };

    config.apply(Overrides {
        port,
        resolver: cli.resolver,
        always: cli.always,
    });

    let rules = config.rule_set().context("failed to compile rules")?;
    if rules.is_empty() {
        warn!("no rules set, running as a plain forwarder");
    }
    for rule in rules.iter() {
        if let Some(qtype) = rule.qtype() {
            warn!(
                pattern = rule.pattern(),
                %qtype,
                "per-rule qtype is reserved and not applied; only A queries consult rules"
            );
        }
    }

    info!(
        port = config.port,
        resolver = %config.resolver,
        always = ?config.always,
        rules = rules.len(),
        "starting to listen for DNS queries"
    );

    let resolver = UpstreamResolver::new(config.resolver, config.upstream_timeout());
    let handler = QueryHandler::new(rules, resolver);

    let socket = UdpSocket::bind(("0.0.0.0", config.port))
        .await
        .with_context(|| format!("failed to bind UDP listener on port {}", config.port))?;

    tokio::select! {
        result = run_server(socket, handler) => result.context("server error"),
        _ = tokio::signal::ctrl_c() => {
            info!("ctrl-c received, shutting down");
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    run().await
}
