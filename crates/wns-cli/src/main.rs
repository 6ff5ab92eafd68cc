//! WNS CLI
//!
//! Thin wrapper around wns-core for running a service node or issuing requests.
//!
//! ## Usage
//!
//! ```bash
//! # Generate an identity
//! wns keygen
//!
//! # Show the address for a public key
//! wns address <public_key_hex>
//!
//! # Run a service node (identity from --private-key, WNS_PRIVATE_KEY or
//! # PRIVATE_KEY; ./.env is loaded first)
//! wns serve --bootstrap <endpoint_id>
//!
//! # Ask a node to resolve something
//! wns resolve --server-key <public_key_hex> --bootstrap <endpoint_id>
//! ```

mod dotenv;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use wns_core::transport::parse_endpoint_id;
use wns_core::{
    decode_public_key, default_registry, derive_address_with, Client, GossipTransport, Identity,
    Node, NodeConfig, ReadinessGate, Transport, RESOLVE_WALLET,
};

/// WNS - Name/Service Resolution over Encrypted Gossip
#[derive(Parser)]
#[command(name = "wns")]
#[command(version = "0.1.0")]
#[command(about = "WNS - Name/Service Resolution over Encrypted Gossip")]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// JSON file with node settings (missing fields use defaults)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Override the shared pub/sub topic
    #[arg(long, global = true)]
    topic: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a new identity and print its secret, public key and address
    Keygen,

    /// Print the address a public key is reachable at
    Address {
        /// Hex-encoded public key
        public_key: String,

        /// Hex characters of the key kept in the address
        #[arg(long)]
        segment_len: Option<usize>,
    },

    /// Run a service node until Ctrl+C
    Serve {
        /// Hex private key (falls back to PRIVATE_KEY, generated if absent)
        #[arg(long, env = "WNS_PRIVATE_KEY", hide_env_values = true)]
        private_key: Option<String>,

        /// Endpoint id of a peer to join through (repeatable)
        #[arg(long)]
        bootstrap: Vec<String>,

        /// Start once strictly more than this many peers are connected
        #[arg(long)]
        min_peers: Option<usize>,

        /// Give up waiting for peers after this many seconds
        #[arg(long)]
        readiness_timeout_secs: Option<u64>,

        /// Dispatch workers (1 = strictly sequential)
        #[arg(long)]
        workers: Option<usize>,

        /// Answer unknown services and handler failures with error responses
        #[arg(long)]
        reply_on_error: bool,
    },

    /// Send one request to a service node and print the response
    Resolve {
        /// Hex public key of the service node
        #[arg(long)]
        server_key: String,

        /// Service to invoke
        #[arg(long, default_value = RESOLVE_WALLET)]
        service: String,

        /// Opaque input for the service
        #[arg(long, default_value = "")]
        input: String,

        /// Endpoint id of a peer to join through (repeatable)
        #[arg(long)]
        bootstrap: Vec<String>,

        /// Seconds to wait for the response
        #[arg(long)]
        timeout_secs: Option<u64>,
    },
}

/// Set up logging based on verbosity level
fn setup_logging(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .init();
}

/// Load settings from `path` (if any), then apply the topic override.
fn load_config(path: Option<&Path>, topic: Option<String>) -> Result<NodeConfig> {
    let mut config = match path {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config {}", path.display()))?;
            serde_json::from_str(&raw)
                .with_context(|| format!("Failed to parse config {}", path.display()))?
        }
        None => NodeConfig::default(),
    };
    if let Some(topic) = topic {
        config.pubsub_topic = topic;
    }
    Ok(config)
}

fn parse_bootstrap(peers: &[String]) -> Result<Vec<iroh::EndpointId>> {
    peers
        .iter()
        .map(|peer| {
            parse_endpoint_id(peer).with_context(|| format!("Invalid bootstrap peer {}", peer))
        })
        .collect()
}

fn main() -> Result<()> {
    dotenv::load_dotenv();

    let cli = Cli::parse();

    setup_logging(cli.verbose);

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?
        .block_on(run(cli))
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = load_config(cli.config.as_deref(), cli.topic)?;

    match cli.command {
        Commands::Keygen => {
            config.validate()?;
            let identity = Identity::generate()?;
            println!("Secret: {}", identity.secret_hex());
            println!("Public key: {}", identity.public_key_hex());
            println!(
                "Address: {}",
                derive_address_with(identity.public_key(), config.address_segment_len)
            );
        }

        Commands::Address {
            public_key,
            segment_len,
        } => {
            if let Some(segment_len) = segment_len {
                config.address_segment_len = segment_len;
            }
            config.validate()?;
            let key = decode_public_key(&public_key)?;
            println!("{}", derive_address_with(&key, config.address_segment_len));
        }

        Commands::Serve {
            private_key,
            bootstrap,
            min_peers,
            readiness_timeout_secs,
            workers,
            reply_on_error,
        } => {
            if let Some(min_peers) = min_peers {
                config.min_peers = min_peers;
            }
            if let Some(secs) = readiness_timeout_secs {
                config.readiness_timeout = Duration::from_secs(secs);
            }
            if let Some(workers) = workers {
                config.workers = workers;
            }
            config.reply_on_error |= reply_on_error;
            config.validate()?;

            let private_key = private_key.or_else(|| std::env::var("PRIVATE_KEY").ok());
            let identity = match private_key {
                Some(secret) => Identity::load(&secret).context("Failed to load private key")?,
                None => {
                    tracing::warn!("No private key supplied, using a throwaway identity");
                    Identity::generate()?
                }
            };
            let bootstrap = parse_bootstrap(&bootstrap)?;

            println!("Starting WNS node...");
            println!();

            let transport =
                Arc::new(GossipTransport::bind(config.pubsub_topic.clone(), bootstrap).await?);
            let node = Node::new(identity, default_registry(), transport.clone(), config)?;

            println!("Identity:");
            println!("  Public key: {}", node.public_key_hex());
            println!("  Address: {}", node.address());
            println!();
            println!("Node:");
            println!("  Endpoint ID: {}", hex::encode(transport.endpoint_id().as_bytes()));
            println!("  Topic: {}", node.config().pubsub_topic);
            println!("  Services: {}", node.registry().services().join(", "));
            println!();
            println!(
                "Waiting for more than {} peer(s)... Press Ctrl+C to stop.",
                node.config().min_peers
            );

            let shutdown = CancellationToken::new();
            let signal = shutdown.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    println!();
                    println!("Received shutdown signal...");
                    signal.cancel();
                }
            });

            let stats = match node.serve(shutdown).await {
                Ok(stats) => stats,
                Err(e) => {
                    transport.stop().await;
                    return Err(e).context("Node failed to start");
                }
            };

            println!("Shutting down...");
            println!(
                "Handled {} envelope(s): {} replied, {} not for us, {} dropped",
                stats.total(),
                stats.replied,
                stats.not_for_us,
                stats.total() - stats.replied - stats.not_for_us
            );
            println!("Goodbye.");
        }

        Commands::Resolve {
            server_key,
            service,
            input,
            bootstrap,
            timeout_secs,
        } => {
            if let Some(secs) = timeout_secs {
                config.request_ttl = Duration::from_secs(secs);
            }
            config.validate()?;
            decode_public_key(&server_key).context("Invalid server key")?;
            let bootstrap = parse_bootstrap(&bootstrap)?;

            let transport =
                Arc::new(GossipTransport::bind(config.pubsub_topic.clone(), bootstrap).await?);
            transport.start().await?;
            // One neighbour is enough to reach the swarm
            ReadinessGate::new(0, config.readiness_timeout)
                .wait_until_ready(transport.as_ref())
                .await
                .context("No peers reachable")?;

            let inbound = transport
                .take_inbound()
                .context("Inbound stream unavailable")?;
            let sweep_interval = config.request_ttl;
            let client = Client::new(transport.clone(), config)?;
            let listener = client.spawn_listener(inbound);
            let sweeper = client.spawn_sweeper(sweep_interval)?;

            let result = client.request(&server_key, &service, &input).await;
            sweeper.abort();
            listener.abort();
            transport.stop().await;

            let response = result?;
            println!("{}", serde_json::to_string_pretty(&response)?);
            if !response.is_ok() {
                anyhow::bail!("Service answered {}: {}", response.status_code, response.message);
            }
        }
    }

    Ok(())
}
