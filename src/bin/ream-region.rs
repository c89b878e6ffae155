//! REAM Region - demo driver for region routing
//!
//! Builds an in-process cluster from `name=region` pairs, starts region
//! tracking for a local member and either prints the region map or routes a
//! call to a region.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing_subscriber::EnvFilter;

use ream_region::p2p::{CallOptions, Invocable, LoopbackCluster, MemberSpec, RegionNode};
use ream_region::{CallResult, RegionConfig, RegionError, Target, Value};

#[derive(Parser)]
#[command(
    name = "ream-region",
    version,
    about = "REAM Region - region-aware call routing over an in-process cluster"
)]
struct Cli {
    /// Log every routed call
    #[arg(long, global = true)]
    verbose: bool,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// TOML config file (defaults to the REAM_REGION* environment)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Region of the local member
    #[arg(long, global = true)]
    region: Option<String>,

    /// Primary region
    #[arg(long, global = true)]
    primary_region: Option<String>,

    /// Peer members as name=region; a bare name joins without region support
    #[arg(short, long = "member", global = true)]
    members: Vec<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the region map once discovery is done
    Map,

    /// Route an echo call to a region
    Call {
        /// Target region, or "primary"
        #[arg(default_value = "primary")]
        target: String,

        /// Payload to echo back
        #[arg(default_value = "ping")]
        message: String,

        /// Call timeout in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,
    },
}

fn init_logging(debug: bool) {
    let default = if debug { "ream_region=debug" } else { "ream_region=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn load_config(cli: &Cli) -> Result<RegionConfig> {
    let mut config = match &cli.config {
        Some(path) => RegionConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => RegionConfig::from_env(),
    };
    if let Some(region) = &cli.region {
        config.region = region.as_str().into();
    }
    if let Some(primary) = &cli.primary_region {
        config.primary_region = primary.as_str().into();
    }
    if cli.verbose {
        config.verbose = true;
    }
    Ok(config)
}

fn parse_member(raw: &str) -> Result<MemberSpec> {
    match raw.split_once('=') {
        Some((name, region)) if !name.is_empty() && !region.is_empty() => {
            Ok(MemberSpec::new(name).region(region))
        }
        Some(_) => bail!("invalid member {:?}, expected name=region", raw),
        None => Ok(MemberSpec::new(raw).legacy()),
    }
}

/// Flatten a call outcome so any failure ends the process with an error
fn settle(outcome: CallResult) -> Result<Value, RegionError> {
    match outcome {
        Ok(Ok(reply)) => Ok(reply),
        Ok(Err(e)) => Err(e.into()),
        Err(fault) => Err(fault.into()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.debug);

    let config = load_config(&cli)?;
    let _ = RegionConfig::init_global(config.clone());

    let cluster = LoopbackCluster::new();
    let local = cluster.add(MemberSpec::new("local").region(config.region.clone()));
    for raw in &cli.members {
        let spec = parse_member(raw)?;
        let id = cluster.add(spec);
        if let Some(operations) = cluster.operations(&id) {
            let name = id.name().to_string();
            operations.register("demo", "echo", 1, move |args| {
                Ok(json!({ "member": name, "echo": args[0] }))
            });
        }
    }

    let operations = cluster
        .operations(&local)
        .context("local member missing from cluster")?;
    operations.register("demo", "echo", 1, |args| {
        Ok(json!({ "member": "local", "echo": args[0] }))
    });

    let node = RegionNode::start(cluster.transport(&local), config, operations);
    node.ready().await;

    match cli.command {
        Commands::Map => {
            let router = node.router();
            println!(
                "local region: {} (primary: {}{})",
                router.own_region(),
                router.primary_region(),
                if router.is_own_region_primary() { ", local is primary" } else { "" }
            );
            for (region, members) in node.registry().snapshot() {
                let mut names: Vec<String> = members.iter().map(|m| m.to_string()).collect();
                names.sort();
                println!("{:>12}: {}", region.to_string(), names.join(", "));
            }
        }
        Commands::Call {
            target,
            message,
            timeout_ms,
        } => {
            let options = match timeout_ms {
                Some(ms) => CallOptions::with_timeout(Duration::from_millis(ms)),
                None => CallOptions::default(),
            };
            let target = Target::from(target.as_str());
            let invocable = Invocable::named("demo", "echo", vec![json!(message)]);

            let outcome = node
                .router()
                .route_to_region(target.clone(), invocable, options)
                .await;
            match settle(outcome) {
                Ok(reply) => println!("{}", serde_json::to_string_pretty(&reply)?),
                Err(e) => {
                    node.stop().await;
                    return Err(e).with_context(|| format!("call to {} failed", target));
                }
            }
        }
    }

    node.stop().await;
    Ok(())
}
