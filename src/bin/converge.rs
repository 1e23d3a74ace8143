//! Converge CLI
//!
//! Applies resource descriptors from a JSON file and prints the results

use anyhow::Context;
use clap::Parser;
use converge_rs::{AgentConfig, Engine, ResourceDescriptor};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "converge")]
#[command(about = "Converge the local host toward declared resources")]
struct Args {
    /// JSON file holding one descriptor or a list of descriptors
    descriptors: PathBuf,

    /// Agent config file (TOML)
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// Cache directory (overrides config and environment)
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// Report what would change without touching anything
    #[arg(short = 'n', long)]
    dry_run: bool,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Batch {
    One(ResourceDescriptor),
    Many(Vec<ResourceDescriptor>),
}

#[derive(Serialize)]
struct Report {
    id: String,
    method: String,
    #[serde(flatten)]
    result: converge_rs::ApplyResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => AgentConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => {
            let mut config = AgentConfig::default();
            config.apply_env();
            config
        }
    };
    if let Some(cache_dir) = args.cache_dir {
        config.cache_dir = cache_dir;
    }

    let engine = Engine::new(config).context("starting engine")?;

    let raw = std::fs::read_to_string(&args.descriptors)
        .with_context(|| format!("reading {}", args.descriptors.display()))?;
    let descriptors = match serde_json::from_str::<Batch>(&raw)
        .with_context(|| format!("parsing {}", args.descriptors.display()))?
    {
        Batch::One(desc) => vec![desc],
        Batch::Many(list) => list,
    };

    info!(
        "Applying {} resources{}",
        descriptors.len(),
        if args.dry_run { " (dry run)" } else { "" }
    );

    let mut reports = Vec::with_capacity(descriptors.len());
    let mut failures = 0usize;
    for desc in &descriptors {
        let (result, error) = match engine.apply(desc, args.dry_run) {
            Ok(result) => (result, None),
            Err(failure) => {
                warn!("'{}' failed: {}", desc.id, failure.error);
                (failure.result, Some(failure.error.to_string()))
            }
        };
        if result.failed {
            failures += 1;
        }
        reports.push(Report {
            id: desc.id.clone(),
            method: desc.method.clone(),
            result,
            error,
        });
    }

    println!("{}", serde_json::to_string_pretty(&reports)?);

    if failures > 0 {
        anyhow::bail!("{} of {} resources failed", failures, descriptors.len());
    }
    Ok(())
}
