//! Repair utility for the tag and favorite indices
//!
//! Usage: cargo run --bin reconcile_indices -- [--apply]
//!
//! This utility will:
//! 1. Open the metadata store named by METADATA_STORE_URL
//! 2. Compare every tag's and favorite group's member list with the
//!    per-file lists
//! 3. Report each divergence
//! 4. With --apply, rewrite the per-file lists from the member lists and
//!    drop members whose file record is gone
//!
//! Run it while the server is idle; concurrent writes can reintroduce drift.

use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tracing::{info, warn};

use imghub::{
    config::Config,
    metadata,
    services::{file_service::FileService, reconcile::Reconciler},
    storage::ChannelRegistry,
};

#[derive(Parser)]
#[command(name = "reconcile_indices")]
#[command(about = "Report and repair divergence between the tag and favorite indices")]
struct Args {
    /// Rewrite divergent keys; without this only a report is printed
    #[arg(long)]
    apply: bool,

    /// Metadata store URL, overrides METADATA_STORE_URL
    #[arg(long)]
    store_url: Option<String>,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("info")
        .init();

    let args = Args::parse();
    let config = Config::from_env()?;
    let url = args.store_url.unwrap_or(config.metadata_store_url);

    info!("Reconciling indices in {}", url);
    if !args.apply {
        info!("Dry run: no keys will be written (pass --apply to repair)");
    }

    let store = metadata::connect(&url).await?;
    // Only record existence is checked; no channel is touched
    let files = FileService::new(store.clone(), Arc::new(ChannelRegistry::new()));
    let report = Reconciler::new(store, files).run(args.apply).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    for divergence in &report.divergences {
        match &divergence.member {
            Some(member) => warn!(
                "[{}] {:?}: owner {} / file {}",
                divergence.index, divergence.kind, divergence.owner, member
            ),
            None => warn!("[{}] {:?}: owner {}", divergence.index, divergence.kind, divergence.owner),
        }
    }

    info!("=== Reconcile Summary ===");
    info!("Owners scanned: {}", report.owners_scanned);
    info!("Files with index entries: {}", report.members_scanned);
    info!("Divergences: {}", report.divergences.len());
    if report.applied {
        info!("Keys rewritten: {}", report.keys_rewritten);
    }
    Ok(())
}
