//! attn-atlas CLI: re-aggregate the head atlas from ranking artifacts.
//!
//! The extraction stages need live model/parser/projector collaborators
//! and run through the library API; the atlas stage is a pure function
//! of the ranking artifacts on disk, so it can be re-run from here after
//! any upstream artifact changes.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use attn_atlas::{artifacts, rebuild_atlas, ArtifactPaths, PipelineConfig};

#[derive(Parser)]
#[command(name = "attn-atlas")]
#[command(about = "Attention-head atlas aggregation for dashboard data")]
#[command(version)]
struct Cli {
    /// Dataset identifier used in artifact file names
    #[arg(short, long, default_value = "sst2")]
    dataset: String,

    /// Directory holding the ranking artifacts
    #[arg(short, long, default_value = "outputs")]
    output: PathBuf,

    /// Number of encoder layers
    #[arg(long, default_value_t = 12)]
    layers: usize,

    /// Number of attention heads per layer
    #[arg(long, default_value_t = 12)]
    heads: usize,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = PipelineConfig {
        dataset_name: cli.dataset.clone(),
        num_layers: cli.layers,
        num_heads: cli.heads,
        ..PipelineConfig::default()
    };
    let paths = ArtifactPaths::new(&cli.output, &cli.dataset);

    println!("=== attn-atlas: head atlas aggregation ===");
    println!("Dataset: {}", cli.dataset);
    println!("Output:  {}", cli.output.display());

    info!("Aggregating ranking artifacts...");
    let atlas = rebuild_atlas(&paths, &config)?;
    artifacts::write_json(&paths.atlas(), &atlas)?;

    // Print the strongest head per signal.
    println!("\n=== Atlas ({} heads) ===", atlas.len());
    let signals: [(&str, fn(&artifacts::AtlasEntry) -> f64); 4] = [
        ("semantic", |e| e.semantic),
        ("syntactic", |e| e.syntactic),
        ("gradient", |e| e.gradient),
        ("confidence", |e| e.confidence),
    ];
    for (name, score_of) in signals {
        if let Some(best) = atlas.iter().max_by(|a, b| {
            score_of(a)
                .partial_cmp(&score_of(b))
                .unwrap_or(std::cmp::Ordering::Equal)
        }) {
            println!(
                "Best {name:10} head: layer {:2} head {:2} ({:.4})",
                best.layer,
                best.head,
                score_of(best)
            );
        }
    }

    info!("Atlas saved to {}", paths.atlas().display());
    Ok(())
}
