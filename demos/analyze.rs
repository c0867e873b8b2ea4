//! Runs the full pipeline on one image and prints the JSON record.
//!
//! Run with: cargo run --example analyze -- <image_path> [heatmap_out] [checkpoint.json]

use std::{env, path::Path, sync::Arc};

use verifyspot_forensics::{
    AnalysisConfig, ForensicsPipeline,
    error::Result,
    model::network::{ArchitectureConfig, CompactCnn},
    report::JsonReport,
};

fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        println!("Usage: {} <image_path> [heatmap_out] [checkpoint.json]", args[0]);
        return Ok(());
    }

    let image_path = &args[1];
    let heatmap_out = args.get(2).map(Path::new);

    let pipeline = match args.get(3) {
        Some(checkpoint) => {
            ForensicsPipeline::from_checkpoint(checkpoint, ArchitectureConfig::default(), AnalysisConfig::default())?
        }
        None => {
            println!("No checkpoint given, using an untrained network (every verdict will be Suspicious)");
            ForensicsPipeline::new(Arc::new(CompactCnn::new(ArchitectureConfig::default())?))
        }
    };

    let result = pipeline.analyze(image_path, heatmap_out);
    println!("{}", JsonReport::from(&result).to_json()?);

    Ok(())
}
