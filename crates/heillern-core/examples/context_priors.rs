//! Reads external data points as JSON lines (file argument or stdin), prints the
//! conflict check against an internal assessment and the derived priors.
//!
//! Run with: cargo run -p heillern-core --example context_priors -- points.jsonl

use heillern_core::context::{bayesian_priors, resolve_conflict, ExternalDataPoint};
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let path = std::env::args().nth(1);
    let assessment =
        std::env::var("HEILLERN_ASSESSMENT").unwrap_or_else(|_| "high_viral_load".to_string());
    let reader: Box<dyn BufRead> = match path {
        Some(p) => Box::new(BufReader::new(File::open(p)?)),
        None => Box::new(BufReader::new(io::stdin())),
    };

    let mut points = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let point: ExternalDataPoint = serde_json::from_str(&line)?;
        let resolution = resolve_conflict(&point, &assessment, 0.9);
        println!(
            "{}\t{:.2}\t{}",
            point.r#type,
            point.value,
            if resolution.flag_for_review {
                "conflict"
            } else {
                "ok"
            }
        );
        points.push(point);
    }

    println!("{}", serde_json::to_string(&bayesian_priors(&points))?);
    Ok(())
}
