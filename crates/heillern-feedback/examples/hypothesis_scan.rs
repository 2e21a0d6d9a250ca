//! Mines correlations between synthetic environment series and a synthetic
//! signal history, then prints the discovered hypotheses as JSON lines.
//!
//! Run with: cargo run -p heillern-feedback --example hypothesis_scan

use std::collections::BTreeMap;
use std::io::{self, Write};

use heillern_core::LearnerConfig;
use heillern_feedback::HypothesisGenerator;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing_subscriber::EnvFilter;

const SAMPLES: usize = 200;
const DIMS: usize = 6;

#[allow(clippy::cast_possible_truncation)]
fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let config = match std::env::var("HEILLERN_CONFIG") {
        Ok(path) => LearnerConfig::from_path(path)?,
        Err(_) => LearnerConfig::default(),
    };
    let mut rng = StdRng::seed_from_u64(config.training.seed.unwrap_or(7));

    let air_quality: Vec<f64> = (0..SAMPLES).map(|_| rng.gen_range(10.0..150.0)).collect();
    let temperature: Vec<f64> = (0..SAMPLES).map(|_| rng.gen_range(-5.0..30.0)).collect();

    // dim 0 follows air quality, dim 3 falls with temperature, the rest is noise
    let signals: Vec<Vec<f32>> = (0..SAMPLES)
        .map(|i| {
            (0..DIMS)
                .map(|d| {
                    let noise: f32 = rng.gen_range(-0.2..0.2);
                    match d {
                        0 => (air_quality[i] / 150.0) as f32 + noise,
                        3 => (-temperature[i] / 30.0) as f32 + noise,
                        _ => noise,
                    }
                })
                .collect()
        })
        .collect();

    let mut external = BTreeMap::new();
    external.insert("air_quality".to_string(), air_quality);
    external.insert("temperature".to_string(), temperature);
    let names: Vec<String> = ["respiratory_noise", "hrv", "skin_temp", "cough_rate"]
        .iter()
        .map(ToString::to_string)
        .collect();

    let mut generator = HypothesisGenerator::new(&config.hypothesis);
    let found = generator.analyze_correlations(&signals, &external, &names)?;

    let mut out = io::stdout().lock();
    for hypothesis in &found {
        serde_json::to_writer(&mut out, hypothesis)?;
        writeln!(out)?;
    }
    Ok(())
}
