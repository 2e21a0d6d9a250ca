//! Reads a `State` as JSON from stdin (or builds a random one), lets a freshly
//! initialised agent choose an action and prints a decision record.
//!
//! Run with: echo '{...}' | cargo run -p heillern-agent --example decide

use std::io::{self, Read};

use heillern_agent::PrescriptionAgent;
use heillern_core::{
    Action, FeatureEncoder, LearnerConfig, LinearValueEstimator, Policy, State, StateEncoder,
};
use rand::Rng;
use serde::Serialize;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};
use tracing_subscriber::EnvFilter;

#[derive(Serialize)]
struct DecisionRecord {
    ts: String,
    policy: String,
    epsilon: f32,
    action: Action,
}

fn iso8601_now() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let config = match std::env::var("HEILLERN_CONFIG") {
        Ok(path) => LearnerConfig::from_path(path)?,
        Err(_) => LearnerConfig::default(),
    };

    let mut input = String::new();
    io::stdin().read_to_string(&mut input)?;

    let mut rng = rand::thread_rng();
    let state = if input.trim().is_empty() {
        let signal = (0..config.state.signal_dim)
            .map(|_| rng.gen_range(-1.0..1.0))
            .collect();
        State::new(signal, 75.0)
            .with_biomarker("lactate", 2.5)
            .with_biomarker("glucose", 95.0)
    } else {
        serde_json::from_str::<State>(&input)?
    };

    let encoder = FeatureEncoder::new(&config.state);
    let online =
        LinearValueEstimator::random(encoder.output_dim(), config.actions.total(), &mut rng);
    let mut agent = PrescriptionAgent::new(&config, encoder, online)?;
    let action = agent.select_action(&state)?;

    let record = DecisionRecord {
        ts: iso8601_now(),
        policy: "heillern-double-q".to_string(),
        epsilon: agent.epsilon(),
        action,
    };

    serde_json::to_writer_pretty(io::stdout(), &record)?;
    println!();

    Ok(())
}
