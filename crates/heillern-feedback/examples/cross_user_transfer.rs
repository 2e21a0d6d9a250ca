//! Records outcomes for a handful of synthetic users and shows which
//! interventions transfer to a new user with a nearly identical signal.
//!
//! Run with: cargo run -p heillern-feedback --example cross_user_transfer

use std::io;

use heillern_agent::PrioritizedReplayMemory;
use heillern_core::state::SUBJECTIVE_WELLBEING;
use heillern_core::{LearnerConfig, State};
use heillern_feedback::FeedbackDigest;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing_subscriber::EnvFilter;

const SIGNAL_DIM: usize = 16;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let config = LearnerConfig::default();
    let mut digest = FeedbackDigest::new(&config)?;
    let mut memory = PrioritizedReplayMemory::new(
        config.training.memory_size,
        config.training.priority_alpha,
    );
    let mut rng = StdRng::seed_from_u64(42);

    let archetype: Vec<f32> = (0..SIGNAL_DIM).map(|_| rng.gen_range(-1.0..1.0)).collect();

    for user in 0..20 {
        let signal: Vec<f32> = archetype
            .iter()
            .map(|x| x + rng.gen_range(-0.3..0.3))
            .collect();
        let action = digest
            .catalog()
            .index_to_action(rng.gen_range(0..12), 0.5)?;
        let gain: f32 = rng.gen_range(-10.0..40.0);

        let prev = State::new(signal.clone(), 60.0).with_biomarker(SUBJECTIVE_WELLBEING, 50.0);
        let next = State::new(signal, 60.0 + gain)
            .with_biomarker(SUBJECTIVE_WELLBEING, 50.0 + gain / 2.0);
        let adherence = rng.gen_range(0.5..1.0);
        let reward = digest.process_outcome(&mut memory, &prev, &action, &next, adherence)?;
        println!("user {user:>2}: {:<24} reward {reward:+.3}", action.name);
    }

    let newcomer: Vec<f32> = archetype
        .iter()
        .map(|x| x + rng.gen_range(-0.05..0.05))
        .collect();
    println!();
    println!(
        "{} successes recorded; transfers for a new user:",
        digest.success_count()
    );
    for m in digest.matching_successes(&newcomer) {
        println!(
            "  action {:>3}  similarity {:.3}  reward {:.3}  score {:.3}",
            m.action_index, m.similarity, m.reward, m.score
        );
    }
    for action in digest.transfer_actions(&newcomer, config.feedback.top_k)? {
        println!("  -> {} ({}): {}", action.name, action.category, action.reasoning);
    }
    Ok(())
}
