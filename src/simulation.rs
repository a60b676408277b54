//! Simulated participants: drive the engine headlessly with seeded
//! behaviour, for reproducibility checks and load estimates.
//!
//! Each participant gets two RNG streams derived from its seed: one owned by
//! the engine (stimulus draws) and one for behaviour (reaction times,
//! errors, reading pauses). Time is a [`ManualClock`] advanced by the
//! simulated delays, so runs are bit-for-bit reproducible.

use std::sync::Arc;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use thiserror::Error;

use crate::aggregator::SaveStatus;
use crate::block_plan::PlanError;
use crate::clock::ManualClock;
use crate::engine::{Phase, TrialEngine};
use crate::evaluator::correct_side;
use crate::session::{bootstrap, BootstrapParams};
use crate::sink::ResultsSink;
use crate::stimulus_pool::StimulusPool;
use crate::types::{Action, Session, Side, TrialResult};

/// Epoch origin of simulated wall clocks (2024-01-01T00:00:00Z).
const SIM_EPOCH_MS: i64 = 1_704_067_200_000;

/// Behaviour seed offset, so engine and behaviour streams differ.
const BEHAVIOUR_SEED_SALT: u64 = 0x9e37_79b9_7f4a_7c15;

#[derive(Debug, Error)]
pub enum SimulationError {
    #[error(transparent)]
    Plan(#[from] PlanError),
    #[error("invalid participant profile: {0}")]
    InvalidProfile(String),
}

#[derive(Clone, Debug)]
pub struct ParticipantProfile {
    /// Probability of a wrong first response on any trial.
    pub error_rate: f64,
    pub min_rt_ms: f64,
    pub max_rt_ms: f64,
    /// Time spent on an instruction screen before acknowledging.
    pub reading_ms: f64,
    /// Delay between a wrong response and the correction.
    pub correction_ms: f64,
}

impl Default for ParticipantProfile {
    fn default() -> Self {
        Self {
            error_rate: 0.05,
            min_rt_ms: 350.0,
            max_rt_ms: 1500.0,
            reading_ms: 4000.0,
            correction_ms: 300.0,
        }
    }
}

impl ParticipantProfile {
    /// Reject values the behaviour model cannot sample from: a non-finite or
    /// out-of-range error rate, an empty or non-positive reaction-time range,
    /// and negative or non-finite delays. A zero reading time would never get
    /// past the debounce window.
    pub fn validate(&self) -> Result<(), SimulationError> {
        let invalid =
            |msg: String| -> Result<(), SimulationError> { Err(SimulationError::InvalidProfile(msg)) };
        if !(0.0..=1.0).contains(&self.error_rate) {
            return invalid(format!("error_rate {} not in [0, 1]", self.error_rate));
        }
        if !(self.min_rt_ms.is_finite() && self.max_rt_ms.is_finite()) || self.min_rt_ms <= 0.0 {
            return invalid(format!(
                "reaction time range {}..{} must be finite and positive",
                self.min_rt_ms, self.max_rt_ms
            ));
        }
        if self.min_rt_ms >= self.max_rt_ms {
            return invalid(format!(
                "min_rt_ms {} must be below max_rt_ms {}",
                self.min_rt_ms, self.max_rt_ms
            ));
        }
        if !(self.reading_ms.is_finite() && self.reading_ms > 0.0) {
            return invalid(format!("reading_ms {} must be positive", self.reading_ms));
        }
        if !(self.correction_ms.is_finite() && self.correction_ms >= 0.0) {
            return invalid(format!("correction_ms {} must be non-negative", self.correction_ms));
        }
        Ok(())
    }
}

pub struct SimulatedRun {
    pub session: Session,
    pub results: Vec<TrialResult>,
    /// Wrong responses given (each later corrected).
    pub mistakes: usize,
    pub save_status: SaveStatus,
}

fn opposite(side: Side) -> Side {
    match side {
        Side::Left => Side::Right,
        Side::Right => Side::Left,
    }
}

/// Run one participant through the full test and submit to `sink`.
pub fn simulate_participant(
    pool: Arc<StimulusPool>,
    seed: u64,
    profile: &ParticipantProfile,
    sink: &dyn ResultsSink,
) -> Result<SimulatedRun, SimulationError> {
    profile.validate()?;
    let clock = ManualClock::new(SIM_EPOCH_MS);
    let mut behaviour = SmallRng::seed_from_u64(seed ^ BEHAVIOUR_SEED_SALT);
    let session = bootstrap(&BootstrapParams::default(), &mut behaviour, &clock);
    let mut engine = TrialEngine::new(
        pool,
        session.group,
        SmallRng::seed_from_u64(seed),
        clock.clone(),
    )?;

    let mut mistakes = 0;

    loop {
        match engine.state().phase {
            Phase::GeneralIntro | Phase::BlockInstruction => {
                clock.advance(profile.reading_ms);
                engine.handle_input(Action::Acknowledge);
            }
            Phase::PresentingStimulus => {
                let (Some(stimulus), Some(block)) = (engine.current_stimulus(), engine.current_block())
                else {
                    break;
                };
                let side = correct_side(stimulus.category, block);
                clock.advance(behaviour.random_range(profile.min_rt_ms..profile.max_rt_ms));
                if behaviour.random_bool(profile.error_rate) {
                    engine.handle_input(Action::from(opposite(side)));
                    mistakes += 1;
                    clock.advance(profile.correction_ms);
                }
                engine.handle_input(Action::from(side));
            }
            Phase::Finished => break,
        }
    }

    let save_status = match engine.take_submission() {
        Some(payload) => {
            let outcome = sink.submit(&session, &payload);
            engine.complete_submission(outcome).clone()
        }
        None => engine.save_status().clone(),
    };

    Ok(SimulatedRun {
        session,
        results: engine.results().to_vec(),
        mistakes,
        save_status,
    })
}

/// Run `n` participants in parallel. Participant `i` uses seed `seed + i`.
pub fn simulate_batch(
    pool: Arc<StimulusPool>,
    n: usize,
    seed: u64,
    profile: &ParticipantProfile,
    sink: &dyn ResultsSink,
) -> Result<Vec<SimulatedRun>, SimulationError> {
    profile.validate()?;
    (0..n)
        .into_par_iter()
        .map(|i| simulate_participant(pool.clone(), seed.wrapping_add(i as u64), profile, sink))
        .collect()
}
