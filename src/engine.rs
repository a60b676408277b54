//! Trial engine: the state machine that sequences blocks and trials.
//!
//! ```text
//! GeneralIntro ──ack──▶ BlockInstruction ──ack──▶ PresentingStimulus
//!                             ▲                      │   ▲
//!                             │ quota reached        │   │ correct, quota not reached
//!                             └──────────────────────┤───┘   (wrong: stay, mistake flag)
//!                                                    ▼
//!                                    Finished (last block's quota reached)
//! ```
//!
//! Every input goes through [`TrialEngine::handle_input`], which drops inputs
//! arriving within [`DEBOUNCE_MS`] of the previous accepted input before any
//! phase logic runs. The engine owns the only mutable run state; callers that
//! share an engine across threads wrap it in a mutex.
//!
//! ## Drawing
//!
//! Candidates for a block are all pool stimuli whose category is on either
//! side. The stimulus shown immediately before (in this block or at the end of
//! the previous one) is excluded when more than one candidate exists; the next
//! stimulus is drawn uniformly from the rest.
//!
//! ## Scoring
//!
//! A wrong response raises the mistake flag and leaves the stimulus on screen.
//! The correct response writes one [`TrialResult`] with
//! `is_correct = !mistake`; the flag resets only when a new stimulus is drawn.

use std::sync::Arc;

use rand::Rng;
use serde::Serialize;
use tracing::{debug, info};

use crate::aggregator::{ResultsAggregator, SaveStatus};
use crate::block_plan::{generate_blocks, validate_against_pool, PlanError};
use crate::clock::Clock;
use crate::constants::DEBOUNCE_MS;
use crate::evaluator::{evaluate, Verdict};
use crate::sink::SinkError;
use crate::stimulus_pool::StimulusPool;
use crate::types::{Action, BlockConfig, CategorySet, Group, ResultsPayload, Side, Stimulus, TrialResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Phase {
    GeneralIntro,
    BlockInstruction,
    PresentingStimulus,
    Finished,
}

/// Mutable run state. Only the engine's transitions change it.
#[derive(Clone, Debug, PartialEq)]
pub struct TestRunState {
    pub phase: Phase,
    pub block_index: usize,
    /// Stimuli drawn so far in the current block.
    pub trial_in_block: usize,
    /// Pool index of the most recently drawn stimulus. Kept across block
    /// boundaries for the no-repeat rule.
    pub current_stimulus: Option<usize>,
    pub presented_at_ms: f64,
    pub mistake: bool,
}

impl TestRunState {
    fn new() -> Self {
        Self {
            phase: Phase::GeneralIntro,
            block_index: 0,
            trial_in_block: 0,
            current_stimulus: None,
            presented_at_ms: 0.0,
            mistake: false,
        }
    }
}

/// Why an input changed nothing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum IgnoreReason {
    Debounced,
    /// Test finished or results being saved.
    Busy,
    /// Action has no meaning in the current phase.
    WrongPhase,
    NoStimulus,
}

/// What follows an accepted response.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Advance {
    NextTrial,
    BlockComplete { next_block_id: u8 },
    TestComplete,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum InputOutcome {
    Ignored { reason: IgnoreReason },
    IntroDismissed,
    BlockStarted { block_id: u8 },
    Mistake,
    Recorded { result: TrialResult, next: Advance },
}

impl InputOutcome {
    pub fn is_ignored(&self) -> bool {
        matches!(self, InputOutcome::Ignored { .. })
    }

    fn ignored(reason: IgnoreReason) -> Self {
        InputOutcome::Ignored { reason }
    }
}

pub struct TrialEngine<R, C> {
    pool: Arc<StimulusPool>,
    blocks: Vec<BlockConfig>,
    /// Pool indices eligible in each block, parallel to `blocks`.
    candidates: Vec<Vec<usize>>,
    group: Group,
    rng: R,
    clock: C,
    state: TestRunState,
    results: ResultsAggregator,
    debounce_ms: f64,
    last_input_ms: Option<f64>,
}

impl<R: Rng, C: Clock> TrialEngine<R, C> {
    /// Engine running the standard plan for `group`.
    pub fn new(pool: Arc<StimulusPool>, group: Group, rng: R, clock: C) -> Result<Self, PlanError> {
        let blocks = generate_blocks(group)?;
        Self::with_blocks(pool, blocks, group, rng, clock)
    }

    /// Engine running an explicit block list. Fails if any block sorts a
    /// category the pool has no stimulus for.
    pub fn with_blocks(
        pool: Arc<StimulusPool>,
        blocks: Vec<BlockConfig>,
        group: Group,
        rng: R,
        clock: C,
    ) -> Result<Self, PlanError> {
        validate_against_pool(&blocks, &pool)?;
        let candidates = blocks
            .iter()
            .map(|b| pool.candidates(b.active_categories()))
            .collect();
        Ok(Self {
            pool,
            blocks,
            candidates,
            group,
            rng,
            clock,
            state: TestRunState::new(),
            results: ResultsAggregator::new(group),
            debounce_ms: DEBOUNCE_MS,
            last_input_ms: None,
        })
    }

    /// Replace the default [`DEBOUNCE_MS`] window.
    pub fn set_debounce_ms(&mut self, ms: f64) {
        self.debounce_ms = ms.max(0.0);
    }

    // ── Input ───────────────────────────────────────────────────────

    /// Entry point for every participant input.
    pub fn handle_input(&mut self, action: Action) -> InputOutcome {
        let now = self.clock.monotonic_ms();
        if let Some(last) = self.last_input_ms {
            if now - last < self.debounce_ms {
                return InputOutcome::ignored(IgnoreReason::Debounced);
            }
        }
        self.last_input_ms = Some(now);

        if self.is_busy() {
            return InputOutcome::ignored(IgnoreReason::Busy);
        }

        match (self.state.phase, action.side()) {
            (Phase::GeneralIntro, None) => self.advance_from_intro(),
            (Phase::BlockInstruction, None) => self.acknowledge_instruction(),
            (Phase::PresentingStimulus, Some(side)) => self.submit_response(side),
            _ => InputOutcome::ignored(IgnoreReason::WrongPhase),
        }
    }

    /// Leave the general intro for the first block's instruction screen.
    pub fn advance_from_intro(&mut self) -> InputOutcome {
        if self.state.phase != Phase::GeneralIntro {
            return InputOutcome::ignored(IgnoreReason::WrongPhase);
        }
        self.state.phase = Phase::BlockInstruction;
        self.state.block_index = 0;
        self.state.trial_in_block = 0;
        InputOutcome::IntroDismissed
    }

    /// Start the current block and present its first stimulus.
    pub fn acknowledge_instruction(&mut self) -> InputOutcome {
        if self.state.phase != Phase::BlockInstruction {
            return InputOutcome::ignored(IgnoreReason::WrongPhase);
        }
        let block_id = self.blocks[self.state.block_index].id;
        self.state.phase = Phase::PresentingStimulus;
        self.draw_next_stimulus();
        debug!(block_id, "block started");
        InputOutcome::BlockStarted { block_id }
    }

    /// Score a left/right response to the stimulus on screen.
    pub fn submit_response(&mut self, side: Side) -> InputOutcome {
        if self.state.phase != Phase::PresentingStimulus {
            return InputOutcome::ignored(IgnoreReason::WrongPhase);
        }
        let Some(stimulus) = self.state.current_stimulus.and_then(|i| self.pool.get(i)) else {
            return InputOutcome::ignored(IgnoreReason::NoStimulus);
        };
        let block = &self.blocks[self.state.block_index];

        match evaluate(stimulus.category, block, side) {
            Verdict::Incorrect => {
                self.state.mistake = true;
                InputOutcome::Mistake
            }
            Verdict::Correct => {
                let reaction_time_ms =
                    (self.clock.monotonic_ms() - self.state.presented_at_ms).max(0.0);
                let result = TrialResult {
                    block_id: block.id,
                    block_title: block.title.clone(),
                    stimulus_id: stimulus.id.clone(),
                    category: stimulus.category,
                    is_correct: !self.state.mistake,
                    reaction_time_ms,
                    timestamp_ms: self.clock.wall_ms(),
                };
                self.results.record(result.clone());
                let next = self.draw_next_stimulus();
                InputOutcome::Recorded { result, next }
            }
        }
    }

    /// Present the next stimulus of the current block, or close the block
    /// (and the test) when its quota is reached.
    fn draw_next_stimulus(&mut self) -> Advance {
        let block = &self.blocks[self.state.block_index];

        if self.state.trial_in_block >= block.trials {
            if self.state.block_index + 1 >= self.blocks.len() {
                self.state.phase = Phase::Finished;
                info!(
                    group = self.group.as_str(),
                    results = self.results.len(),
                    "test complete"
                );
                return Advance::TestComplete;
            }
            let finished_id = block.id;
            self.state.block_index += 1;
            self.state.trial_in_block = 0;
            self.state.phase = Phase::BlockInstruction;
            let next_block_id = self.blocks[self.state.block_index].id;
            info!(block_id = finished_id, next_block_id, "block complete");
            return Advance::BlockComplete { next_block_id };
        }

        let pool = &self.candidates[self.state.block_index];
        let mut available: Vec<usize> = pool.clone();
        if let Some(previous) = self.state.current_stimulus {
            if pool.len() > 1 {
                available.retain(|&i| i != previous);
            }
        }
        // Non-empty: construction rejects blocks with an unpopulated category.
        let pick = available[self.rng.random_range(0..available.len())];

        self.state.current_stimulus = Some(pick);
        self.state.presented_at_ms = self.clock.monotonic_ms();
        self.state.trial_in_block += 1;
        self.state.mistake = false;
        Advance::NextTrial
    }

    // ── Completion ──────────────────────────────────────────────────

    /// Finished or saving: every input is ignored.
    pub fn is_busy(&self) -> bool {
        self.state.phase == Phase::Finished || self.results.is_saving()
    }

    pub fn is_finished(&self) -> bool {
        self.state.phase == Phase::Finished
    }

    /// Payload for the results sink, once, after the test has finished.
    pub fn take_submission(&mut self) -> Option<ResultsPayload> {
        if !self.is_finished() {
            return None;
        }
        self.results.begin_submission()
    }

    pub fn complete_submission(&mut self, outcome: Result<(), SinkError>) -> &SaveStatus {
        self.results.complete_submission(outcome)
    }

    // ── Reads ───────────────────────────────────────────────────────

    pub fn state(&self) -> &TestRunState {
        &self.state
    }

    pub fn group(&self) -> Group {
        self.group
    }

    pub fn blocks(&self) -> &[BlockConfig] {
        &self.blocks
    }

    pub fn pool(&self) -> &StimulusPool {
        &self.pool
    }

    pub fn current_block(&self) -> Option<&BlockConfig> {
        match self.state.phase {
            Phase::BlockInstruction | Phase::PresentingStimulus => {
                self.blocks.get(self.state.block_index)
            }
            Phase::GeneralIntro | Phase::Finished => None,
        }
    }

    /// Stimulus on screen; `None` outside [`Phase::PresentingStimulus`].
    pub fn current_stimulus(&self) -> Option<&Stimulus> {
        if self.state.phase != Phase::PresentingStimulus {
            return None;
        }
        self.state.current_stimulus.and_then(|i| self.pool.get(i))
    }

    pub fn results(&self) -> &[TrialResult] {
        self.results.results()
    }

    pub fn save_status(&self) -> &SaveStatus {
        self.results.status()
    }

    pub fn snapshot(&self) -> EngineSnapshot {
        EngineSnapshot {
            phase: self.state.phase,
            group: self.group,
            block: self.current_block().map(BlockView::from),
            trial_in_block: self.state.trial_in_block,
            stimulus: self.current_stimulus().cloned(),
            mistake: self.state.mistake,
            results_recorded: self.results.len(),
            save_status: self.results.status().clone(),
        }
    }
}

/// Block fields the presentation layer needs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockView {
    pub id: u8,
    pub title: String,
    pub instruction: String,
    pub left_categories: CategorySet,
    pub right_categories: CategorySet,
    pub trials: usize,
}

impl From<&BlockConfig> for BlockView {
    fn from(b: &BlockConfig) -> Self {
        Self {
            id: b.id,
            title: b.title.clone(),
            instruction: b.instruction.clone(),
            left_categories: b.left_categories,
            right_categories: b.right_categories,
            trials: b.trials,
        }
    }
}

/// Read-only copy of the run state taken after a transition.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineSnapshot {
    pub phase: Phase,
    pub group: Group,
    pub block: Option<BlockView>,
    pub trial_in_block: usize,
    pub stimulus: Option<Stimulus>,
    pub mistake: bool,
    pub results_recorded: usize,
    pub save_status: SaveStatus,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::types::{Category, StimulusType};
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    fn stim(id: &str, category: Category) -> Stimulus {
        Stimulus {
            id: id.into(),
            content: id.into(),
            kind: StimulusType::Word,
            category,
        }
    }

    fn small_pool() -> Arc<StimulusPool> {
        Arc::new(
            StimulusPool::from_stimuli(vec![
                stim("x0", Category::Bashkir),
                stim("x1", Category::Bashkir),
                stim("y0", Category::Russian),
            ])
            .unwrap(),
        )
    }

    fn two_blocks() -> Vec<BlockConfig> {
        let left = CategorySet::of(&[Category::Bashkir]);
        let right = CategorySet::of(&[Category::Russian]);
        vec![
            BlockConfig::new(1, "one", "i1", left, right, 2).unwrap(),
            BlockConfig::new(2, "two", "i2", right, left, 1).unwrap(),
        ]
    }

    fn engine(clock: &ManualClock) -> TrialEngine<SmallRng, ManualClock> {
        TrialEngine::with_blocks(
            small_pool(),
            two_blocks(),
            Group::A,
            SmallRng::seed_from_u64(7),
            clock.clone(),
        )
        .unwrap()
    }

    /// Advance past the debounce window, then send `action`.
    fn press(e: &mut TrialEngine<SmallRng, ManualClock>, clock: &ManualClock, action: Action) -> InputOutcome {
        clock.advance(200.0);
        e.handle_input(action)
    }

    fn correct_side_now(e: &TrialEngine<SmallRng, ManualClock>) -> Side {
        let category = e.current_stimulus().unwrap().category;
        if e.current_block().unwrap().left_categories.contains(category) {
            Side::Left
        } else {
            Side::Right
        }
    }

    fn correct_action(e: &TrialEngine<SmallRng, ManualClock>) -> Action {
        Action::from(correct_side_now(e))
    }

    fn wrong_action(e: &TrialEngine<SmallRng, ManualClock>) -> Action {
        match correct_side_now(e) {
            Side::Left => Action::from(Side::Right),
            Side::Right => Action::from(Side::Left),
        }
    }

    #[test]
    fn starts_in_intro_and_ignores_responses() {
        let clock = ManualClock::new(0);
        let mut e = engine(&clock);
        assert_eq!(e.state().phase, Phase::GeneralIntro);
        assert!(press(&mut e, &clock, Action::Left).is_ignored());
        assert_eq!(e.state().phase, Phase::GeneralIntro);
        assert_eq!(press(&mut e, &clock, Action::Acknowledge), InputOutcome::IntroDismissed);
        assert_eq!(e.state().phase, Phase::BlockInstruction);
        assert!(e.current_stimulus().is_none());
    }

    #[test]
    fn acknowledging_block_draws_first_stimulus() {
        let clock = ManualClock::new(0);
        let mut e = engine(&clock);
        press(&mut e, &clock, Action::Acknowledge);
        assert_eq!(
            press(&mut e, &clock, Action::Acknowledge),
            InputOutcome::BlockStarted { block_id: 1 }
        );
        assert_eq!(e.state().phase, Phase::PresentingStimulus);
        assert_eq!(e.state().trial_in_block, 1);
        assert!(e.current_stimulus().is_some());
    }

    #[test]
    fn wrong_then_right_records_one_incorrect_result() {
        let clock = ManualClock::new(0);
        let mut e = engine(&clock);
        press(&mut e, &clock, Action::Acknowledge);
        press(&mut e, &clock, Action::Acknowledge);
        let shown = e.current_stimulus().unwrap().id.clone();

        let wrong = wrong_action(&e);
        assert_eq!(press(&mut e, &clock, wrong), InputOutcome::Mistake);
        assert!(e.state().mistake);
        assert_eq!(e.current_stimulus().unwrap().id, shown);
        assert!(e.results().is_empty());

        let right = correct_action(&e);
        match press(&mut e, &clock, right) {
            InputOutcome::Recorded { result, next } => {
                assert_eq!(result.stimulus_id, shown);
                assert!(!result.is_correct);
                assert_eq!(result.reaction_time_ms, 400.0);
                assert_eq!(next, Advance::NextTrial);
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(e.results().len(), 1);
        assert!(!e.state().mistake);
    }

    #[test]
    fn debounce_drops_close_inputs() {
        let clock = ManualClock::new(0);
        let mut e = engine(&clock);
        press(&mut e, &clock, Action::Acknowledge);
        clock.advance(100.0);
        assert_eq!(
            e.handle_input(Action::Acknowledge),
            InputOutcome::Ignored {
                reason: IgnoreReason::Debounced
            }
        );
        assert_eq!(e.state().phase, Phase::BlockInstruction);
        clock.advance(60.0);
        assert!(!e.handle_input(Action::Acknowledge).is_ignored());
    }

    #[test]
    fn block_quota_moves_to_next_instruction_then_finishes() {
        let clock = ManualClock::new(0);
        let mut e = engine(&clock);
        press(&mut e, &clock, Action::Acknowledge);
        press(&mut e, &clock, Action::Acknowledge);

        let a = correct_action(&e);
        assert!(matches!(
            press(&mut e, &clock, a),
            InputOutcome::Recorded { next: Advance::NextTrial, .. }
        ));
        let a = correct_action(&e);
        assert!(matches!(
            press(&mut e, &clock, a),
            InputOutcome::Recorded {
                next: Advance::BlockComplete { next_block_id: 2 },
                ..
            }
        ));
        assert_eq!(e.state().phase, Phase::BlockInstruction);
        assert_eq!(e.state().trial_in_block, 0);
        assert_eq!(e.current_block().unwrap().id, 2);

        press(&mut e, &clock, Action::Acknowledge);
        let a = correct_action(&e);
        assert!(matches!(
            press(&mut e, &clock, a),
            InputOutcome::Recorded { next: Advance::TestComplete, .. }
        ));
        assert!(e.is_finished());
        assert_eq!(e.results().len(), 3);
        assert_eq!(
            press(&mut e, &clock, Action::Left),
            InputOutcome::Ignored {
                reason: IgnoreReason::Busy
            }
        );
    }

    #[test]
    fn submission_only_after_finish_and_only_once() {
        let clock = ManualClock::new(0);
        let mut e = engine(&clock);
        assert!(e.take_submission().is_none());
        press(&mut e, &clock, Action::Acknowledge);
        for _ in 0..2 {
            press(&mut e, &clock, Action::Acknowledge);
            while e.state().phase == Phase::PresentingStimulus {
                let a = correct_action(&e);
                press(&mut e, &clock, a);
            }
        }
        assert!(e.is_finished());
        let payload = e.take_submission().unwrap();
        assert_eq!(payload.data.len(), 3);
        assert!(e.take_submission().is_none());
        assert_eq!(e.complete_submission(Ok(())), &SaveStatus::Saved);
    }

    #[test]
    fn no_immediate_repeat_in_two_stimulus_block() {
        let clock = ManualClock::new(0);
        let pool = small_pool();
        let only_bashkir = CategorySet::of(&[Category::Bashkir]);
        let blocks = vec![BlockConfig::new(
            1,
            "b",
            "i",
            only_bashkir,
            CategorySet::of(&[Category::Russian]),
            50,
        )
        .unwrap()];
        let mut e = TrialEngine::with_blocks(pool, blocks, Group::A, SmallRng::seed_from_u64(3), clock.clone())
            .unwrap();
        e.advance_from_intro();
        e.acknowledge_instruction();
        let mut previous = e.current_stimulus().unwrap().id.clone();
        for _ in 0..49 {
            let a = correct_action(&e);
            press(&mut e, &clock, a);
            let id = e.current_stimulus().unwrap().id.clone();
            assert_ne!(id, previous);
            previous = id;
        }
    }

    #[test]
    fn missing_category_fails_construction() {
        let pool = Arc::new(StimulusPool::from_stimuli(vec![stim("x0", Category::Bashkir)]).unwrap());
        let err = TrialEngine::with_blocks(
            pool,
            two_blocks(),
            Group::A,
            SmallRng::seed_from_u64(1),
            ManualClock::new(0),
        )
        .err()
        .unwrap();
        assert_eq!(
            err,
            PlanError::MissingStimuli {
                block_id: 1,
                category: Category::Russian
            }
        );
    }

    #[test]
    fn snapshot_hides_stimulus_between_blocks() {
        let clock = ManualClock::new(0);
        let mut e = engine(&clock);
        let snap = e.snapshot();
        assert_eq!(snap.phase, Phase::GeneralIntro);
        assert!(snap.block.is_none());
        press(&mut e, &clock, Action::Acknowledge);
        let snap = e.snapshot();
        assert_eq!(snap.block.as_ref().unwrap().title, "one");
        assert!(snap.stimulus.is_none());
        let json = serde_json::to_value(&snap).unwrap();
        assert_eq!(json["phase"], "blockInstruction");
        assert_eq!(json["saveStatus"]["state"], "collecting");
    }
}
