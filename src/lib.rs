//! # IAT: Implicit Association Test engine
//!
//! Runs the standard 7-block IAT: participants sort words (BASHKIR / RUSSIAN)
//! and images (MOUNTAIN / SWAMP) to a left or right key as fast as they can,
//! and per-trial correctness and latency are collected and submitted to a
//! results store at the end.
//!
//! ## Pipeline
//!
//! | Stage | Module | Description |
//! |-------|--------|-------------|
//! | Bootstrap | [`session`] | User id (inherited or fresh UUID), referrer, coin-flip group |
//! | Plan | [`block_plan`] | Group → 7 [`types::BlockConfig`]s, fixed trial counts `[20, 20, 20, 40, 40, 20, 40]` |
//! | Stimuli | [`stimulus_pool`] | Word lists + numerically ordered image directory scan |
//! | Run | [`engine`] | State machine: intro → instruction → stimulus → … → finished |
//! | Score | [`evaluator`] | Pressed side vs. the side holding the stimulus's category |
//! | Collect | [`aggregator`] | Ordered result log, exactly-once submission |
//! | Store | [`sink`] | Memory, JSON file, or Supabase REST |
//!
//! [`server`] exposes sessions over HTTP; [`simulation`] drives the engine with
//! seeded synthetic participants, summarised by [`statistics`].
//!
//! ## Determinism
//!
//! Randomness (group, stimulus draws) comes from an injected `rand::Rng` and
//! time from an injected [`clock::Clock`]. With a seeded `SmallRng` and a
//! [`clock::ManualClock`] a whole run is reproducible.

pub mod aggregator;
pub mod block_plan;
pub mod clock;
pub mod constants;
pub mod engine;
pub mod env_config;
pub mod evaluator;
pub mod labels;
pub mod server;
pub mod session;
pub mod simulation;
pub mod sink;
pub mod statistics;
pub mod stimulus_pool;
pub mod types;
