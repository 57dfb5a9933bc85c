#![deny(
    clippy::nursery,
    clippy::pedantic,
    missing_docs,
    clippy::missing_docs_in_private_items,
)]

//! # plg-gen – random business processes and synthetic event logs
//!
//! ## Pipeline overview
//! 1. Process generation ([`generate_process`](crate::generator::generate_process)) – grow a
//!    sound, block-structured [`Process`](plg_core::Process) from a weighted grammar of
//!    single-entry/single-exit patterns (sequence, parallel and exclusive blocks, loops, skips).
//! 2. Evolution ([`evolve_process`](crate::generator::evolve_process)) – optionally derive a
//!    variant of a process by splicing fresh fragments in place of some of its tasks.
//! 3. Simulation ([`LogGenerator`](crate::simulation::LogGenerator)) – play the token game of
//!    the process once per case on a bounded pool of worker threads, with configurable noise,
//!    and collect the traces into an [`EventLog`](crate::simulation::EventLog).
//! 4. Streaming ([`StreamBuffer`](crate::stream::StreamBuffer)) – interleave finished traces into
//!    a single time-ordered event stream.
//!
//! All long-running stages carry [`tracing`] spans.

pub mod config;
pub mod generator;
pub mod noise;
pub mod simulation;
pub mod stream;
pub mod utils;

pub use config::{
    EvolutionConfiguration,
    GeneratorConfig,
    RandomizationConfiguration,
    SimulationConfiguration,
};
pub use generator::{
    evolve_process,
    generate_process,
};
pub use noise::NoiseConfiguration;
pub use simulation::{
    EventLog,
    LogGenerator,
};
