#![deny(
    clippy::nursery,
    clippy::pedantic,
    missing_docs,
    clippy::missing_docs_in_private_items,
)]

//! # plg-core – process graph model for the process log generator
//!
//! This crate holds the pieces shared by the generator and the simulator:
//!
//! - [`model`] – the [`Process`](model::Process) graph of start/end events, tasks, gateways and
//!   sequences, plus the data objects attached to them, with the soundness check that every
//!   generated or imported process must pass.
//! - [`script`] – per-case value functions (durations, data values) injected into tasks and data
//!   objects.
//! - [`errors`] – the error taxonomy (illegal sequences, invalid processes, failing scripts,
//!   configuration errors).
//! - [`logging`] – workspace-standard `tracing` setup.

pub mod errors;
pub mod logging;
pub mod model;
pub mod script;

pub use errors::{
    ConfigError,
    InvalidRule,
    ProcessError,
    ScriptError,
    SequenceViolation,
};
pub use model::{
    ComponentId,
    Process,
};
