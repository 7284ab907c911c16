// src/exec/mod.rs

//! Process execution layer.
//!
//! - [`command`] builds self-contained [`WorkerSpec`]s from tasks.
//! - [`backend`] provides the `WorkerBackend` trait and the production
//!   [`ProcessBackend`]; tests replace it with a fake.
//! - [`supervisor`] owns one worker process from start-up delay to exit.
//! - [`signals`] delivers interrupt/kill to a worker's process group.

pub mod backend;
pub mod command;
pub mod signals;
pub(crate) mod supervisor;

pub use backend::{ProcessBackend, WorkerBackend};
pub use command::{CommandSpec, WorkerSpec, WorkerTemplate};
pub use signals::WorkerSignal;
