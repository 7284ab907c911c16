// src/config/mod.rs

//! Configuration loading and validation.
//!
//! - [`model`] is the serde mapping of `Forkrun.toml`.
//! - [`validate`] turns a [`RawConfigFile`] into a checked [`ConfigFile`].
//! - [`loader`] reads files from disk.
//! - [`duration`] parses the `"5s"` / `"100ms"` strings used for timings.

pub mod duration;
pub mod loader;
pub mod model;
pub mod validate;

pub use duration::parse_duration;
pub use loader::{default_config_path, load_and_validate, load_from_path};
pub use model::{ConfigFile, ConfigSection, RawConfigFile, RunSettings, WorkerSection};
