// src/config/mod.rs

//! Configuration loading and validation for taskstream.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Validate basic invariants like buffer sizes and intervals (`validate.rs`).
//! - Parse human duration strings (`duration.rs`).

pub mod duration;
pub mod loader;
pub mod model;
pub mod validate;

pub use duration::parse_duration;
pub use loader::{load_and_validate, load_from_path, load_or_default};
pub use model::{ConfigFile, ExecutorConfig, RawConfigFile, StreamConfig};
