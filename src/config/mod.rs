// src/config/mod.rs

//! Configuration loading and validation for stagedag.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Validate field combinations and DAG correctness (`validate.rs`).
//! - Build a `PipelineDefinition` from the validated file (`build.rs`).

pub mod build;
pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{default_config_path, load_and_validate, load_from_path};
pub use model::{
    ConfigFile, DefaultSection, PipelineSection, RawConfigFile, StagingSection, TaskConfig,
    TaskKind,
};
