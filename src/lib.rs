//! prodctl - multi-product build, dist and docker orchestrator
//!
//! A project declares products in `prodctl.toml`. Each product may compile
//! executables for several targets, package them into dist artifacts and
//! build docker images, and may depend on other products. prodctl runs
//! those phases in dependency order and skips outputs that are up to date.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`cli`] - Command-line interface parsing and output formatting
//! - [`core`] - Selection, ordering, staleness and orchestration
//! - [`infra`] - Infrastructure layer (filesystem, processes, task output)
//! - [`config`] - Configuration and constants
//! - [`error`] - Error types and handling

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod infra;

#[cfg(test)]
pub mod test_utils;
