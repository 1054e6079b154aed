//! Core business logic module
//!
//! Product definitions, selection, dependency ordering, staleness decisions
//! and phase orchestration. Process execution and filesystem helpers live in
//! [`crate::infra`].
//!
//! # Submodules
//!
//! - [`manifest`] - Manifest (prodctl.toml) parsing
//! - [`project`] - Loaded project (manifest, catalog, layout)
//! - [`product`] - Product, stage and identifier types
//! - [`selector`] - Selector parsing and resolution
//! - [`resolver`] - Dependency closure, graph and topological order
//! - [`layout`] - Output path derivation
//! - [`staleness`] - Build and dist staleness checks
//! - [`build_env`] - Script environment setup
//! - [`orchestrator`] - Build → Dist → Docker pipeline

pub mod build_env;
pub mod layout;
pub mod manifest;
pub mod orchestrator;
pub mod product;
pub mod project;
pub mod resolver;
pub mod selector;
pub mod staleness;
