//! Configuration constants
//!
//! - [`defaults`] - Default values for the manifest and the CLI

pub mod defaults;
