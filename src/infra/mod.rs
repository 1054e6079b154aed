//! Infrastructure layer
//!
//! Filesystem helpers, external processes, source enumeration and task
//! output. Everything that writes to disk or spawns a process lives here;
//! the core only reads file metadata.

pub mod executor;
pub mod filesystem;
pub mod sink;
pub mod sources;
