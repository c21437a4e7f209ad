//! Command handlers module.
//!
//! - `io.rs`: import and export commands

mod io;

pub use io::{ExportArgs, ImportArgs, cmd_export, cmd_import};
