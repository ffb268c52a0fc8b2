//! Config sources, lowest precedence first.

pub mod env;
pub mod global_file;
pub mod workspace_file;
