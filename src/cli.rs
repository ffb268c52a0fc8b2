//! CLI domain: parse, route, output, and presentation only.

mod output;
mod parse;
mod presentation;
mod route;

pub use output::map_error;
pub use parse::{CacheCommands, Cli, Commands, ConfigCommands, QueueCommands};
pub use presentation::{format_queue_json, format_queue_table, QueueRow};
pub use route::{ReadSelection, RunContext};
