//! Output formatting for CLI.

mod json;
mod status;

pub use json::JsonEvents;
pub use status::StatusLine;
