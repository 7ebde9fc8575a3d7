//! CLI command handlers, one per file.

mod completions;
mod copy;
mod get;
mod shell;

pub use completions::{run_completions, run_manpage};
pub use copy::run_copy;
pub use get::run_get;
pub use shell::run_shell;
