//! CLI command handlers. Each command is in its own file.

mod cache;
mod checkpoints;
mod fetch;
mod transition;

pub use cache::run_cache;
pub use checkpoints::run_checkpoints;
pub use fetch::run_fetch;
pub use transition::{run_transition, TransitionArgs};
