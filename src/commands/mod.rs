//! CLI command handlers.

mod context;
mod subscriptions;
mod sync;

pub use subscriptions::{run_add_command, run_list_command, run_remove_command};
pub use sync::{run_scheduler_command, run_update_command};
