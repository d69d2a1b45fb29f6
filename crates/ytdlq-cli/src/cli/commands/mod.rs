//! CLI command handlers, one file per subcommand.

mod add;
mod failed;
mod list;
mod requeue;
mod run;

pub use add::{run_add, AddArgs};
pub use failed::run_failed;
pub use list::run_list;
pub use requeue::run_requeue;
pub use run::{run_engine, RunArgs};
