//! Shared OS/process helpers used by more than one facet.

pub mod command;
pub mod process;

pub use command::{run_argv, run_argv_sudo, CommandOutput};
pub use process::{is_process_alive, read_pid_file};
