//! Process execution: supervised shell commands, process-tree termination
//! and cancellation.

pub mod command;
pub mod platform;

pub use command::{execute, CommandOptions, CommandOutput, Termination, DEFAULT_TAIL_LINES};
pub use platform::{
    env_reference, install_interrupt_handler, kill_process_tree, quote_argument, shell_command,
    CancelToken,
};
