//! External command execution

pub mod retry;
pub mod runner;

pub use retry::{RetryOptions, RetryingExecutor, SleepFn};
pub use runner::{CommandOutput, CommandRunner, CommandSpec, ProcessRunner};
