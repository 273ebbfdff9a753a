//! Parallel command execution across resolved hosts.

mod dispatcher;
mod output;
mod prefix_writer;
mod result_types;
mod runner;

pub use dispatcher::{execute, Dispatcher};
pub use output::{count_errors, format_grouped_output, has_errors};
pub use prefix_writer::{shared_sink, PrefixWriter, SharedSink};
pub use result_types::{ExecOptions, ExecResult, DEFAULT_PARALLEL, NOT_RUN_EXIT_CODE};
pub use runner::{CommandRunner, SshRunner};
