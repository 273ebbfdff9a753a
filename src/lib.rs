//! Resolve loosely-specified host targets and run commands on them over ssh.

pub mod cli;
pub mod config;
pub mod error;
pub mod executor;
pub mod fuzzy;
pub mod models;
pub mod registry;
pub mod resolve;
pub mod ssh_service;

pub use error::{ExecError, ResolveError, ValidationError, ValidationErrors};
pub use executor::{execute, Dispatcher, ExecOptions, ExecResult};
pub use models::Connection;
pub use registry::Registry;
pub use resolve::{resolve_target, MatchMethod, ResolveResult};
