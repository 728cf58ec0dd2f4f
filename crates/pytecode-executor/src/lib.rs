//! Subprocess CPython execution backend.
//!
//! Provides:
//! - `PythonBackend` - `ExecutionBackend` over a local interpreter
//! - `PythonConfig` - Interpreter command, working directory, limits
//! - Command building and executable resolution utilities

pub mod command;
pub mod config;
pub mod python;
pub mod resolve;

pub use command::{CommandBuilder, CommandParts};
pub use config::PythonConfig;
pub use python::PythonBackend;
pub use resolve::resolve_executable_path;
