//! Local CPython backend.

mod backend;
pub mod plots;
pub mod runner;

pub use backend::PythonBackend;
