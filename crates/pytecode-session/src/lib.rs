//! Execution session and preferences for the PyteCode playground.
//!
//! Provides:
//! - `ExecutionSession` - Backend lifecycle, run serialization, output capture
//! - `Playground` - Editor buffer + session for a host UI
//! - Preference persistence and key-value stores (memory, JSON file)

pub mod error;
pub mod events;
pub mod playground;
pub mod preferences;
pub mod session;
pub mod storage;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use error::{ExecutionError, SessionError};
pub use events::{SessionEvent, SessionSnapshot};
pub use playground::{Playground, PlaygroundAction};
pub use session::ExecutionSession;
