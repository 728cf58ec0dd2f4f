//! Session notifications and snapshots.

use pytecode_core::{BackendState, LibrarySet, RunState, ViewMode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Something observable changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Human readable initialization progress.
    Progress(String),
    BackendState(BackendState),
    /// Initialization failed with this message.
    InitFailed(String),
    RunState(RunState),
    ViewMode(ViewMode),
    RunFinished { run_id: Uuid, success: bool },
}

/// Everything a UI needs to render the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub backend_state: BackendState,
    pub run_state: RunState,
    pub view_mode: ViewMode,
    pub library_selection: LibrarySet,
    pub loaded_libraries: Option<LibrarySet>,
    pub text_output: Vec<String>,
    pub image_count: usize,
    pub last_error: Option<String>,
}

impl SessionSnapshot {
    /// Whether the Graphics view may be offered.
    #[must_use]
    pub const fn graphics_available(&self) -> bool {
        self.image_count > 0
    }
}
