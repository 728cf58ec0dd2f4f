//! Core types for the PyteCode execution session.
//!
//! This crate provides the shared building blocks:
//! - `BackendState` / `RunState` / `ViewMode` - Session lifecycle enums
//! - `LibrarySet` - Selected Python libraries and the known catalog
//! - `OutputStore` - Broadcast + history of the current run's output
//! - `EditorBuffer` and export naming for the host UI
//! - Backend and key-value storage traits

pub mod editor;
pub mod export;
pub mod library;
pub mod output;
pub mod output_store;
pub mod state;
pub mod theme;
pub mod traits;

pub use editor::EditorBuffer;
pub use export::SourceExport;
pub use library::{AVAILABLE_LIBRARIES, LibraryInfo, LibrarySet};
pub use output::{ImageArtifact, OutputChunk, OutputEvent, RunOutput};
pub use output_store::OutputStore;
pub use state::{BackendState, RunState, ViewMode};
pub use theme::Theme;
pub use traits::{BackendError, ExecutionBackend, KeyValueStore, StorageError, StreamSender};
