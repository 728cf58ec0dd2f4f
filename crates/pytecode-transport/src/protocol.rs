//! Wire protocol for client-server communication.

use pytecode_core::{
    BackendState, ImageArtifact, LibrarySet, OutputEvent, RunState, SourceExport, Theme, ViewMode,
};
use pytecode_session::{PlaygroundAction, SessionEvent, SessionSnapshot};
use serde::{Deserialize, Serialize};

/// Message from client to server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Replace the editor contents.
    UpdateSource { source: String },
    /// Run the editor contents, optionally replacing them first.
    Run {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        source: Option<String>,
    },
    /// Restore the welcome program and clear output.
    Reset,
    /// Empty the editor and output.
    Clear,
    /// Request the editor contents as a file.
    Save,
    /// (Re)initialize with the saved library selection.
    Initialize,
    SetLibraries { libraries: LibrarySet },
    SetViewMode { mode: ViewMode },
    SetTheme { theme: Theme },
    /// Request a full state snapshot.
    Snapshot,
    /// Ping for keepalive.
    Ping,
}

impl From<PlaygroundAction> for ClientMessage {
    fn from(action: PlaygroundAction) -> Self {
        match action {
            PlaygroundAction::Run => Self::Run { source: None },
            PlaygroundAction::Reset => Self::Reset,
            PlaygroundAction::Clear => Self::Clear,
            PlaygroundAction::Save => Self::Save,
        }
    }
}

/// Message from server to client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// One console line; `error` marks stderr.
    Output { text: String, error: bool },
    /// A plot (base64 PNG).
    Image { data: String },
    /// Previous output was discarded.
    Cleared,
    Progress { message: String },
    BackendState {
        state: BackendState,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    RunState { state: RunState },
    RunFinished { run_id: String, success: bool },
    ViewMode { mode: ViewMode },
    /// Editor contents after a reset or clear.
    Source { source: String },
    /// Downloadable copy of the editor contents.
    Export { file_name: String, contents: String },
    Theme { theme: Theme },
    Snapshot { snapshot: SessionSnapshot },
    /// Error message.
    Error { message: String },
    /// Pong response.
    Pong,
}

impl ServerMessage {
    /// Create an image message.
    #[must_use]
    pub fn image(image: &ImageArtifact) -> Self {
        Self::Image {
            data: image.to_base64(),
        }
    }

    /// Decode image data from base64.
    #[must_use]
    pub fn decode_image(&self) -> Option<ImageArtifact> {
        if let Self::Image { data } = self {
            ImageArtifact::from_base64(data).ok()
        } else {
            None
        }
    }

    /// Wire form of an output store event. `Finished` has none; the
    /// session reports run completion itself.
    #[must_use]
    pub fn from_output_event(event: &OutputEvent) -> Option<Self> {
        match event {
            OutputEvent::Text(chunk) => Some(Self::Output {
                text: chunk.render(),
                error: chunk.is_stderr(),
            }),
            OutputEvent::Image(image) => Some(Self::image(image)),
            OutputEvent::Cleared => Some(Self::Cleared),
            OutputEvent::Finished => None,
        }
    }

    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }
}

impl From<SessionEvent> for ServerMessage {
    fn from(event: SessionEvent) -> Self {
        match event {
            SessionEvent::Progress(message) => Self::Progress { message },
            SessionEvent::BackendState(state) => Self::BackendState { state, error: None },
            SessionEvent::InitFailed(message) => Self::BackendState {
                state: BackendState::Failed,
                error: Some(message),
            },
            SessionEvent::RunState(state) => Self::RunState { state },
            SessionEvent::ViewMode(mode) => Self::ViewMode { mode },
            SessionEvent::RunFinished { run_id, success } => Self::RunFinished {
                run_id: run_id.to_string(),
                success,
            },
        }
    }
}

impl From<SourceExport> for ServerMessage {
    fn from(export: SourceExport) -> Self {
        Self::Export {
            file_name: export.file_name,
            contents: export.contents,
        }
    }
}

#[cfg(test)]
mod tests {
    use pytecode_core::OutputChunk;

    use super::*;

    #[test]
    fn test_image_roundtrip() {
        let image = ImageArtifact::new(&b"\x89PNG data"[..]);
        let msg = ServerMessage::image(&image);
        assert_eq!(msg.decode_image().unwrap(), image);
        assert!(ServerMessage::Pong.decode_image().is_none());
    }

    #[test]
    fn test_client_message_wire_format() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"set_libraries","libraries":["pandas","numpy"]}"#)
                .unwrap();
        let expected: LibrarySet = ["numpy", "pandas"].into_iter().collect();
        assert_eq!(msg, ClientMessage::SetLibraries { libraries: expected });

        let msg: ClientMessage = serde_json::from_str(r#"{"type":"run"}"#).unwrap();
        assert_eq!(msg, ClientMessage::Run { source: None });

        let json = serde_json::to_string(&ClientMessage::SetViewMode {
            mode: ViewMode::Graphics,
        })
        .unwrap();
        assert_eq!(json, r#"{"type":"set_view_mode","mode":"graphics"}"#);
    }

    #[test]
    fn test_output_events() {
        let msg = ServerMessage::from_output_event(&OutputEvent::Text(OutputChunk::Stderr(
            "boom".into(),
        )))
        .unwrap();
        assert_eq!(
            msg,
            ServerMessage::Output {
                text: "Error: boom".into(),
                error: true
            }
        );
        assert!(ServerMessage::from_output_event(&OutputEvent::Finished).is_none());
    }

    #[test]
    fn test_init_failure_carries_message() {
        let msg = ServerMessage::from(SessionEvent::InitFailed("no python".into()));
        let json = serde_json::to_string(&msg).unwrap();
        assert_eq!(
            json,
            r#"{"type":"backend_state","state":"failed","error":"no python"}"#
        );
    }

    #[test]
    fn test_actions_map_to_messages() {
        assert_eq!(
            ClientMessage::from(PlaygroundAction::Run),
            ClientMessage::Run { source: None }
        );
        assert_eq!(ClientMessage::from(PlaygroundAction::Save), ClientMessage::Save);
    }
}
