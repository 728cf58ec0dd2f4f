//! Terminal transport bridge driven by crossterm key events.

use std::sync::Arc;

use crossterm::event::{Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use pytecode_core::traits::{ExecutionBackend, KeyValueStore};
use pytecode_session::{ExecutionSession, Playground, PlaygroundAction};
use tokio::sync::mpsc;

use crate::{
    dispatch,
    protocol::{ClientMessage, ServerMessage},
};

/// Map a key press to its playground shortcut.
///
/// Shift+Enter runs, Alt+R resets, Ctrl+L clears and Ctrl+S saves.
#[must_use]
pub fn key_to_action(key: &KeyEvent) -> Option<PlaygroundAction> {
    if key.kind != KeyEventKind::Press {
        return None;
    }
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
    match key.code {
        KeyCode::Enter if key.modifiers.contains(KeyModifiers::SHIFT) => {
            Some(PlaygroundAction::Run)
        }
        KeyCode::Char('r' | 'R') if key.modifiers.contains(KeyModifiers::ALT) => {
            Some(PlaygroundAction::Reset)
        }
        KeyCode::Char('l' | 'L') if ctrl => Some(PlaygroundAction::Clear),
        KeyCode::Char('s' | 'S') if ctrl => Some(PlaygroundAction::Save),
        _ => None,
    }
}

/// TUI bridge for connecting a terminal editor to a session.
pub struct TuiBridge {
    /// Sender for client messages.
    pub client_tx: mpsc::UnboundedSender<ClientMessage>,
    /// Receiver for server messages.
    pub server_rx: mpsc::UnboundedReceiver<ServerMessage>,
}

impl TuiBridge {
    /// Create a new TUI bridge.
    ///
    /// Returns the bridge and a channel pair for the session side.
    #[must_use]
    pub fn new() -> (Self, TuiSession) {
        let (client_tx, client_rx) = mpsc::unbounded_channel();
        let (server_tx, server_rx) = mpsc::unbounded_channel();

        let bridge = Self {
            client_tx,
            server_rx,
        };

        let session = TuiSession {
            client_rx,
            server_tx,
        };

        (bridge, session)
    }

    /// Send a message to the session.
    ///
    /// # Errors
    /// Returns error if channel is closed.
    pub fn send(&self, msg: ClientMessage) -> Result<(), SendError> {
        self.client_tx.send(msg).map_err(|_| SendError::ChannelClosed)
    }

    /// Trigger `action` against the editor contents `source`.
    ///
    /// # Errors
    /// Returns error if channel is closed.
    pub fn send_action(&self, action: PlaygroundAction, source: &str) -> Result<(), SendError> {
        if matches!(action, PlaygroundAction::Run | PlaygroundAction::Save) {
            self.send(ClientMessage::UpdateSource {
                source: source.to_string(),
            })?;
        }
        self.send(action.into())
    }

    /// Handle a crossterm event while `source` is in the editor.
    ///
    /// Returns the shortcut that was triggered, if any.
    pub fn handle_event(&self, event: &Event, source: &str) -> Option<PlaygroundAction> {
        let Event::Key(key) = event else {
            return None;
        };
        let action = key_to_action(key)?;
        if let Err(e) = self.send_action(action, source) {
            tracing::warn!(?action, "Dropped shortcut: {e}");
        }
        Some(action)
    }

    /// Receive a server message (non-blocking).
    pub fn try_recv(&mut self) -> Option<ServerMessage> {
        self.server_rx.try_recv().ok()
    }
}

impl Default for TuiBridge {
    fn default() -> Self {
        Self::new().0
    }
}

/// Session side of the TUI bridge.
pub struct TuiSession {
    /// Receiver for client messages.
    pub client_rx: mpsc::UnboundedReceiver<ClientMessage>,
    /// Sender for server messages.
    pub server_tx: mpsc::UnboundedSender<ServerMessage>,
}

impl TuiSession {
    /// Receive a client message.
    pub async fn recv(&mut self) -> Option<ClientMessage> {
        self.client_rx.recv().await
    }

    /// Drive a playground over `session` until the bridge is dropped.
    pub async fn serve<B, K>(mut self, session: Arc<ExecutionSession<B, K>>)
    where
        B: ExecutionBackend + 'static,
        K: KeyValueStore + 'static,
    {
        let forwarders = dispatch::spawn_forwarders(&session, &self.server_tx);
        let mut playground = Playground::new(session);
        dispatch::send_greeting(&playground, &self.server_tx).await;

        while let Some(msg) = self.recv().await {
            dispatch::handle_client_message(&mut playground, msg, &self.server_tx).await;
        }

        for task in forwarders {
            task.abort();
        }
    }
}

/// Send error.
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("Channel closed")]
    ChannelClosed,
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use pytecode_core::LibrarySet;
    use pytecode_session::{storage::MemoryStore, testing::ScriptedBackend};
    use tokio_test::assert_ok;

    use super::*;

    fn key(code: KeyCode, modifiers: KeyModifiers) -> KeyEvent {
        KeyEvent::new(code, modifiers)
    }

    #[test]
    fn test_shortcuts() {
        assert_eq!(
            key_to_action(&key(KeyCode::Enter, KeyModifiers::SHIFT)),
            Some(PlaygroundAction::Run)
        );
        assert_eq!(
            key_to_action(&key(KeyCode::Char('r'), KeyModifiers::ALT)),
            Some(PlaygroundAction::Reset)
        );
        assert_eq!(
            key_to_action(&key(KeyCode::Char('l'), KeyModifiers::CONTROL)),
            Some(PlaygroundAction::Clear)
        );
        assert_eq!(
            key_to_action(&key(KeyCode::Char('s'), KeyModifiers::CONTROL)),
            Some(PlaygroundAction::Save)
        );
        assert_eq!(key_to_action(&key(KeyCode::Enter, KeyModifiers::NONE)), None);
        assert_eq!(key_to_action(&key(KeyCode::Char('r'), KeyModifiers::NONE)), None);
    }

    #[test]
    fn test_key_release_is_ignored() {
        let mut release = key(KeyCode::Enter, KeyModifiers::SHIFT);
        release.kind = KeyEventKind::Release;
        assert_eq!(key_to_action(&release), None);
    }

    #[test]
    fn test_run_sends_source_first() {
        let (bridge, mut session) = TuiBridge::new();
        let event = Event::Key(key(KeyCode::Enter, KeyModifiers::SHIFT));
        assert_eq!(
            bridge.handle_event(&event, "print(1)"),
            Some(PlaygroundAction::Run)
        );

        assert_eq!(
            session.client_rx.try_recv().unwrap(),
            ClientMessage::UpdateSource {
                source: "print(1)".into()
            }
        );
        assert_eq!(
            session.client_rx.try_recv().unwrap(),
            ClientMessage::Run { source: None }
        );

        let event = Event::Key(key(KeyCode::Char('x'), KeyModifiers::NONE));
        assert_eq!(bridge.handle_event(&event, "print(1)"), None);
        assert!(session.client_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_serve_runs_code() {
        let session = ExecutionSession::new(ScriptedBackend::new(), MemoryStore::new());
        assert_ok!(session.initialize(LibrarySet::new()).await);

        let (mut bridge, tui_session) = TuiBridge::new();
        let server = tokio::spawn(tui_session.serve(Arc::new(session)));

        assert_ok!(bridge.send_action(PlaygroundAction::Run, "print('from tui')"));

        let received = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                match bridge.server_rx.recv().await {
                    Some(ServerMessage::Output { text, .. }) => break text,
                    Some(_) => {}
                    None => panic!("server closed"),
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(received, "from tui");

        drop(bridge);
        assert_ok!(server.await);
    }
}
