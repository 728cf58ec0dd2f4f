//! Applies client messages to a playground and feeds session updates
//! back to the client.

use std::sync::Arc;

use futures::StreamExt;
use pytecode_core::traits::{ExecutionBackend, KeyValueStore};
use pytecode_session::{ExecutionSession, Playground, SessionError};
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_stream::wrappers::BroadcastStream;

use crate::protocol::{ClientMessage, ServerMessage};

/// Outgoing half of a client connection.
pub type ServerSender = mpsc::UnboundedSender<ServerMessage>;

/// Forward session events and console output to `tx`.
///
/// Both tasks stop once `tx` is closed. Subscriptions are taken before
/// this returns, so nothing emitted afterwards is missed.
pub fn spawn_forwarders<B, K>(
    session: &Arc<ExecutionSession<B, K>>,
    tx: &ServerSender,
) -> [JoinHandle<()>; 2]
where
    B: ExecutionBackend,
    K: KeyValueStore,
{
    let mut events = BroadcastStream::new(session.subscribe());
    let events_tx = tx.clone();
    let events_task = tokio::spawn(async move {
        while let Some(event) = events.next().await {
            match event {
                Ok(event) => {
                    if events_tx.send(event.into()).is_err() {
                        break;
                    }
                }
                Err(e) => tracing::warn!("Session event subscriber lagged: {e}"),
            }
        }
    });

    let mut output = session.output().history_plus_stream();
    let output_tx = tx.clone();
    let output_task = tokio::spawn(async move {
        while let Some(event) = output.next().await {
            let Some(msg) = ServerMessage::from_output_event(&event) else {
                continue;
            };
            if output_tx.send(msg).is_err() {
                break;
            }
        }
    });

    [events_task, output_task]
}

/// Messages sent to a client right after it connects.
pub async fn send_greeting<B, K>(playground: &Playground<B, K>, tx: &ServerSender)
where
    B: ExecutionBackend,
    K: KeyValueStore,
{
    let _ = tx.send(ServerMessage::Snapshot {
        snapshot: playground.session().snapshot(),
    });
    let _ = tx.send(ServerMessage::Source {
        source: playground.source().to_string(),
    });
    match playground.theme().await {
        Ok(theme) => {
            let _ = tx.send(ServerMessage::Theme { theme });
        }
        Err(e) => tracing::warn!("Failed to load theme: {e}"),
    }
}

/// Report failures the client would not otherwise see. Execution errors
/// already reached the console and init failures arrive as events.
fn report(tx: &ServerSender, result: Result<(), SessionError>) {
    match result {
        Ok(()) | Err(SessionError::Execution(_) | SessionError::BackendInit(_)) => {}
        Err(e) => {
            let _ = tx.send(ServerMessage::error(e.to_string()));
        }
    }
}

fn spawn_run<B, K>(session: Arc<ExecutionSession<B, K>>, source: String, tx: ServerSender)
where
    B: ExecutionBackend + 'static,
    K: KeyValueStore + 'static,
{
    tokio::spawn(async move {
        let result = session.run(&source).await.map(|_| ());
        report(&tx, result);
    });
}

/// Send the editor contents after a reset or clear.
fn send_source<B, K>(playground: &Playground<B, K>, cleared: bool, tx: &ServerSender)
where
    B: ExecutionBackend,
    K: KeyValueStore,
{
    if !cleared {
        let _ = tx.send(ServerMessage::error(
            "Output cannot be cleared while code is running",
        ));
    }
    let _ = tx.send(ServerMessage::Source {
        source: playground.source().to_string(),
    });
}

/// Apply one client message.
///
/// Runs and (re)initializations are spawned so the connection keeps
/// reading while they are in flight.
pub async fn handle_client_message<B, K>(
    playground: &mut Playground<B, K>,
    msg: ClientMessage,
    tx: &ServerSender,
) where
    B: ExecutionBackend + 'static,
    K: KeyValueStore + 'static,
{
    match msg {
        ClientMessage::Ping => {
            let _ = tx.send(ServerMessage::Pong);
        }
        ClientMessage::UpdateSource { source } => playground.set_source(source),
        ClientMessage::Run { source } => {
            if let Some(source) = source {
                playground.set_source(source);
            }
            spawn_run(
                Arc::clone(playground.session()),
                playground.source().to_string(),
                tx.clone(),
            );
        }
        ClientMessage::Reset => {
            let cleared = playground.reset();
            send_source(playground, cleared, tx);
        }
        ClientMessage::Clear => {
            let cleared = playground.clear();
            send_source(playground, cleared, tx);
        }
        ClientMessage::Save => {
            let _ = tx.send(playground.export().into());
        }
        ClientMessage::Initialize => {
            let session = Arc::clone(playground.session());
            let tx = tx.clone();
            tokio::spawn(async move {
                let result = session.start().await;
                report(&tx, result);
            });
        }
        ClientMessage::SetLibraries { libraries } => {
            let session = Arc::clone(playground.session());
            let tx = tx.clone();
            tokio::spawn(async move {
                let result = session.set_library_selection(libraries).await;
                report(&tx, result);
            });
        }
        ClientMessage::SetViewMode { mode } => {
            if !playground.session().set_view_mode(mode) {
                let _ = tx.send(ServerMessage::error(
                    "There are no plots from the last run to show",
                ));
            }
        }
        ClientMessage::SetTheme { theme } => match playground.set_theme(theme).await {
            Ok(()) => {
                let _ = tx.send(ServerMessage::Theme { theme });
            }
            Err(e) => {
                let _ = tx.send(ServerMessage::error(e.to_string()));
            }
        },
        ClientMessage::Snapshot => {
            let _ = tx.send(ServerMessage::Snapshot {
                snapshot: playground.session().snapshot(),
            });
        }
    }
}
