//! WebSocket transport for browser playgrounds.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::IntoResponse,
    routing::get,
};
use futures::{SinkExt, StreamExt};
use pytecode_core::traits::{ExecutionBackend, KeyValueStore};
use pytecode_session::{ExecutionSession, Playground, SessionSnapshot};
use tokio::sync::mpsc;
use tower_http::trace::TraceLayer;

use crate::{
    dispatch,
    protocol::{ClientMessage, ServerMessage},
};

/// WebSocket handler state.
pub struct WsState<B, K>
where
    B: ExecutionBackend,
    K: KeyValueStore,
{
    /// Session shared by every connection.
    pub session: Arc<ExecutionSession<B, K>>,
}

impl<B, K> Clone for WsState<B, K>
where
    B: ExecutionBackend,
    K: KeyValueStore,
{
    fn clone(&self) -> Self {
        Self {
            session: Arc::clone(&self.session),
        }
    }
}

impl<B, K> WsState<B, K>
where
    B: ExecutionBackend,
    K: KeyValueStore,
{
    /// Create new WebSocket state.
    #[must_use]
    pub const fn new(session: Arc<ExecutionSession<B, K>>) -> Self {
        Self { session }
    }
}

/// WebSocket upgrade handler.
///
/// Each connection gets its own editor over the shared session.
pub async fn ws_handler<B, K>(
    ws: WebSocketUpgrade,
    State(state): State<WsState<B, K>>,
) -> impl IntoResponse
where
    B: ExecutionBackend + 'static,
    K: KeyValueStore + 'static,
{
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// Current session state as JSON.
pub async fn snapshot_handler<B, K>(State(state): State<WsState<B, K>>) -> Json<SessionSnapshot>
where
    B: ExecutionBackend + 'static,
    K: KeyValueStore + 'static,
{
    Json(state.session.snapshot())
}

async fn handle_socket<B, K>(socket: WebSocket, state: WsState<B, K>)
where
    B: ExecutionBackend + 'static,
    K: KeyValueStore + 'static,
{
    let (mut sender, mut receiver) = socket.split();

    // Channel for sending messages to the client
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();

    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let json = match serde_json::to_string(&msg) {
                Ok(j) => j,
                Err(e) => {
                    tracing::error!("Failed to serialize message: {e}");
                    continue;
                }
            };
            if sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    let mut playground = Playground::new(Arc::clone(&state.session));
    let forwarders = dispatch::spawn_forwarders(&state.session, &tx);
    dispatch::send_greeting(&playground, &tx).await;
    tracing::info!("Playground client connected");

    while let Some(msg) = receiver.next().await {
        let msg = match msg {
            Ok(Message::Text(text)) => text,
            Ok(Message::Binary(data)) => match String::from_utf8(data.to_vec()) {
                Ok(s) => s.into(),
                Err(_) => continue,
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                tracing::error!("WebSocket error: {e}");
                break;
            }
        };

        let client_msg: ClientMessage = match serde_json::from_str(&msg) {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!("Invalid client message: {e}");
                let _ = tx.send(ServerMessage::error(format!("Invalid message: {e}")));
                continue;
            }
        };

        dispatch::handle_client_message(&mut playground, client_msg, &tx).await;
    }

    for task in forwarders {
        task.abort();
    }
    send_task.abort();
    tracing::info!("Playground client disconnected");
}

/// Create the playground router: `/ws` for the socket and
/// `/api/snapshot` for a one-off state read.
///
/// # Example
/// ```ignore
/// let app = Router::new()
///     .merge(create_router(Arc::new(session)));
/// ```
#[must_use]
pub fn create_router<B, K>(session: Arc<ExecutionSession<B, K>>) -> Router
where
    B: ExecutionBackend + 'static,
    K: KeyValueStore + 'static,
{
    Router::new()
        .route("/ws", get(ws_handler::<B, K>))
        .route("/api/snapshot", get(snapshot_handler::<B, K>))
        .layer(TraceLayer::new_for_http())
        .with_state(WsState::new(session))
}

#[cfg(test)]
mod tests {
    use axum::{
        body::{Body, to_bytes},
        http::{Request, StatusCode},
    };
    use pytecode_core::{BackendState, LibrarySet};
    use pytecode_session::{storage::MemoryStore, testing::ScriptedBackend};
    use tower::ServiceExt;

    use super::*;

    async fn get_snapshot(app: Router) -> SessionSnapshot {
        let request = Request::builder()
            .uri("/api/snapshot")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_snapshot_route() {
        let session = Arc::new(ExecutionSession::new(
            ScriptedBackend::new(),
            MemoryStore::new(),
        ));
        let snapshot = get_snapshot(create_router(Arc::clone(&session))).await;
        assert_eq!(snapshot.backend_state, BackendState::Uninitialized);

        session.initialize(LibrarySet::new()).await.unwrap();
        session.run("print('hi')").await.unwrap();

        let snapshot = get_snapshot(create_router(session)).await;
        assert_eq!(snapshot.backend_state, BackendState::Ready);
        assert_eq!(snapshot.text_output, vec!["hi".to_string()]);
        assert!(!snapshot.graphics_available());
    }

    #[tokio::test]
    async fn test_unknown_route() {
        let session = Arc::new(ExecutionSession::new(
            ScriptedBackend::new(),
            MemoryStore::new(),
        ));
        let request = Request::builder().uri("/nope").body(Body::empty()).unwrap();
        let response = create_router(session).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
