use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::Bytes,
    extract::{
        ws::{Message, WebSocket},
        Path, Query, State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::connection_manager::{ConnectionId, DocumentId, OutboundFrame};
use crate::server::AppState;

use super::message::{next_within, FrameSource, Inbound};
use super::session::{run_document_session, run_notification_session, subscription_reply};

/// How long to wait for the writer to flush after a session ends
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Deserialize)]
pub struct SubscribeQuery {
    pub connection_id: Option<u64>,
}

/// Document channel: `/ws/{document_id}`
#[tracing::instrument(name = "ws.upgrade.document", skip(ws, state))]
pub async fn document_ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(document_id): Path<DocumentId>,
) -> Response {
    ws.on_upgrade(move |socket| handle_document_socket(socket, state, document_id))
}

/// Notification channel: `/ws/notifications/{document_id}`
#[tracing::instrument(name = "ws.upgrade.notifications", skip(ws, state))]
pub async fn notification_ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(document_id): Path<DocumentId>,
) -> Response {
    ws.on_upgrade(move |socket| handle_notification_socket(socket, state, document_id))
}

/// One-shot subscribe: `/ws/notifications/subscribe/{document_id}?connection_id=N`
#[tracing::instrument(name = "ws.upgrade.subscribe", skip(ws, state, query))]
pub async fn subscribe_ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(document_id): Path<DocumentId>,
    Query(query): Query<SubscribeQuery>,
) -> Response {
    let connection_id = query.connection_id.map(ConnectionId::new);
    ws.on_upgrade(move |socket| handle_subscribe_socket(socket, state, document_id, connection_id))
}

async fn handle_document_socket(socket: WebSocket, state: AppState, document_id: DocumentId) {
    let hub = state.hub.clone();
    let (tx, rx) = hub.channel();
    let session = hub.join_document(document_id, tx);

    let (ws_sender, ws_receiver) = socket.split();
    let writer = tokio::spawn(write_frames(ws_sender, rx));
    let source = WsFrameSource::new(ws_receiver, hub.config().idle_timeout());

    run_document_session(session, source).await;
    drain_writer(writer).await;
}

async fn handle_notification_socket(socket: WebSocket, state: AppState, document_id: DocumentId) {
    let hub = state.hub.clone();
    let (tx, rx) = hub.channel();
    let session = hub.open_notifications(document_id, tx);

    let (ws_sender, ws_receiver) = socket.split();
    let writer = tokio::spawn(write_frames(ws_sender, rx));
    let source = WsFrameSource::new(ws_receiver, hub.config().idle_timeout());

    run_notification_session(session, source).await;
    drain_writer(writer).await;
}

async fn handle_subscribe_socket(
    mut socket: WebSocket,
    state: AppState,
    document_id: DocumentId,
    connection_id: Option<ConnectionId>,
) {
    let reply = subscription_reply(&state.hub, connection_id, document_id);

    match serde_json::to_string(&reply) {
        Ok(json) => {
            if let Err(e) = socket.send(Message::Text(json.into())).await {
                tracing::debug!(error = %e, "Failed to send subscription reply");
            }
        }
        Err(e) => tracing::error!(error = %e, "Failed to serialize subscription reply"),
    }

    let _ = socket.send(Message::Close(None)).await;
}

/// Drain a connection's outbound queue into the socket.
///
/// Ends when every sender is gone, a `Close` frame is dequeued, or the
/// socket rejects a write.
async fn write_frames(mut ws_sender: SplitSink<WebSocket, Message>, mut rx: mpsc::Receiver<OutboundFrame>) {
    while let Some(frame) = rx.recv().await {
        let message = match frame {
            OutboundFrame::Text(text) => Message::Text(text),
            OutboundFrame::Ping => Message::Ping(Bytes::new()),
            OutboundFrame::Close => {
                let _ = ws_sender.send(Message::Close(None)).await;
                break;
            }
        };

        if ws_sender.send(message).await.is_err() {
            break;
        }
    }

    let _ = ws_sender.close().await;
}

async fn drain_writer(writer: JoinHandle<()>) {
    match tokio::time::timeout(WRITER_DRAIN_TIMEOUT, writer).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::warn!(error = %e, "Writer task failed"),
        Err(_) => tracing::debug!("Writer task did not finish in time"),
    }
}

/// Reads frames from an axum WebSocket.
///
/// Ping/Pong frames count as activity for the idle timeout but are not
/// surfaced; binary frames are ignored.
pub struct WsFrameSource {
    receiver: SplitStream<WebSocket>,
    idle_timeout: Option<Duration>,
}

impl WsFrameSource {
    pub fn new(receiver: SplitStream<WebSocket>, idle_timeout: Option<Duration>) -> Self {
        Self {
            receiver,
            idle_timeout,
        }
    }
}

#[async_trait]
impl FrameSource for WsFrameSource {
    async fn recv(&mut self) -> Inbound {
        loop {
            let Some(next) = next_within(self.idle_timeout, self.receiver.next()).await else {
                return Inbound::TransportError("idle timeout".to_string());
            };

            match next {
                None | Some(Ok(Message::Close(_))) => return Inbound::PeerClosed,
                Some(Err(e)) => return Inbound::TransportError(e.to_string()),
                Some(Ok(Message::Text(text))) => return Inbound::Message(text.to_string()),
                Some(Ok(Message::Binary(_))) => {
                    tracing::debug!("Ignoring binary frame");
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
            }
        }
    }
}
