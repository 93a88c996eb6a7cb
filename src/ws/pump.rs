use axum::extract::ws::Message;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use std::fmt::Display;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::connection::{Connection, ConnectionState};
use super::envelope::{Envelope, Frame};
use super::error::RelayError;
use super::registry::Registry;
use super::session::Session;

/// Why an ingress pump stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngressEnd {
    /// The peer closed the socket or the stream ended.
    Closed,
    /// Reading failed: transport error or protocol violation (including an
    /// oversized frame).
    ReadFailed,
    /// The connection was evicted while the pump was running.
    Evicted,
}

/// Read frames from the peer until the socket goes away, stamping each
/// well-formed envelope with the connection's identity and fanning it out to
/// the rest of the session.
pub async fn ingress<S, E>(
    mut stream: S,
    conn: Arc<Connection>,
    session: Arc<Session>,
    registry: Arc<Registry>,
) -> IngressEnd
where
    S: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    loop {
        let message = match stream.next().await {
            Some(Ok(message)) => message,
            Some(Err(e)) => {
                warn!(conn_id = %conn.id(), user_id = conn.identity().user_id, "WebSocket read error: {}", e);
                return IngressEnd::ReadFailed;
            }
            None => return IngressEnd::Closed,
        };

        if conn.state() == ConnectionState::Evicted {
            return IngressEnd::Evicted;
        }

        let raw = match &message {
            Message::Text(text) => text.as_bytes(),
            Message::Binary(bytes) => bytes.as_slice(),
            Message::Close(frame) => {
                debug!(conn_id = %conn.id(), ?frame, "Peer closed the connection");
                return IngressEnd::Closed;
            }
            Message::Ping(_) | Message::Pong(_) => continue,
        };

        let mut envelope = match Envelope::decode(raw) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(conn_id = %conn.id(), user_id = conn.identity().user_id, "Skipping frame: {}", e);
                continue;
            }
        };
        envelope.stamp(conn.identity(), conn.document_id());

        match envelope.encode() {
            Ok(frame) => {
                registry.fan_out(&session, Some(conn.id()), frame).await;
            }
            Err(e) => warn!(conn_id = %conn.id(), "Skipping frame: {}", e),
        }
    }
}

/// Write queued frames to the peer in order until the queue is closed, then
/// close the socket. A failed write also closes the socket.
pub async fn egress<K>(mut sink: K, mut outbound: mpsc::Receiver<Frame>) -> Result<usize, RelayError>
where
    K: Sink<Message> + Unpin,
    K::Error: Display,
{
    let mut written = 0;
    while let Some(frame) = outbound.recv().await {
        if let Err(e) = sink.send(Message::Text(frame.to_string())).await {
            let _ = sink.close().await;
            return Err(RelayError::Write(e.to_string()));
        }
        written += 1;
    }
    sink.close().await.map_err(|e| RelayError::Write(e.to_string()))?;
    Ok(written)
}
