use std::collections::HashMap;
use std::time::Duration;
use axum::{
    extract::{Path, Query, State, ws::{WebSocket, WebSocketUpgrade}},
    http::{header, HeaderMap},
    response::Response,
};
use futures_util::StreamExt;
use tracing::{debug, error, info, warn};

use crate::AppState;
use crate::auth::Identity;
use crate::services::auth_service::get_auth_token;
use crate::websocket::error::HandshakeError;
use crate::ws::{pump, Connection, DocumentId};

/// How long the egress pump gets to flush and close the socket after the
/// ingress side has gone away.
const EGRESS_FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

/// WebSocket handler for `/ws/:document_id?token=<jwt>`
pub async fn websocket_handler(
    Path(document_id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    State(state): State<AppState>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Result<Response, HandshakeError> {
    debug!("New WebSocket connection attempt");

    let (document_id, identity) = match authorize(&state, &document_id, &params, &headers).await {
        Ok(authorized) => authorized,
        Err(e) => {
            if e.status().is_server_error() {
                error!("WebSocket handshake failed: {}", e);
            } else {
                warn!("WebSocket handshake refused: {}", e);
            }
            return Err(e);
        }
    };

    let max_frame_bytes = state.config.max_frame_bytes;
    Ok(ws
        .max_message_size(max_frame_bytes)
        .max_frame_size(max_frame_bytes)
        .on_upgrade(move |socket| handle_socket(socket, document_id, identity, state)))
}

/// Every check that has to pass before the upgrade: origin, document ID,
/// token, then document access.
async fn authorize(
    state: &AppState,
    raw_document_id: &str,
    params: &HashMap<String, String>,
    headers: &HeaderMap,
) -> Result<(DocumentId, Identity), HandshakeError> {
    // 1. Origin
    let origin = headers.get(header::ORIGIN).and_then(|v| v.to_str().ok());
    if origin != Some(state.config.frontend_origin.as_str()) {
        return Err(HandshakeError::OriginNotAllowed(origin.map(str::to_string)));
    }

    // 2. Document ID
    let document_id: DocumentId = raw_document_id
        .parse()
        .map_err(|_| HandshakeError::InvalidDocumentId(raw_document_id.to_string()))?;

    // 3. Token
    let token = get_auth_token(params.get("token").map(String::as_str), headers)?;
    let identity = state.identity.authenticate(&token)?;

    // 4. Document access
    state.access.check(document_id, &identity).await?;

    Ok((document_id, identity))
}

/// Handle an upgraded WebSocket connection for its whole life
async fn handle_socket(socket: WebSocket, document_id: DocumentId, identity: Identity, state: AppState) {
    let registry = state.registry.clone();
    let (conn, outbound) = Connection::open(identity, document_id, state.config.outbound_queue_capacity);

    // Join the session and announce ourselves
    let session = match registry.enter(&conn).await {
        Ok(session) => session,
        Err(e) => {
            error!(conn_id = %conn.id(), document_id, "Failed to join session: {}", e);
            if let Some(session) = registry.get(document_id).await {
                registry.leave(&session, &conn).await;
            }
            return;
        }
    };
    info!(conn_id = %conn.id(), document_id, "WebSocket connection established");

    // Split the socket: only the egress pump writes, only the ingress pump reads
    let (sink, stream) = socket.split();
    let mut egress_task = tokio::spawn(pump::egress(sink, outbound));
    let mut ingress_task = tokio::spawn(pump::ingress(stream, conn.clone(), session.clone(), registry.clone()));

    // Wait for either side to finish
    let egress_finished = tokio::select! {
        end = &mut ingress_task => {
            debug!(conn_id = %conn.id(), ?end, "Ingress pump finished");
            false
        }
        res = &mut egress_task => {
            match res {
                Ok(Ok(written)) => debug!(conn_id = %conn.id(), written, "Egress pump finished"),
                Ok(Err(e)) => warn!(conn_id = %conn.id(), "Egress pump failed: {}", e),
                Err(e) => warn!(conn_id = %conn.id(), "Egress task panicked: {}", e),
            }
            ingress_task.abort();
            true
        }
    };

    // Leave the session; this also closes the outbound queue
    registry.leave(&session, &conn).await;

    if !egress_finished && tokio::time::timeout(EGRESS_FLUSH_TIMEOUT, &mut egress_task).await.is_err() {
        warn!(conn_id = %conn.id(), "Egress pump did not finish in time");
        egress_task.abort();
    }
    info!(conn_id = %conn.id(), document_id, "WebSocket connection terminated");
}
