use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::connection::{Connection, ConnectionId, ConnectionState};
use super::envelope::{DocumentId, Envelope, EnvelopeKind, Frame};
use super::error::RelayError;
use super::session::Session;

/// Point-in-time counts for diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryStats {
    pub sessions: usize,
    pub connections: usize,
}

/// All live sessions, keyed by document.
///
/// Lock order is always registry first, then session. Holding the registry
/// lock while a member is added or while emptiness is checked is what keeps
/// a join from landing in a session that is being removed.
#[derive(Default)]
pub struct Registry {
    sessions: RwLock<HashMap<DocumentId, Arc<Session>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, document_id: DocumentId) -> Option<Arc<Session>> {
        self.sessions.read().await.get(&document_id).cloned()
    }

    pub async fn get_or_create(&self, document_id: DocumentId) -> Arc<Session> {
        if let Some(session) = self.get(document_id).await {
            return session;
        }
        let mut sessions = self.sessions.write().await;
        Self::session_entry(&mut sessions, document_id)
    }

    /// Existing or new session for `document_id`. Callers hold the write lock.
    fn session_entry(sessions: &mut HashMap<DocumentId, Arc<Session>>, document_id: DocumentId) -> Arc<Session> {
        sessions
            .entry(document_id)
            .or_insert_with(|| {
                debug!(document_id, "Creating session");
                Arc::new(Session::new(document_id))
            })
            .clone()
    }

    /// Drop the session for `document_id` if nobody is left in it.
    pub async fn remove_if_empty(&self, document_id: DocumentId) -> bool {
        let mut sessions = self.sessions.write().await;
        let empty = match sessions.get(&document_id) {
            Some(session) => session.is_empty().await,
            None => return false,
        };
        if empty {
            sessions.remove(&document_id);
            debug!(document_id, "Removed empty session");
        }
        empty
    }

    /// Add `conn` to the session for its document, creating the session if
    /// needed, and move it to `Joined`.
    pub async fn join(&self, conn: &Arc<Connection>) -> Arc<Session> {
        let document_id = conn.document_id();
        let mut sessions = self.sessions.write().await;
        let session = Self::session_entry(&mut sessions, document_id);
        session.add(conn.clone()).await;
        conn.mark_joined();
        session
    }

    /// Join, announce the newcomer to the rest of the room, then confirm the
    /// join to the newcomer itself.
    pub async fn enter(&self, conn: &Arc<Connection>) -> Result<Arc<Session>, RelayError> {
        let session = self.join(conn).await;
        let frame = Envelope::presence(EnvelopeKind::Join, conn.identity(), conn.document_id()).encode()?;
        self.fan_out(&session, Some(conn.id()), frame.clone()).await;
        if let Err(e) = session.send_to(conn.id(), frame).await {
            warn!(conn_id = %conn.id(), "Failed to confirm join: {}", e);
        }
        info!(
            document_id = conn.document_id(),
            user_id = conn.identity().user_id,
            username = %conn.identity().username,
            "User joined document"
        );
        Ok(session)
    }

    /// Broadcast to everyone but `sender` and deal with the fallout: each
    /// evicted member is announced to the remaining ones with a `leave`, and a
    /// session emptied by evictions is dropped.
    pub async fn fan_out(&self, session: &Arc<Session>, sender: Option<ConnectionId>, frame: Frame) -> usize {
        let report = session.broadcast(sender, &frame).await;
        let delivered = report.delivered;

        let mut evicted = report.evicted;
        while let Some(gone) = evicted.pop() {
            let leave = match Envelope::presence(EnvelopeKind::Leave, gone.identity(), gone.document_id()).encode() {
                Ok(frame) => frame,
                Err(e) => {
                    warn!(conn_id = %gone.id(), "Failed to encode eviction notice: {}", e);
                    continue;
                }
            };
            evicted.extend(session.broadcast(Some(gone.id()), &leave).await.evicted);
        }

        if session.is_empty().await {
            self.remove_if_empty(session.document_id()).await;
        }
        delivered
    }

    /// Tear `conn` down: take it out of its session, tell the others it left
    /// (unless an eviction already did), and drop the session if it is now
    /// empty. Returns whether the connection was still a member.
    pub async fn leave(&self, session: &Arc<Session>, conn: &Arc<Connection>) -> bool {
        let was_member = session.remove(conn.id()).await.is_some();
        let previous = conn.close();

        if was_member && previous == ConnectionState::Joined {
            match Envelope::presence(EnvelopeKind::Leave, conn.identity(), conn.document_id()).encode() {
                Ok(frame) => {
                    self.fan_out(session, Some(conn.id()), frame).await;
                }
                Err(e) => warn!(conn_id = %conn.id(), "Failed to encode leave notice: {}", e),
            }
        }
        self.remove_if_empty(conn.document_id()).await;

        info!(
            document_id = conn.document_id(),
            user_id = conn.identity().user_id,
            username = %conn.identity().username,
            evicted = previous == ConnectionState::Evicted,
            "User left document"
        );
        was_member
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn stats(&self) -> RegistryStats {
        let sessions = self.sessions.read().await;
        let mut stats = RegistryStats { sessions: sessions.len(), connections: 0 };
        for session in sessions.values() {
            stats.connections += session.len().await;
        }
        stats
    }
}
