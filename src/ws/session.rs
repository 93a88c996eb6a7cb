use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::connection::{Connection, ConnectionId, EnqueueError};
use super::envelope::{DocumentId, Frame};

/// Outcome of one fan-out pass over a session.
#[derive(Debug, Default)]
pub struct Broadcast {
    pub delivered: usize,
    pub evicted: Vec<Arc<Connection>>,
}

/// Everyone currently connected to one document.
///
/// The member map is only ever touched under `members`, and nothing done
/// while holding it can block: every delivery is a `try_send`.
pub struct Session {
    document_id: DocumentId,
    members: Mutex<HashMap<ConnectionId, Arc<Connection>>>,
}

impl Session {
    pub fn new(document_id: DocumentId) -> Self {
        Self {
            document_id,
            members: Mutex::new(HashMap::new()),
        }
    }

    pub fn document_id(&self) -> DocumentId {
        self.document_id
    }

    pub(crate) async fn add(&self, conn: Arc<Connection>) {
        self.members.lock().await.insert(conn.id(), conn);
    }

    pub(crate) async fn remove(&self, id: ConnectionId) -> Option<Arc<Connection>> {
        self.members.lock().await.remove(&id)
    }

    pub async fn len(&self) -> usize {
        self.members.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.members.lock().await.is_empty()
    }

    pub async fn contains(&self, id: ConnectionId) -> bool {
        self.members.lock().await.contains_key(&id)
    }

    /// Queue `frame` for every member except `sender`.
    ///
    /// A member whose queue is full is dropped from the session and its queue
    /// closed; the pass carries on with everyone else.
    pub async fn broadcast(&self, sender: Option<ConnectionId>, frame: &Frame) -> Broadcast {
        let mut members = self.members.lock().await;
        let mut result = Broadcast::default();
        let mut dropped = Vec::new();

        for (id, member) in members.iter() {
            if Some(*id) == sender {
                continue;
            }
            match member.enqueue(frame.clone()) {
                Ok(()) => result.delivered += 1,
                Err(EnqueueError::Full) => dropped.push(*id),
                Err(EnqueueError::Closed) => {
                    debug!(document_id = self.document_id, conn_id = %id, "Dropping member with closed queue");
                    dropped.push(*id);
                }
            }
        }

        for id in dropped {
            if let Some(member) = members.remove(&id) {
                if member.evict() {
                    warn!(
                        document_id = self.document_id,
                        conn_id = %id,
                        user_id = member.identity().user_id,
                        "Evicting slow consumer"
                    );
                    result.evicted.push(member);
                }
            }
        }

        result
    }

    /// Queue `frame` for a single member, with the same eviction rule as
    /// [`Session::broadcast`].
    pub async fn send_to(&self, target: ConnectionId, frame: Frame) -> Result<(), EnqueueError> {
        let mut members = self.members.lock().await;
        let member = members.get(&target).ok_or(EnqueueError::Closed)?;
        let result = member.enqueue(frame);
        if result.is_err() {
            if let Some(member) = members.remove(&target) {
                member.evict();
            }
        }
        result
    }
}
