use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};
use uuid::Uuid;

use crate::auth::Identity;
use super::envelope::{DocumentId, Frame};

pub type ConnectionId = Uuid;

/// Where a connection is in its single-use life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Joined,
    Left,
    Evicted,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EnqueueError {
    #[error("outbound queue is full")]
    Full,
    #[error("outbound queue is closed")]
    Closed,
}

struct Inner {
    state: ConnectionState,
    // Only sender of the outbound channel. Dropping it is what tells the
    // egress pump to stop.
    outbound: Option<mpsc::Sender<Frame>>,
}

/// One live socket scoped to a (document, user) pair.
pub struct Connection {
    id: ConnectionId,
    identity: Identity,
    document_id: DocumentId,
    capacity: usize,
    inner: Mutex<Inner>,
}

impl Connection {
    /// Build a connection in the `Connecting` state together with the
    /// receiving end of its outbound queue, which belongs to the egress pump.
    pub fn open(
        identity: Identity,
        document_id: DocumentId,
        capacity: usize,
    ) -> (Arc<Self>, mpsc::Receiver<Frame>) {
        let (tx, rx) = mpsc::channel(capacity);
        let conn = Self {
            id: Uuid::new_v4(),
            identity,
            document_id,
            capacity,
            inner: Mutex::new(Inner {
                state: ConnectionState::Connecting,
                outbound: Some(tx),
            }),
        };
        (Arc::new(conn), rx)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn document_id(&self) -> DocumentId {
        self.document_id
    }

    pub fn state(&self) -> ConnectionState {
        self.lock().state
    }

    /// Frames queued but not yet picked up by the egress pump.
    pub fn pending(&self) -> usize {
        match &self.lock().outbound {
            Some(tx) => self.capacity - tx.capacity(),
            None => 0,
        }
    }

    /// Non-blocking enqueue. Never waits for the egress pump.
    pub fn enqueue(&self, frame: Frame) -> Result<(), EnqueueError> {
        let inner = self.lock();
        let tx = inner.outbound.as_ref().ok_or(EnqueueError::Closed)?;
        tx.try_send(frame).map_err(|e| match e {
            TrySendError::Full(_) => EnqueueError::Full,
            TrySendError::Closed(_) => EnqueueError::Closed,
        })
    }

    pub(crate) fn mark_joined(&self) -> bool {
        let mut inner = self.lock();
        if inner.state != ConnectionState::Connecting {
            return false;
        }
        inner.state = ConnectionState::Joined;
        true
    }

    /// Slow-consumer eviction. Closes the outbound queue and returns whether
    /// this call performed the transition.
    pub(crate) fn evict(&self) -> bool {
        let mut inner = self.lock();
        if inner.state != ConnectionState::Joined {
            return false;
        }
        inner.state = ConnectionState::Evicted;
        inner.outbound = None;
        true
    }

    /// Graceful teardown. Returns the state the connection was in, so the
    /// caller can tell a departure from an earlier eviction.
    pub(crate) fn close(&self) -> ConnectionState {
        let mut inner = self.lock();
        let previous = inner.state;
        if matches!(previous, ConnectionState::Connecting | ConnectionState::Joined) {
            inner.state = ConnectionState::Left;
        }
        inner.outbound = None;
        previous
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("user_id", &self.identity.user_id)
            .field("document_id", &self.document_id)
            .field("state", &self.state())
            .finish()
    }
}
