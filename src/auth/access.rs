use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

use crate::auth::Identity;
use crate::ws::{DocumentId, UserId};

pub type AccessFuture<'a> = Pin<Box<dyn Future<Output = Result<(), AccessError>> + Send + 'a>>;

#[derive(Debug, Error)]
pub enum AccessError {
    #[error("document {0} not found")]
    NotFound(DocumentId),

    #[error("user {user_id} may not access document {document_id}")]
    Forbidden {
        document_id: DocumentId,
        user_id: UserId,
    },

    #[error("document access check failed: {0}")]
    Backend(#[from] sqlx::Error),

    #[error("document access unavailable: {0}")]
    Unavailable(String),
}

/// Decides whether an authenticated user may join a document's session.
pub trait DocumentAccess: Send + Sync {
    fn check<'a>(&'a self, document_id: DocumentId, identity: &'a Identity) -> AccessFuture<'a>;

    /// Whether checks can succeed at all. Readiness reports on this.
    fn is_available(&self) -> bool {
        true
    }
}

/// Lets any authenticated user into any document. Used when no database is
/// configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenAccess;

impl DocumentAccess for OpenAccess {
    fn check<'a>(&'a self, _document_id: DocumentId, _identity: &'a Identity) -> AccessFuture<'a> {
        Box::pin(async { Ok(()) })
    }
}

/// Stands in when a database was configured but could not be reached. Every
/// check fails, so no one joins a document whose ownership can't be verified.
#[derive(Debug, Clone)]
pub struct UnavailableAccess {
    reason: String,
}

impl UnavailableAccess {
    pub fn new(reason: impl Into<String>) -> Self {
        Self { reason: reason.into() }
    }
}

impl DocumentAccess for UnavailableAccess {
    fn check<'a>(&'a self, _document_id: DocumentId, _identity: &'a Identity) -> AccessFuture<'a> {
        Box::pin(async move { Err(AccessError::Unavailable(self.reason.clone())) })
    }

    fn is_available(&self) -> bool {
        false
    }
}
