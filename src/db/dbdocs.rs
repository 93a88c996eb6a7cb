use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Error as SqlxError, Row};
use std::time::Duration;
use tracing::{debug, info};

use crate::auth::{AccessError, AccessFuture, DocumentAccess, Identity};
use crate::ws::{DocumentId, UserId};

/// Owner and share lookup for one document. Assumes the account service's
/// schema:
///
/// ```sql
/// documents       (id BIGINT PRIMARY KEY, owner_id BIGINT NOT NULL, ...)
/// document_shares (document_id BIGINT REFERENCES documents(id), user_id BIGINT NOT NULL)
/// ```
///
/// A row in `document_shares` grants its user access to the document.
const ACCESS_SQL: &str = r#"
    SELECT
        d.owner_id::BIGINT AS owner_id,
        EXISTS (
            SELECT 1 FROM document_shares s
            WHERE s.document_id = d.id AND s.user_id = $2
        ) AS shared
    FROM documents d
    WHERE d.id = $1
"#;

/// Document ownership and sharing, read from the account service's Postgres
/// database.
pub struct DbDocs {
    pool: PgPool,
}

impl DbDocs {
    /// Create a new database connection pool
    ///
    /// # Arguments
    /// * `database_url` - PostgreSQL connection string
    pub async fn new(database_url: &str) -> Result<Self, SqlxError> {
        info!("Connecting to database...");

        let pool = PgPoolOptions::new()
            .max_connections(10)
            .min_connections(1)
            .acquire_timeout(Duration::from_secs(5))
            .idle_timeout(Duration::from_secs(600))
            .max_lifetime(Duration::from_secs(1800))
            .connect(database_url)
            .await?;

        info!("Database connection pool created successfully");

        Ok(Self { pool })
    }

    /// Owner of a document and whether it is shared with `user_id`, or
    /// `None` if the document doesn't exist.
    pub async fn document_access(&self, document_id: DocumentId, user_id: UserId) -> Result<Option<(UserId, bool)>, SqlxError> {
        let row = sqlx::query(ACCESS_SQL)
            .bind(document_id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some((row.try_get("owner_id")?, row.try_get("shared")?))),
            None => Ok(None),
        }
    }
}

impl DocumentAccess for DbDocs {
    fn check<'a>(&'a self, document_id: DocumentId, identity: &'a Identity) -> AccessFuture<'a> {
        Box::pin(async move {
            let (owner_id, shared) = self
                .document_access(document_id, identity.user_id)
                .await?
                .ok_or(AccessError::NotFound(document_id))?;

            if owner_id == identity.user_id || shared {
                debug!(document_id, user_id = identity.user_id, shared, "Document access granted");
                Ok(())
            } else {
                Err(AccessError::Forbidden {
                    document_id,
                    user_id: identity.user_id,
                })
            }
        })
    }
}
