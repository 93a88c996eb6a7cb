pub mod connection;
pub mod envelope;
pub mod error;
pub mod pump;
pub mod registry;
pub mod session;

pub use connection::{Connection, ConnectionId, ConnectionState, EnqueueError};
pub use envelope::{DocumentId, Envelope, EnvelopeKind, Frame, UserId};
pub use error::RelayError;
pub use registry::{Registry, RegistryStats};
pub use session::{Broadcast, Session};
