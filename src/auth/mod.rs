pub mod access;
pub mod identity;

pub use access::{AccessError, AccessFuture, DocumentAccess, OpenAccess, UnavailableAccess};
pub use identity::{AuthError, Claims, Identity, IdentityProvider, JwtIdentityProvider};
