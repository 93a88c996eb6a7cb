use std::sync::Arc;

use crate::auth::{DocumentAccess, IdentityProvider};
use crate::config::Config;
use crate::ws::Registry;

/// Everything a request handler needs, built once in `main` and cloned into
/// each handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub registry: Arc<Registry>,
    pub identity: Arc<dyn IdentityProvider>,
    pub access: Arc<dyn DocumentAccess>,
}

impl AppState {
    pub fn new(config: Config, identity: Arc<dyn IdentityProvider>, access: Arc<dyn DocumentAccess>) -> Self {
        Self {
            config: Arc::new(config),
            registry: Arc::new(Registry::new()),
            identity,
            access,
        }
    }
}
