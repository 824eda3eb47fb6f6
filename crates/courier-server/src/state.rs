//! Shared server state.

use crate::config::Config;
use courier_auth::TokenVerifier;
use courier_core::{FanoutPipeline, PresenceRegistry};
use courier_store::{MessageStore, UserStore};
use std::sync::Arc;
use std::time::Duration;

/// State shared by the realtime gate and every HTTP route.
pub struct AppState {
    /// Server configuration.
    pub config: Config,
    /// Credential verifier, shared by HTTP and the handshake.
    pub verifier: TokenVerifier,
    /// User record store.
    pub users: Arc<dyn UserStore>,
    /// Message history store.
    pub messages: Arc<dyn MessageStore>,
    /// Live-connection registry, constructed at startup and torn down at
    /// shutdown.
    pub presence: Arc<PresenceRegistry>,
    /// The fan-out pipeline.
    pub pipeline: FanoutPipeline,
}

impl AppState {
    /// Wire up the state over the given stores.
    #[must_use]
    pub fn new(
        config: Config,
        users: Arc<dyn UserStore>,
        messages: Arc<dyn MessageStore>,
    ) -> Self {
        let verifier = TokenVerifier::new(
            config.auth.secret.as_bytes(),
            Duration::from_secs(config.auth.token_ttl_secs),
        );
        let presence = Arc::new(PresenceRegistry::new());
        let pipeline = FanoutPipeline::new(users.clone(), messages.clone(), presence.clone());

        Self {
            config,
            verifier,
            users,
            messages,
            presence,
            pipeline,
        }
    }
}
