pub mod client;
pub mod config;
pub mod db;
pub mod error;
pub mod gateway;
pub mod matching;
pub mod proximity;
pub mod routes;

use std::sync::Arc;

use config::Config;
use db::store::MessageStore;
use gateway::hub::Hub;
use matching::engine::Matchmaker;

/// Shared application state available to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub hub: Arc<Hub>,
    pub matcher: Arc<Matchmaker>,
    pub store: Arc<dyn MessageStore>,
    pub config: Arc<Config>,
}

impl AppState {
    /// Build a hub and matchmaker over `config`, persisting through `store`.
    pub fn new(config: Config, store: Arc<dyn MessageStore>) -> Self {
        let config = Arc::new(config);
        let hub = Arc::new(Hub::new(config.clone()));
        Self {
            matcher: Arc::new(Matchmaker::new(hub.clone())),
            hub,
            store,
            config,
        }
    }
}
