use std::sync::Arc;

use sqlx::PgPool;

use cache::operations::location::{IpLocator, LocationOperations};
use cache::operations::presence::PresenceOperations;
use cache::store::AppCache;
use config::Config;

pub mod cache;
pub mod config;
pub mod database;
pub mod middleware;
pub mod notify;
pub mod routes;
pub mod utils;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Config,
    pub cache: Arc<dyn AppCache>,
    pub presence: Arc<PresenceOperations>,
    pub location: Arc<LocationOperations>,
    pub locator: Arc<dyn IpLocator>,
}
