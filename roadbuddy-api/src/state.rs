use roadbuddy_booking::Engine;
use roadbuddy_core::identity::IdentityResolver;
use roadbuddy_store::{BroadcastEventSink, RedisClient};
use std::sync::Arc;

use crate::metrics::Metrics;
use crate::middleware::auth::JwtIdentityResolver;

#[derive(Clone)]
pub struct AuthConfig {
    pub secret: String,
    pub expiration: u64,
}

#[derive(Clone, Copy)]
pub struct RateLimit {
    pub requests: i64,
    pub window_seconds: i64,
}

#[derive(Clone)]
pub struct AppState {
    pub engine: Engine,
    pub identity: Arc<dyn IdentityResolver>,
    pub auth: AuthConfig,
    /// Rate limiting is off without Redis.
    pub redis: Option<Arc<RedisClient>>,
    pub rate_limit: RateLimit,
    pub live: Arc<BroadcastEventSink>,
    pub metrics: Arc<Metrics>,
}

impl AppState {
    pub fn new(
        engine: Engine,
        auth: AuthConfig,
        live: Arc<BroadcastEventSink>,
        redis: Option<Arc<RedisClient>>,
        rate_limit: RateLimit,
    ) -> Result<Self, prometheus::Error> {
        Ok(Self {
            engine,
            identity: Arc::new(JwtIdentityResolver::new(&auth.secret)),
            auth,
            redis,
            rate_limit,
            live,
            metrics: Arc::new(Metrics::new()?),
        })
    }
}
