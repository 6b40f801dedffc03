use std::time::Duration;

use crate::config::AppConfig;
use crate::database::read_cache::ReadCache;
use crate::database::store::DocumentStore;

/// Composition root: owns the store, the injectable read cache and the
/// configuration. The HTTP layer holds one `CtxState` and builds a `Ctx`
/// per request.
pub struct CtxState<S: DocumentStore> {
    pub store: S,
    pub cache: ReadCache,
    pub config: AppConfig,
}

impl<S: DocumentStore> CtxState<S> {
    pub fn new(store: S, config: AppConfig) -> Self {
        let cache = ReadCache::new(
            Duration::from_secs(config.cache_ttl_secs),
            config.cache_capacity,
        );
        Self {
            store,
            cache,
            config,
        }
    }

    /// Session teardown (logout): cached reads must not leak into the
    /// next session.
    pub fn end_session(&self) {
        self.cache.clear_all();
    }
}
