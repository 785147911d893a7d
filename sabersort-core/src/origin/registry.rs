//! Lookup table from [`Origin`] to its resolver.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::info;

use super::{
    FetchClient, HttpConfig, OriginResolver, PixivConfig, PixivResolver, TwitterConfig,
    TwitterResolver,
};
use crate::candidate::Origin;
use crate::error::{Result, SaberError};

/// Resolvers keyed by the origin they serve.
#[derive(Default, Clone)]
pub struct OriginRegistry {
    resolvers: HashMap<Origin, Arc<dyn OriginResolver>>,
}

impl OriginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the Pixiv and Twitter resolvers over one shared HTTP client.
    pub fn from_config(
        http: HttpConfig,
        pixiv: PixivConfig,
        twitter: TwitterConfig,
    ) -> Result<Self> {
        let client = Arc::new(FetchClient::new(http)?);

        let mut registry = Self::new();
        registry.register(Arc::new(PixivResolver::new(client.clone(), pixiv)));
        registry.register(Arc::new(TwitterResolver::new(client, twitter)));
        info!(origins = ?registry.origins(), "Origin resolvers ready");
        Ok(registry)
    }

    /// Register a resolver under its own origin, replacing any previous one.
    pub fn register(&mut self, resolver: Arc<dyn OriginResolver>) {
        self.resolvers.insert(resolver.origin(), resolver);
    }

    pub fn get(&self, origin: Origin) -> Result<&Arc<dyn OriginResolver>> {
        self.resolvers
            .get(&origin)
            .ok_or(SaberError::UnsupportedOrigin(origin))
    }

    pub fn supports(&self, origin: Origin) -> bool {
        self.resolvers.contains_key(&origin)
    }

    /// Registered origins, sorted by name.
    pub fn origins(&self) -> Vec<Origin> {
        let mut origins: Vec<_> = self.resolvers.keys().copied().collect();
        origins.sort_by_key(|o| o.as_str());
        origins
    }
}
