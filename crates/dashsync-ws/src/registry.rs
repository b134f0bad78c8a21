//! Explicit per-endpoint channel registry.
//!
//! Hands out one shared `ChannelManager` per URL so every consumer of an
//! endpoint multiplexes over a single connection.

use crate::channel::{ChannelConfig, ChannelManager};
use dashmap::DashMap;
use std::sync::Arc;
use tracing::info;

pub struct ChannelRegistry {
    channels: DashMap<String, Arc<ChannelManager>>,
    defaults: ChannelConfig,
}

impl ChannelRegistry {
    /// `defaults` supplies everything except the URL for new managers.
    pub fn new(defaults: ChannelConfig) -> Self {
        Self {
            channels: DashMap::new(),
            defaults,
        }
    }

    /// Return the manager for `url`, creating it on first use.
    pub fn get_or_create(&self, url: &str) -> Arc<ChannelManager> {
        self.channels
            .entry(url.to_string())
            .or_insert_with(|| {
                info!(url, "Creating push channel");
                Arc::new(ChannelManager::new(ChannelConfig {
                    url: url.to_string(),
                    ..self.defaults.clone()
                }))
            })
            .clone()
    }

    pub fn get(&self, url: &str) -> Option<Arc<ChannelManager>> {
        self.channels.get(url).map(|entry| entry.value().clone())
    }

    /// Remove and disconnect the manager for `url`.
    pub fn remove(&self, url: &str) -> Option<Arc<ChannelManager>> {
        let (_, manager) = self.channels.remove(url)?;
        manager.disconnect();
        Some(manager)
    }

    pub fn disconnect_all(&self) {
        for entry in self.channels.iter() {
            entry.value().disconnect();
        }
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

impl Default for ChannelRegistry {
    fn default() -> Self {
        Self::new(ChannelConfig::default())
    }
}
