//! Subscription interest tracking.
//!
//! The set is the source of truth for which topics must be active on the
//! server. It survives disconnection and is replayed on every connect.
//! Interest is tracked per consumer: a topic stays active until the last
//! interested consumer leaves. Calls without an explicit consumer use
//! `ConsumerId::ANONYMOUS`, which gives plain set semantics.

use parking_lot::RwLock;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use tracing::debug;
use uuid::Uuid;

/// Identity of a consumer holding topic interest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConsumerId(Uuid);

impl ConsumerId {
    /// Shared identity used by `subscribe`/`unsubscribe` without a consumer.
    pub const ANONYMOUS: ConsumerId = ConsumerId(Uuid::nil());

    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConsumerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConsumerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Topic interest, keyed by topic in sorted order.
#[derive(Debug, Default)]
pub struct SubscriptionSet {
    topics: RwLock<BTreeMap<String, HashSet<ConsumerId>>>,
}

impl SubscriptionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register interest. Returns `true` if the topic just became active.
    pub fn add(&self, consumer: ConsumerId, topic: &str) -> bool {
        let mut topics = self.topics.write();
        match topics.get_mut(topic) {
            Some(consumers) => {
                consumers.insert(consumer);
                false
            }
            None => {
                topics.insert(topic.to_string(), HashSet::from([consumer]));
                debug!(topic, "Topic activated");
                true
            }
        }
    }

    /// Drop interest. Returns `true` if the topic just became inactive.
    pub fn remove(&self, consumer: ConsumerId, topic: &str) -> bool {
        let mut topics = self.topics.write();
        let Some(consumers) = topics.get_mut(topic) else {
            return false;
        };

        if !consumers.remove(&consumer) || !consumers.is_empty() {
            return false;
        }

        topics.remove(topic);
        debug!(topic, "Topic deactivated");
        true
    }

    /// Drop every interest held by `consumer`.
    ///
    /// Returns the topics that became inactive.
    pub fn remove_consumer(&self, consumer: ConsumerId) -> Vec<String> {
        let mut topics = self.topics.write();
        let mut deactivated = Vec::new();

        topics.retain(|topic, consumers| {
            consumers.remove(&consumer);
            if consumers.is_empty() {
                deactivated.push(topic.clone());
                false
            } else {
                true
            }
        });

        deactivated
    }

    pub fn contains(&self, topic: &str) -> bool {
        self.topics.read().contains_key(topic)
    }

    /// Number of consumers interested in `topic`.
    pub fn interest_count(&self, topic: &str) -> usize {
        self.topics.read().get(topic).map_or(0, HashSet::len)
    }

    /// Active topics in sorted order.
    pub fn topics(&self) -> Vec<String> {
        self.topics.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.topics.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.topics.read().is_empty()
    }
}
