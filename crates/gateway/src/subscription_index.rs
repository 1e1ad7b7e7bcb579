//! `SubscriptionIndex` (§4.3): topic-type → agent-type fan-out lookup.

use std::sync::Arc;

use agentmesh_wire::Subscription;
use dashmap::{DashMap, DashSet};
use parking_lot::RwLock;

/// Exact-match map plus an ordered prefix list, matching the two
/// `Subscription` variants the wire layer defines.
///
/// Exact lookups are O(1) via `DashMap`; prefix lookups scan the (typically
/// short) prefix list, matching longest-prefix-wins is not part of the
/// contract here: every registered prefix that matches delivers.
#[derive(Debug, Default)]
pub struct SubscriptionIndex {
    exact: DashMap<String, DashSet<String>>,
    prefixes: RwLock<Vec<(String, DashSet<String>)>>,
}

impl SubscriptionIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, subscription: &Subscription) {
        match subscription {
            Subscription::TypeSubscription {
                topic_type,
                agent_type,
            } => {
                self.exact
                    .entry(topic_type.clone())
                    .or_default()
                    .insert(agent_type.clone());
            }
            Subscription::TypePrefixSubscription {
                topic_type_prefix,
                agent_type,
            } => {
                let mut prefixes = self.prefixes.write();
                if let Some((_, set)) = prefixes.iter().find(|(p, _)| p == topic_type_prefix) {
                    set.insert(agent_type.clone());
                } else {
                    let set = DashSet::new();
                    set.insert(agent_type.clone());
                    prefixes.push((topic_type_prefix.clone(), set));
                }
            }
        }
    }

    pub fn remove(&self, subscription: &Subscription) {
        match subscription {
            Subscription::TypeSubscription {
                topic_type,
                agent_type,
            } => {
                if let Some(set) = self.exact.get(topic_type) {
                    set.remove(agent_type);
                }
            }
            Subscription::TypePrefixSubscription {
                topic_type_prefix,
                agent_type,
            } => {
                let prefixes = self.prefixes.read();
                if let Some((_, set)) = prefixes.iter().find(|(p, _)| p == topic_type_prefix) {
                    set.remove(agent_type);
                }
            }
        }
    }

    /// Deduplicated set of agent types subscribed to `topic_type`, across
    /// both exact and prefix subscriptions.
    pub fn matches(&self, topic_type: &str) -> Vec<String> {
        let mut matched: Vec<String> = Vec::new();

        if let Some(set) = self.exact.get(topic_type) {
            for agent_type in set.iter() {
                matched.push(agent_type.clone());
            }
        }

        for (prefix, set) in self.prefixes.read().iter() {
            if topic_type.starts_with(prefix.as_str()) {
                for agent_type in set.iter() {
                    if !matched.contains(&*agent_type) {
                        matched.push(agent_type.clone());
                    }
                }
            }
        }

        matched
    }

    pub fn is_empty(&self) -> bool {
        self.exact.iter().all(|e| e.value().is_empty())
            && self
                .prefixes
                .read()
                .iter()
                .all(|(_, set)| set.is_empty())
    }
}

pub type SharedSubscriptionIndex = Arc<SubscriptionIndex>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_match_delivers() {
        let index = SubscriptionIndex::new();
        index.add(&Subscription::TypeSubscription {
            topic_type: "order.created".to_string(),
            agent_type: "billing".to_string(),
        });

        assert_eq!(index.matches("order.created"), vec!["billing".to_string()]);
        assert!(index.matches("order.cancelled").is_empty());
    }

    #[test]
    fn prefix_match_delivers() {
        let index = SubscriptionIndex::new();
        index.add(&Subscription::TypePrefixSubscription {
            topic_type_prefix: "order.".to_string(),
            agent_type: "audit".to_string(),
        });

        assert_eq!(index.matches("order.created"), vec!["audit".to_string()]);
        assert_eq!(index.matches("order.cancelled"), vec!["audit".to_string()]);
        assert!(index.matches("invoice.created").is_empty());
    }

    #[test]
    fn dedups_across_exact_and_prefix() {
        let index = SubscriptionIndex::new();
        index.add(&Subscription::TypeSubscription {
            topic_type: "order.created".to_string(),
            agent_type: "billing".to_string(),
        });
        index.add(&Subscription::TypePrefixSubscription {
            topic_type_prefix: "order.".to_string(),
            agent_type: "billing".to_string(),
        });

        assert_eq!(index.matches("order.created"), vec!["billing".to_string()]);
    }

    #[test]
    fn remove_unsubscribes() {
        let index = SubscriptionIndex::new();
        let sub = Subscription::TypeSubscription {
            topic_type: "order.created".to_string(),
            agent_type: "billing".to_string(),
        };
        index.add(&sub);
        index.remove(&sub);
        assert!(index.matches("order.created").is_empty());
        assert!(index.is_empty());
    }
}
