//! Worker-local subscription mirror (§4.5): which locally-registered agent
//! types this worker declared subscriptions for, used to route an inbound
//! `Event` to the right activations without a gateway round-trip.

use agentmesh_wire::Subscription;
use dashmap::DashSet;
use parking_lot::RwLock;

/// Local mirror of the subscriptions this worker has declared to the
/// gateway. Structurally the same exact/prefix split as the gateway's
/// `SubscriptionIndex` (§4.3); kept as a separate, simpler type here because
/// the worker only ever needs "which of my own agent types match this
/// topic", never a global view across workers.
#[derive(Default)]
pub struct LocalSubscriptions {
    exact: DashSet<(String, String)>,
    prefixes: RwLock<Vec<(String, String)>>,
}

impl LocalSubscriptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, subscription: &Subscription) {
        match subscription {
            Subscription::TypeSubscription {
                topic_type,
                agent_type,
            } => {
                self.exact.insert((topic_type.clone(), agent_type.clone()));
            }
            Subscription::TypePrefixSubscription {
                topic_type_prefix,
                agent_type,
            } => {
                let mut prefixes = self.prefixes.write();
                let entry = (topic_type_prefix.clone(), agent_type.clone());
                if !prefixes.contains(&entry) {
                    prefixes.push(entry);
                }
            }
        }
    }

    /// Deduplicated agent types that subscribed (locally) to `topic_type`.
    pub fn matches(&self, topic_type: &str) -> Vec<String> {
        let mut matched = Vec::new();
        for entry in self.exact.iter() {
            if entry.0 == topic_type && !matched.contains(&entry.1) {
                matched.push(entry.1.clone());
            }
        }
        for (prefix, agent_type) in self.prefixes.read().iter() {
            if topic_type.starts_with(prefix.as_str()) && !matched.contains(agent_type) {
                matched.push(agent_type.clone());
            }
        }
        matched
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_and_prefix_both_match() {
        let subs = LocalSubscriptions::new();
        subs.add(&Subscription::TypeSubscription {
            topic_type: "news".to_string(),
            agent_type: "listener".to_string(),
        });
        subs.add(&Subscription::TypePrefixSubscription {
            topic_type_prefix: "alerts.".to_string(),
            agent_type: "siren".to_string(),
        });

        assert_eq!(subs.matches("news"), vec!["listener".to_string()]);
        assert_eq!(subs.matches("alerts.fire"), vec!["siren".to_string()]);
        assert!(subs.matches("weather").is_empty());
    }

    #[test]
    fn dedups_repeated_agent_type() {
        let subs = LocalSubscriptions::new();
        subs.add(&Subscription::TypeSubscription {
            topic_type: "news".to_string(),
            agent_type: "listener".to_string(),
        });
        subs.add(&Subscription::TypeSubscription {
            topic_type: "news".to_string(),
            agent_type: "listener".to_string(),
        });
        assert_eq!(subs.matches("news"), vec!["listener".to_string()]);
    }
}
