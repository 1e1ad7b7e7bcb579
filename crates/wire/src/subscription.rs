//! Subscription declarations binding topics to agent types.

use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Runtime-unique identifier for a registered subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A declaration binding a topic (exact or prefix) to an agent type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Subscription {
    /// Exact topic-type match.
    TypeSubscription {
        topic_type: String,
        agent_type: String,
    },
    /// Any topic whose type begins with `topic_type_prefix`.
    TypePrefixSubscription {
        topic_type_prefix: String,
        agent_type: String,
    },
}

impl Subscription {
    pub fn agent_type(&self) -> &str {
        match self {
            Self::TypeSubscription { agent_type, .. } => agent_type,
            Self::TypePrefixSubscription { agent_type, .. } => agent_type,
        }
    }

    /// Whether this subscription matches an event whose topic type is `topic_type`.
    pub fn matches(&self, topic_type: &str) -> bool {
        match self {
            Self::TypeSubscription {
                topic_type: exact, ..
            } => exact == topic_type,
            Self::TypePrefixSubscription {
                topic_type_prefix, ..
            } => topic_type.starts_with(topic_type_prefix.as_str()),
        }
    }
}
