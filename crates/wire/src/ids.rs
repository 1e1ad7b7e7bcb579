//! Canonical identifiers for agents and topics.

use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

use crate::errors::FormatError;

fn is_valid_segment(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn split_canonical(s: &str) -> Result<(&str, &str), FormatError> {
    let mut parts = s.splitn(2, '/');
    let a = parts.next().unwrap_or_default();
    let b = parts.next().ok_or_else(|| FormatError::malformed(s))?;
    if b.contains('/') || !is_valid_segment(a) || !is_valid_segment(b) {
        return Err(FormatError::malformed(s));
    }
    Ok((a, b))
}

/// Identifies an agent instance as `(type, key)`.
///
/// Both fields must match `^[A-Za-z0-9_]+$`; canonical string form is
/// `type/key`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AgentId {
    agent_type: String,
    key: String,
}

impl AgentId {
    /// Construct an `AgentId`, validating both segments.
    pub fn new(agent_type: impl Into<String>, key: impl Into<String>) -> Result<Self, FormatError> {
        let agent_type = agent_type.into();
        let key = key.into();
        if !is_valid_segment(&agent_type) {
            return Err(FormatError::malformed(&agent_type));
        }
        if !is_valid_segment(&key) {
            return Err(FormatError::malformed(&key));
        }
        Ok(Self { agent_type, key })
    }

    pub fn agent_type(&self) -> &str {
        &self.agent_type
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Parses the canonical `type/key` form.
    pub fn from_canonical(s: &str) -> Result<Self, FormatError> {
        let (a, b) = split_canonical(s)?;
        Ok(Self {
            agent_type: a.to_string(),
            key: b.to_string(),
        })
    }

    pub fn to_canonical(&self) -> String {
        format!("{}/{}", self.agent_type, self.key)
    }
}

impl Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_canonical())
    }
}

/// Identifies a pub/sub channel as `(type, source)`, defaulting `source`
/// to `"default"` when unspecified.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TopicId {
    topic_type: String,
    source: String,
}

impl TopicId {
    pub const DEFAULT_SOURCE: &'static str = "default";

    pub fn new(topic_type: impl Into<String>, source: impl Into<String>) -> Result<Self, FormatError> {
        let topic_type = topic_type.into();
        let source = source.into();
        if !is_valid_segment(&topic_type) {
            return Err(FormatError::malformed(&topic_type));
        }
        if !is_valid_segment(&source) {
            return Err(FormatError::malformed(&source));
        }
        Ok(Self { topic_type, source })
    }

    /// Constructs a `TopicId` with the default source.
    pub fn with_default_source(topic_type: impl Into<String>) -> Result<Self, FormatError> {
        Self::new(topic_type, Self::DEFAULT_SOURCE)
    }

    pub fn topic_type(&self) -> &str {
        &self.topic_type
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn from_canonical(s: &str) -> Result<Self, FormatError> {
        let (a, b) = split_canonical(s)?;
        Ok(Self {
            topic_type: a.to_string(),
            source: b.to_string(),
        })
    }

    pub fn to_canonical(&self) -> String {
        format!("{}/{}", self.topic_type, self.source)
    }
}

impl Display for TopicId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_canonical())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agent_id_roundtrip() {
        let id = AgentId::new("echo", "alice").unwrap();
        assert_eq!(id.to_canonical(), "echo/alice");
        assert_eq!(AgentId::from_canonical("echo/alice").unwrap(), id);
    }

    #[test]
    fn agent_id_rejects_bad_chars() {
        assert!(AgentId::new("ec-ho", "alice").is_err());
        assert!(AgentId::from_canonical("echo/ali ce").is_err());
        assert!(AgentId::from_canonical("echo").is_err());
        assert!(AgentId::from_canonical("echo/alice/extra").is_err());
    }

    #[test]
    fn topic_id_default_source() {
        let id = TopicId::with_default_source("news").unwrap();
        assert_eq!(id.source(), "default");
        assert_eq!(id.to_canonical(), "news/default");
    }

    #[test]
    fn topic_id_roundtrip() {
        let id = TopicId::new("alerts", "fire").unwrap();
        assert_eq!(TopicId::from_canonical(&id.to_canonical()).unwrap(), id);
    }

    #[test]
    fn agent_id_equality_is_structural() {
        let a = AgentId::new("echo", "alice").unwrap();
        let b = AgentId::new("echo", "alice").unwrap();
        assert_eq!(a, b);
    }
}
