use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

const MAX_REVISION_LEN: usize = 64;
const RESERVED: [&str; 3] = ["head", "heads", "base"];

/// Identifier of a migration descriptor.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RevisionId(String);

impl RevisionId {
    pub fn parse(s: impl Into<String>) -> Result<Self> {
        let s = s.into();
        if s.is_empty() {
            return Err(Error::InvalidRevisionId("revision id cannot be empty".into()));
        }
        if s.len() > MAX_REVISION_LEN {
            return Err(Error::InvalidRevisionId(format!(
                "revision id longer than {MAX_REVISION_LEN} characters: {s}"
            )));
        }
        if let Some(c) = s
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.')))
        {
            return Err(Error::InvalidRevisionId(format!(
                "revision id {s:?} contains {c:?}"
            )));
        }
        if RESERVED.contains(&s.as_str()) {
            return Err(Error::InvalidRevisionId(format!("{s:?} is reserved")));
        }
        Ok(Self(s))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RevisionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for RevisionId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for RevisionId {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        Self::parse(s)
    }
}

impl From<RevisionId> for String {
    fn from(id: RevisionId) -> Self {
        id.0
    }
}

/// Render an optional marker, using `base` for the empty store.
pub fn marker_label(marker: Option<&RevisionId>) -> String {
    marker
        .map(|r| r.to_string())
        .unwrap_or_else(|| "base".to_string())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Upgrade,
    Downgrade,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Upgrade => "upgrade",
            Direction::Downgrade => "downgrade",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "upgrade" => Ok(Direction::Upgrade),
            "downgrade" => Ok(Direction::Downgrade),
            other => Err(Error::Other(format!("unknown direction: {other}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_numeric_and_hex_ids() {
        assert_eq!(RevisionId::parse("001").unwrap().as_str(), "001");
        assert!(RevisionId::parse("3f2a9c1d0b7e").is_ok());
        assert!(RevisionId::parse("v1.2_add-index").is_ok());
    }

    #[test]
    fn rejects_malformed_ids() {
        assert!(RevisionId::parse("").is_err());
        assert!(RevisionId::parse("has space").is_err());
        assert!(RevisionId::parse("drop;table").is_err());
        assert!(RevisionId::parse("a".repeat(65)).is_err());
    }

    #[test]
    fn rejects_reserved_words() {
        for word in ["head", "heads", "base"] {
            assert!(RevisionId::parse(word).is_err(), "{word} should be reserved");
        }
    }

    #[test]
    fn deserialization_validates() {
        let id: RevisionId = serde_json::from_str(r#""012""#).unwrap();
        assert_eq!(id.as_str(), "012");
        assert!(serde_json::from_str::<RevisionId>(r#""bad id""#).is_err());
    }

    #[test]
    fn marker_label_uses_base_for_empty_store() {
        assert_eq!(marker_label(None), "base");
        let id = RevisionId::parse("006").unwrap();
        assert_eq!(marker_label(Some(&id)), "006");
    }

    #[test]
    fn direction_serializes_snake_case() {
        let json = serde_json::to_string(&Direction::Downgrade).unwrap();
        assert_eq!(json, r#""downgrade""#);
        assert_eq!("upgrade".parse::<Direction>().unwrap(), Direction::Upgrade);
    }
}
