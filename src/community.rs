//! Parsing of community references as operators type them: `@name`, bare
//! names, `t.me` links, private invite links and numeric ids.
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

static LINK_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:https?://)?(?:www\.)?(?:t\.me|telegram\.me)/(?P<rest>[^?#]+)")
        .expect("static regex")
});
static USERNAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_]{3,31}$").expect("static regex"));
static INVITE_HASH_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]{8,}$").expect("static regex"));

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommunityRefError {
    #[error("empty community reference")]
    Empty,
    #[error("unrecognized community reference: {0}")]
    Unrecognized(String),
}

/// A resolved-by-name pointer to a group or channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum CommunityRef {
    Username(String),
    InviteLink(String),
    Id(i64),
}

impl CommunityRef {
    pub fn parse(raw: &str) -> Result<Self, CommunityRefError> {
        let s = raw.trim();
        if s.is_empty() {
            return Err(CommunityRefError::Empty);
        }
        if let Ok(id) = s.parse::<i64>() {
            return Ok(CommunityRef::Id(id));
        }
        if let Some(caps) = LINK_RE.captures(s) {
            let rest = caps["rest"].trim_end_matches('/');
            if let Some(hash) = rest
                .strip_prefix('+')
                .or_else(|| rest.strip_prefix("joinchat/"))
            {
                if INVITE_HASH_RE.is_match(hash) {
                    return Ok(CommunityRef::InviteLink(hash.to_string()));
                }
                return Err(CommunityRefError::Unrecognized(raw.to_string()));
            }
            // t.me/name/123 points at a message; the community is the first segment
            let name = rest.split('/').next().unwrap_or_default();
            return Self::username(name, raw);
        }
        Self::username(s.trim_start_matches('@'), raw)
    }

    fn username(name: &str, raw: &str) -> Result<Self, CommunityRefError> {
        if USERNAME_RE.is_match(name) {
            Ok(CommunityRef::Username(name.to_ascii_lowercase()))
        } else {
            Err(CommunityRefError::Unrecognized(raw.to_string()))
        }
    }

    /// Stable key used to scope ledger entries.
    pub fn key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for CommunityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommunityRef::Username(name) => write!(f, "@{}", name),
            CommunityRef::InviteLink(hash) => write!(f, "https://t.me/+{}", hash),
            CommunityRef::Id(id) => write!(f, "{}", id),
        }
    }
}

impl FromStr for CommunityRef {
    type Err = CommunityRefError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for CommunityRef {
    type Error = CommunityRefError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<CommunityRef> for String {
    fn from(value: CommunityRef) -> Self {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usernames_normalize() {
        let expected = CommunityRef::Username("rust_lang".into());
        for raw in [
            "@rust_lang",
            "rust_lang",
            "Rust_Lang",
            "https://t.me/rust_lang",
            "t.me/rust_lang/",
            "http://telegram.me/rust_lang",
            "https://t.me/rust_lang/4521",
        ] {
            assert_eq!(CommunityRef::parse(raw).unwrap(), expected, "{raw}");
        }
        assert_eq!(expected.key(), "@rust_lang");
    }

    #[test]
    fn invite_links_and_ids() {
        assert_eq!(
            CommunityRef::parse("https://t.me/+AbCdEf123456").unwrap(),
            CommunityRef::InviteLink("AbCdEf123456".into())
        );
        assert_eq!(
            CommunityRef::parse("t.me/joinchat/AbCdEf123456").unwrap(),
            CommunityRef::InviteLink("AbCdEf123456".into())
        );
        assert_eq!(
            CommunityRef::parse("-1001234567890").unwrap(),
            CommunityRef::Id(-1001234567890)
        );
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(CommunityRef::parse("  "), Err(CommunityRefError::Empty));
        assert!(matches!(
            CommunityRef::parse("a b c"),
            Err(CommunityRefError::Unrecognized(_))
        ));
        assert!(CommunityRef::parse("https://t.me/+x").is_err());
    }

    #[test]
    fn serde_uses_canonical_string() {
        let r: CommunityRef = serde_yaml::from_str("\"https://t.me/rust_lang\"").unwrap();
        assert_eq!(serde_json::to_string(&r).unwrap(), "\"@rust_lang\"");
    }
}
