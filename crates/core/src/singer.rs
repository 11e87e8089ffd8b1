//! Singer identities on a queue entry.
//!
//! A queue entry's singer list mixes named users with group tokens
//! (`AllSing`, `TheBoys`, `TheGirls`). Group tokens are open invitations:
//! they never block eligibility and are never looked up in presence data.
//! Lists are stored as a JSON array of strings; parsing never fails, a
//! malformed list degrades to an empty one.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

pub const GROUP_ALL_SING: &str = "AllSing";
pub const GROUP_THE_BOYS: &str = "TheBoys";
pub const GROUP_THE_GIRLS: &str = "TheGirls";

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Open-invitation group tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GroupToken {
    AllSing,
    TheBoys,
    TheGirls,
}

impl GroupToken {
    /// Parse a stored token, returning `None` for anything that is not a
    /// group token.
    pub fn from_token(s: &str) -> Option<Self> {
        match s {
            GROUP_ALL_SING => Some(Self::AllSing),
            GROUP_THE_BOYS => Some(Self::TheBoys),
            GROUP_THE_GIRLS => Some(Self::TheGirls),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::AllSing => GROUP_ALL_SING,
            Self::TheBoys => GROUP_THE_BOYS,
            Self::TheGirls => GROUP_THE_GIRLS,
        }
    }
}

/// One slot in a queue entry's singer list.
///
/// Serialized as the plain string stored in the database, so
/// `Singer::Group(GroupToken::AllSing)` round-trips as `"AllSing"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Singer {
    Named(String),
    Group(GroupToken),
}

impl Singer {
    /// The user name for a named singer, `None` for a group token.
    pub fn user_name(&self) -> Option<&str> {
        match self {
            Self::Named(name) => Some(name),
            Self::Group(_) => None,
        }
    }

    pub fn is_group(&self) -> bool {
        matches!(self, Self::Group(_))
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Named(name) => name,
            Self::Group(token) => token.as_str(),
        }
    }
}

impl From<String> for Singer {
    fn from(value: String) -> Self {
        let trimmed = value.trim();
        match GroupToken::from_token(trimmed) {
            Some(token) => Self::Group(token),
            None if trimmed.len() == value.len() => Self::Named(value),
            None => Self::Named(trimmed.to_string()),
        }
    }
}

impl From<Singer> for String {
    fn from(value: Singer) -> Self {
        match value {
            Singer::Named(name) => name,
            Singer::Group(token) => token.as_str().to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Parse a stored singer list (a JSON array of strings).
///
/// Anything other than an array of strings yields an empty list. Blank
/// names are dropped and duplicates keep their first position.
pub fn parse_singer_list(value: &serde_json::Value) -> Vec<Singer> {
    let Some(items) = value.as_array() else {
        return Vec::new();
    };

    let mut names = Vec::with_capacity(items.len());
    for item in items {
        match item.as_str() {
            Some(s) => names.push(s),
            None => return Vec::new(),
        }
    }

    let mut singers: Vec<Singer> = Vec::with_capacity(names.len());
    for name in names {
        if name.trim().is_empty() {
            continue;
        }
        let singer = Singer::from(name.to_string());
        if !singers.contains(&singer) {
            singers.push(singer);
        }
    }
    singers
}

/// Serialize a singer list back to its stored JSON form.
pub fn singers_to_json(singers: &[Singer]) -> serde_json::Value {
    serde_json::Value::Array(
        singers
            .iter()
            .map(|s| serde_json::Value::String(s.as_str().to_string()))
            .collect(),
    )
}

/// Ensure a requested singer list contains the requestor, unless the
/// request is an open group invitation.
pub fn normalize_singers(requestor: &str, singers: Vec<Singer>) -> Vec<Singer> {
    let has_group = singers.iter().any(Singer::is_group);
    let has_requestor = singers.iter().any(|s| s.user_name() == Some(requestor));
    if has_group || has_requestor {
        return singers;
    }
    let mut out = Vec::with_capacity(singers.len() + 1);
    out.push(Singer::Named(requestor.to_string()));
    out.extend(singers);
    out
}

/// Iterate the named (non-group) singers of a list, in list order.
pub fn named_singers(singers: &[Singer]) -> impl Iterator<Item = &str> {
    singers.iter().filter_map(Singer::user_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn group_tokens_are_recognised() {
        let singers = parse_singer_list(&json!(["alice", "AllSing", "TheBoys", "TheGirls"]));
        assert_eq!(
            singers,
            vec![
                Singer::Named("alice".into()),
                Singer::Group(GroupToken::AllSing),
                Singer::Group(GroupToken::TheBoys),
                Singer::Group(GroupToken::TheGirls),
            ]
        );
    }

    #[test]
    fn malformed_list_degrades_to_empty() {
        assert!(parse_singer_list(&json!({"alice": true})).is_empty());
        assert!(parse_singer_list(&json!(["alice", 7])).is_empty());
        assert!(parse_singer_list(&json!(null)).is_empty());
    }

    #[test]
    fn duplicates_and_blanks_are_dropped() {
        let singers = parse_singer_list(&json!(["bob", " ", "bob", "carol"]));
        assert_eq!(
            singers,
            vec![Singer::Named("bob".into()), Singer::Named("carol".into())]
        );
    }

    #[test]
    fn serde_uses_plain_strings() {
        let singers = vec![Singer::Named("dana".into()), Singer::Group(GroupToken::AllSing)];
        let encoded = serde_json::to_value(&singers).unwrap();
        assert_eq!(encoded, json!(["dana", "AllSing"]));
        assert_eq!(singers_to_json(&singers), encoded);
    }

    #[test]
    fn normalize_adds_missing_requestor() {
        let singers = normalize_singers("erin", vec![Singer::Named("frank".into())]);
        assert_eq!(singers[0], Singer::Named("erin".into()));
        assert_eq!(singers.len(), 2);
    }

    #[test]
    fn normalize_keeps_group_invitations_as_is() {
        let singers = normalize_singers("erin", vec![Singer::Group(GroupToken::TheGirls)]);
        assert_eq!(singers, vec![Singer::Group(GroupToken::TheGirls)]);
    }

    #[test]
    fn named_singers_skips_groups() {
        let singers = parse_singer_list(&json!(["AllSing", "gina", "TheBoys", "hal"]));
        assert_eq!(named_singers(&singers).collect::<Vec<_>>(), vec!["gina", "hal"]);
    }
}
