use std::fmt;

use serde::Deserialize;

/// Which lookup endpoint a batch goes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LookupKind {
    Tweets,
    Users,
}

impl LookupKind {
    /// Path under the API base, without the query string.
    pub fn endpoint(self) -> &'static str {
        match self {
            LookupKind::Tweets => "statuses/lookup.json",
            LookupKind::Users => "users/lookup.json",
        }
    }

    /// Query parameter that carries the comma-joined identity list.
    pub fn id_param(self) -> &'static str {
        match self {
            LookupKind::Tweets => "id",
            LookupKind::Users => "user_id",
        }
    }

    /// Extra query parameters needed for complete records.
    pub fn extra_params(self) -> &'static [(&'static str, &'static str)] {
        match self {
            // Extended mode returns full_text, alt text and untruncated entities.
            LookupKind::Tweets => &[
                ("tweet_mode", "extended"),
                ("include_ext_alt_text", "true"),
                ("include_entities", "true"),
            ],
            LookupKind::Users => &[],
        }
    }
}

impl fmt::Display for LookupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LookupKind::Tweets => write!(f, "tweets"),
            LookupKind::Users => write!(f, "users"),
        }
    }
}

/// Response body of `guest/activate.json`.
#[derive(Debug, Clone, Deserialize)]
pub struct GuestTokenResponse {
    #[serde(default)]
    pub guest_token: Option<String>,
}

/// Identity of a looked-up object: `id_str` when present, else the numeric `id`.
pub fn identity_of(item: &serde_json::Value) -> Option<String> {
    if let Some(id) = item.get("id_str").and_then(|v| v.as_str()) {
        return Some(id.to_string());
    }
    match item.get("id")? {
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::String(s) => Some(s.clone()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn identity_prefers_id_str() {
        let item = json!({"id": 1, "id_str": "1234567890123456789"});
        assert_eq!(identity_of(&item).as_deref(), Some("1234567890123456789"));
    }

    #[test]
    fn identity_falls_back_to_numeric_id() {
        let item = json!({"id": 42});
        assert_eq!(identity_of(&item).as_deref(), Some("42"));
    }

    #[test]
    fn identity_missing_is_none() {
        assert_eq!(identity_of(&json!({"text": "hi"})), None);
        assert_eq!(identity_of(&json!([1, 2])), None);
    }

    #[test]
    fn tweets_request_extended_mode() {
        let params = LookupKind::Tweets.extra_params();
        assert!(params.contains(&("tweet_mode", "extended")));
        assert!(LookupKind::Users.extra_params().is_empty());
    }
}
