use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::debug;

use super::Provider;

/// Display-safe status of one provider's stored key.
///
/// `masked_key` is only ever set when `has_key` is true; the constructors and
/// deserialization both enforce this.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Default)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub struct KeyStatus {
    has_key: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    masked_key: Option<String>,
}

impl KeyStatus {
    pub fn missing() -> Self {
        Self::default()
    }

    pub fn present(masked_key: Option<String>) -> Self {
        Self {
            has_key: true,
            masked_key: masked_key.filter(|m| !m.is_empty()),
        }
    }

    pub fn has_key(&self) -> bool {
        self.has_key
    }

    pub fn masked_key(&self) -> Option<&str> {
        self.masked_key.as_deref()
    }

    /// Short label for status listings
    pub fn display(&self) -> String {
        match (self.has_key, self.masked_key.as_deref()) {
            (true, Some(masked)) => format!("configured ({})", masked),
            (true, None) => "configured".to_string(),
            (false, _) => "not configured".to_string(),
        }
    }
}

impl<'de> Deserialize<'de> for KeyStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        struct Wire {
            #[serde(default)]
            has_key: bool,
            #[serde(default)]
            masked_key: Option<String>,
        }

        let wire = Wire::deserialize(deserializer)?;
        Ok(if wire.has_key {
            KeyStatus::present(wire.masked_key)
        } else {
            KeyStatus::missing()
        })
    }
}

pub type KeyStatusMap = BTreeMap<Provider, KeyStatus>;

/// Account record returned by every login path and by the profile endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "UserWire")]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oauth_provider: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_login: Option<DateTime<Utc>>,
    #[serde(rename = "api_keys_status")]
    pub api_key_status: KeyStatusMap,
}

impl User {
    /// Status for a provider, treating an absent entry as "no key"
    pub fn key_status(&self, provider: Provider) -> KeyStatus {
        self.api_key_status
            .get(&provider)
            .cloned()
            .unwrap_or_default()
    }

    pub fn initial(&self) -> char {
        self.name
            .chars()
            .next()
            .map(|c| c.to_ascii_uppercase())
            .unwrap_or('?')
    }
}

// Backend variants disagree on the key status shape: newer ones send an
// `api_keys_status` map keyed by `<provider>_api_key`, older ones only a
// `has_gemini_api_key` flag. Both collapse into the provider map.
#[derive(Deserialize)]
struct UserWire {
    id: String,
    name: String,
    email: String,
    #[serde(default)]
    picture: Option<String>,
    #[serde(default)]
    oauth_provider: Option<String>,
    #[serde(deserialize_with = "deserialize_timestamp")]
    created_at: DateTime<Utc>,
    #[serde(default, deserialize_with = "deserialize_optional_timestamp")]
    last_login: Option<DateTime<Utc>>,
    #[serde(default, alias = "api_key_status")]
    api_keys_status: Option<BTreeMap<String, KeyStatus>>,
    #[serde(default)]
    has_gemini_api_key: Option<bool>,
}

impl From<UserWire> for User {
    fn from(wire: UserWire) -> Self {
        let api_key_status = match (wire.api_keys_status, wire.has_gemini_api_key) {
            (Some(map), _) => map
                .into_iter()
                .filter_map(|(name, status)| match name.parse::<Provider>() {
                    Ok(provider) => Some((provider, status)),
                    Err(_) => {
                        debug!(provider = %name, "Ignoring status for unknown provider");
                        None
                    }
                })
                .collect(),
            (None, Some(has_gemini)) => {
                let status = if has_gemini {
                    KeyStatus::present(None)
                } else {
                    KeyStatus::missing()
                };
                BTreeMap::from([(Provider::Gemini, status)])
            }
            (None, None) => BTreeMap::new(),
        };

        User {
            id: wire.id,
            name: wire.name,
            email: wire.email,
            picture: wire.picture.filter(|p| !p.is_empty()),
            oauth_provider: wire.oauth_provider.filter(|p| !p.is_empty()),
            created_at: wire.created_at,
            last_login: wire.last_login,
            api_key_status,
        }
    }
}

/// Parse RFC 3339 timestamps, falling back to naive ISO timestamps (which the
/// backend emits for UTC values) interpreted as UTC.
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

fn deserialize_timestamp<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {}", raw)))
}

fn deserialize_optional_timestamp<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<DateTime<Utc>>, D::Error> {
    match Option::<String>::deserialize(deserializer)? {
        Some(raw) => parse_timestamp(&raw)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {}", raw))),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_profile_with_status_map() {
        let json = r#"{
            "id": "9f1c",
            "name": "Anna",
            "email": "anna@test.de",
            "created_at": "2024-03-01T10:15:00.123456",
            "last_login": null,
            "api_keys_status": {
                "gemini_api_key": {"has_key": true, "masked_key": "****abcd"},
                "openai_api_key": {"has_key": false, "masked_key": "****leak"},
                "mistral_api_key": {"has_key": true}
            }
        }"#;

        let user: User = serde_json::from_str(json).expect("profile should parse");
        assert_eq!(user.key_status(Provider::Gemini).masked_key(), Some("****abcd"));

        // No masked value may survive on a provider without a key
        let openai = user.key_status(Provider::OpenAi);
        assert!(!openai.has_key());
        assert_eq!(openai.masked_key(), None);

        // Unknown providers are dropped, absent ones read as missing
        assert_eq!(user.api_key_status.len(), 2);
        assert!(!user.key_status(Provider::Anthropic).has_key());
        assert_eq!(user.created_at.to_rfc3339(), "2024-03-01T10:15:00.123456+00:00");
    }

    #[test]
    fn test_parse_legacy_gemini_flag() {
        let json = r#"{
            "id": "1", "name": "Otto", "email": "otto@test.de",
            "created_at": "2024-03-01T10:15:00Z",
            "oauth_provider": "google",
            "has_gemini_api_key": true
        }"#;

        let user: User = serde_json::from_str(json).unwrap();
        assert_eq!(user.api_key_status.len(), 1);
        assert!(user.key_status(Provider::Gemini).has_key());
        assert_eq!(user.oauth_provider.as_deref(), Some("google"));
    }

    #[test]
    fn test_user_survives_persistence_round_trip() {
        let json = r#"{
            "id": "1", "name": "Otto", "email": "otto@test.de",
            "created_at": "2024-03-01T10:15:00Z",
            "api_keys_status": {"anthropic_api_key": {"has_key": true, "masked_key": "****wxyz"}}
        }"#;
        let user: User = serde_json::from_str(json).unwrap();

        let stored = serde_json::to_string(&user).unwrap();
        let restored: User = serde_json::from_str(&stored).unwrap();
        assert_eq!(restored, user);
    }

    #[test]
    fn test_key_status_display() {
        assert_eq!(KeyStatus::missing().display(), "not configured");
        assert_eq!(KeyStatus::present(None).display(), "configured");
        assert_eq!(
            KeyStatus::present(Some("****1234".to_string())).display(),
            "configured (****1234)"
        );
        assert_eq!(KeyStatus::present(Some(String::new())).masked_key(), None);
    }

    #[test]
    fn test_rejects_malformed_timestamp() {
        let json = r#"{"id": "1", "name": "x", "email": "x@y.z", "created_at": "yesterday"}"#;
        assert!(serde_json::from_str::<User>(json).is_err());
    }
}
