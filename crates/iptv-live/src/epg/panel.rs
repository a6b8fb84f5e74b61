//! Now/next lookup against the panel's `player_api.php`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Url;
use serde::Serialize;
use serde_json::Value;
use std::time::{Duration, Instant};
use tracing::debug;

use iptv_proto::protocol::{ChannelId, Credentials};

use crate::error::{LiveError, LiveResult};

use super::time::parse_epg_time;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EpgProgram {
    pub title: Option<String>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

/// Now/next for one channel plus when it was fetched.
#[derive(Debug, Clone, Serialize)]
pub struct EpgRecord {
    pub now: Option<EpgProgram>,
    pub next: Option<EpgProgram>,
    pub fetched_at: DateTime<Utc>,
    #[serde(skip)]
    pub fetched: Instant,
}

impl EpgRecord {
    pub fn new(now: Option<EpgProgram>, next: Option<EpgProgram>) -> Self {
        Self {
            now,
            next,
            fetched_at: Utc::now(),
            fetched: Instant::now(),
        }
    }

    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.fetched)
    }
}

/// Where now/next data comes from.  The cache only sees this trait.
#[async_trait]
pub trait EpgSource: Send + Sync {
    async fn fetch_now_next(
        &self,
        credentials: &Credentials,
        channel: ChannelId,
    ) -> LiveResult<EpgRecord>;
}

pub fn epg_url(credentials: &Credentials, channel: ChannelId) -> LiveResult<Url> {
    let endpoint = format!("{}/player_api.php", credentials.base_url);
    Url::parse_with_params(
        &endpoint,
        &[
            ("username", credentials.username.as_str()),
            ("password", credentials.password.as_str()),
            ("action", "get_simple_data_table"),
            ("stream_id", channel.to_string().as_str()),
        ],
    )
    .map_err(|e| LiveError::InvalidUrl(format!("{}: {}", endpoint, e)))
}

pub struct PanelEpgSource {
    client: reqwest::Client,
}

impl PanelEpgSource {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl EpgSource for PanelEpgSource {
    async fn fetch_now_next(
        &self,
        credentials: &Credentials,
        channel: ChannelId,
    ) -> LiveResult<EpgRecord> {
        if !credentials.is_complete() {
            return Err(LiveError::MissingCredentials);
        }
        let url = epg_url(credentials, channel)?;
        debug!("EPG: fetching channel {}", channel);

        let response = self
            .client
            .get(url)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|source| LiveError::EpgHttp { channel, source })?;

        if !response.status().is_success() {
            return Err(LiveError::EpgStatus {
                channel,
                status: response.status().as_u16(),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|source| LiveError::EpgHttp { channel, source })?;
        let payload: Value = serde_json::from_str(&body).map_err(|e| LiveError::EpgDecode {
            channel,
            reason: e.to_string(),
        })?;

        let (now, next) = parse_now_next(&payload);
        Ok(EpgRecord::new(now, next))
    }
}

/// First two events of the payload.  Accepts a bare array or an object with
/// `epg_listings`; any other shape yields no programs.
pub fn parse_now_next(payload: &Value) -> (Option<EpgProgram>, Option<EpgProgram>) {
    let events = payload
        .as_array()
        .or_else(|| payload.get("epg_listings").and_then(Value::as_array));
    match events {
        Some(events) => (
            events.first().map(program_from_event),
            events.get(1).map(program_from_event),
        ),
        None => (None, None),
    }
}

fn program_from_event(event: &Value) -> EpgProgram {
    EpgProgram {
        title: first_present(event, &["title", "name"]).and_then(value_to_string),
        start: first_present(event, &["start", "start_timestamp", "start_time"])
            .and_then(parse_epg_time),
        end: first_present(event, &["end", "stop_timestamp", "end_time"]).and_then(parse_epg_time),
    }
}

/// First key whose value is set: not null, not an empty string, not zero.
fn first_present<'a>(event: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().filter_map(|k| event.get(*k)).find(|v| match v {
        Value::Null | Value::Bool(false) => false,
        Value::String(s) => !s.is_empty(),
        Value::Number(n) => n.as_f64() != Some(0.0),
        _ => true,
    })
}

fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_epg_url_encodes_credentials() {
        let creds = Credentials::new("panel.tv:8080/", "a b", "p&w");
        let url = epg_url(&creds, 55).unwrap();
        assert_eq!(
            url.as_str(),
            "http://panel.tv:8080/player_api.php?username=a+b&password=p%26w&action=get_simple_data_table&stream_id=55"
        );
    }

    #[test]
    fn test_parse_bare_array() {
        let payload = json!([
            {"title": "Morning", "start": "1700000000", "end": 1700003600},
            {"name": "Noon", "start_timestamp": "1700003600", "stop_timestamp": "1700007200"},
            {"title": "ignored"}
        ]);
        let (now, next) = parse_now_next(&payload);
        let now = now.unwrap();
        let next = next.unwrap();
        assert_eq!(now.title.as_deref(), Some("Morning"));
        assert_eq!(now.end.unwrap().timestamp(), 1_700_003_600);
        assert_eq!(next.title.as_deref(), Some("Noon"));
        assert_eq!(next.start.unwrap().timestamp(), 1_700_003_600);
    }

    #[test]
    fn test_parse_listings_object_with_fallback_keys() {
        let payload = json!({"epg_listings": [
            {"title": "", "name": "Fallback", "start": "", "start_time": "2024-03-01 20:00:00", "end_time": "garbage"}
        ]});
        let (now, next) = parse_now_next(&payload);
        let now = now.unwrap();
        assert_eq!(now.title.as_deref(), Some("Fallback"));
        assert!(now.start.is_some());
        assert!(now.end.is_none());
        assert!(next.is_none());
    }

    #[test]
    fn test_parse_unknown_shape_is_empty() {
        assert_eq!(parse_now_next(&json!({"user_info": {}})), (None, None));
        assert_eq!(parse_now_next(&json!([])), (None, None));
    }
}
