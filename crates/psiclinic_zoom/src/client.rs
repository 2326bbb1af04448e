//! Zoom REST client using server-to-server OAuth.
//!
//! Access tokens are cached until shortly before they expire, so a burst of
//! confirmations shares one token request.

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use psiclinic_common::services::{MeetingCreated, MeetingRequest};
use psiclinic_common::HTTP_CLIENT;
use psiclinic_config::ZoomConfig;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{error, info};

use crate::error::ZoomError;

/// Seconds shaved off `expires_in` before a cached token is considered stale.
const TOKEN_EXPIRY_MARGIN_SECS: i64 = 60;
/// Zoom type for a scheduled meeting.
const SCHEDULED_MEETING: u8 = 2;

#[derive(Deserialize, Debug)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
}

fn default_expires_in() -> i64 {
    3600
}

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    expires_at: DateTime<Utc>,
}

#[derive(Serialize, Debug)]
struct MeetingSettings {
    join_before_host: bool,
    waiting_room: bool,
}

#[derive(Serialize, Debug)]
struct CreateMeetingBody<'a> {
    topic: &'a str,
    #[serde(rename = "type")]
    kind: u8,
    start_time: String,
    timezone: &'a str,
    duration: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    agenda: Option<&'a str>,
    password: String,
    settings: MeetingSettings,
}

#[derive(Deserialize, Debug)]
struct MeetingResponse {
    id: Value,
    join_url: String,
    #[serde(default)]
    password: Option<String>,
}

pub struct ZoomClient {
    config: ZoomConfig,
    time_zone: Tz,
    client: Client,
    token: Mutex<Option<CachedToken>>,
}

impl ZoomClient {
    pub fn new(config: ZoomConfig) -> Result<Self, ZoomError> {
        Self::with_client(config, HTTP_CLIENT.clone())
    }

    pub fn with_client(config: ZoomConfig, client: Client) -> Result<Self, ZoomError> {
        if config.account_id.is_empty()
            || config.client_id.is_empty()
            || config.client_secret.is_empty()
        {
            return Err(ZoomError::ConfigError(
                "zoom.account_id, zoom.client_id and zoom.client_secret are required".to_string(),
            ));
        }
        let time_zone: Tz = config.time_zone.parse().map_err(|_| {
            ZoomError::ConfigError(format!("Unknown time zone '{}'", config.time_zone))
        })?;
        Ok(Self {
            config,
            time_zone,
            client,
            token: Mutex::new(None),
        })
    }

    /// Returns a cached token or fetches a new one.
    async fn access_token(&self) -> Result<String, ZoomError> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.expires_at > Utc::now() {
                return Ok(token.value.clone());
            }
        }

        let response = self
            .client
            .post(&self.config.oauth_url)
            .query(&[
                ("grant_type", "account_credentials"),
                ("account_id", self.config.account_id.as_str()),
            ])
            .basic_auth(&self.config.client_id, Some(&self.config.client_secret))
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            error!("[Zoom] Token request failed. Status: {}, Body: {}", status, body);
            return Err(ZoomError::AuthError(format!("status {}: {}", status, body)));
        }

        let token: TokenResponse = serde_json::from_str(&body)?;
        let lifetime = (token.expires_in - TOKEN_EXPIRY_MARGIN_SECS).max(0);
        *cached = Some(CachedToken {
            value: token.access_token.clone(),
            expires_at: Utc::now() + Duration::seconds(lifetime),
        });
        Ok(token.access_token)
    }

    async fn forget_token(&self) {
        *self.token.lock().await = None;
    }

    /// Local wall-clock start in the configured zone, as Zoom expects with `timezone`.
    fn local_start(&self, start: DateTime<Utc>) -> String {
        start
            .with_timezone(&self.time_zone)
            .format("%Y-%m-%dT%H:%M:%S")
            .to_string()
    }

    pub async fn create_meeting(&self, request: &MeetingRequest) -> Result<MeetingCreated, ZoomError> {
        let token = self.access_token().await?;
        let duration = if request.duration_minutes == 0 {
            self.config.default_duration_minutes
        } else {
            request.duration_minutes
        };
        let body = CreateMeetingBody {
            topic: &request.topic,
            kind: SCHEDULED_MEETING,
            start_time: self.local_start(request.start),
            timezone: &self.config.time_zone,
            duration,
            agenda: request.agenda.as_deref(),
            password: meeting_password(),
            settings: MeetingSettings {
                join_before_host: false,
                waiting_room: true,
            },
        };

        let url = format!(
            "{}/users/{}/meetings",
            self.config.api_base_url.trim_end_matches('/'),
            self.config.user_id
        );
        let response = self
            .client
            .post(&url)
            .bearer_auth(&token)
            .json(&body)
            .send()
            .await?;
        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            error!("[Zoom] Create meeting failed. Status: {}, Body: {}", status, text);
            if status.as_u16() == 401 {
                self.forget_token().await;
            }
            return Err(ZoomError::ApiError {
                status_code: status.as_u16(),
                message: text,
            });
        }

        let created: MeetingResponse = serde_json::from_str(&text)?;
        let meeting_id = match created.id {
            Value::String(s) => s,
            other => other.to_string(),
        };
        info!("[Zoom] Meeting {} created for '{}'", meeting_id, request.topic);
        Ok(MeetingCreated {
            meeting_id,
            join_url: created.join_url,
            password: created.password.or(Some(body.password)),
            platform: "zoom".to_string(),
        })
    }
}

/// Zoom passcodes are at most 10 characters.
fn meeting_password() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..8].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn config() -> ZoomConfig {
        ZoomConfig {
            api_base_url: "https://api.zoom.us/v2".into(),
            oauth_url: "https://zoom.us/oauth/token".into(),
            account_id: "acc".into(),
            client_id: "id".into(),
            client_secret: "secret".into(),
            user_id: "me".into(),
            time_zone: "America/Sao_Paulo".into(),
            default_duration_minutes: 50,
        }
    }

    #[test]
    fn start_time_is_rendered_in_clinic_zone() {
        let client = ZoomClient::with_client(config(), Client::new()).unwrap();
        let start = Utc.with_ymd_and_hms(2026, 11, 3, 17, 0, 0).unwrap();
        assert_eq!(client.local_start(start), "2026-11-03T14:00:00");
    }

    #[test]
    fn rejects_unknown_zone_and_missing_credentials() {
        let mut bad_zone = config();
        bad_zone.time_zone = "Mars/Olympus".into();
        assert!(matches!(
            ZoomClient::with_client(bad_zone, Client::new()),
            Err(ZoomError::ConfigError(_))
        ));

        let mut no_secret = config();
        no_secret.client_secret.clear();
        assert!(ZoomClient::with_client(no_secret, Client::new()).is_err());
    }

    #[test]
    fn passwords_fit_zoom_limits() {
        let password = meeting_password();
        assert_eq!(password.len(), 8);
        assert!(password.chars().all(|c| c.is_ascii_alphanumeric()));
    }
}
