//! SMS and WhatsApp messages through the Twilio Messages API.

use psiclinic_common::services::NotificationResult;
use psiclinic_common::HTTP_CLIENT;
use psiclinic_config::TwilioConfig;
use reqwest::Client;
use serde::Deserialize;
use tracing::{error, info};

use crate::error::NotifyError;

const SERVICE: &str = "twilio";
const WHATSAPP_PREFIX: &str = "whatsapp:";

#[derive(Deserialize, Debug)]
struct MessageResponse {
    sid: String,
    #[serde(default)]
    status: Option<String>,
}

/// Adds the `whatsapp:` channel prefix unless it is already there.
pub fn whatsapp_address(number: &str) -> String {
    if number.starts_with(WHATSAPP_PREFIX) {
        number.to_string()
    } else {
        format!("{}{}", WHATSAPP_PREFIX, number)
    }
}

#[derive(Clone)]
pub struct TwilioMessenger {
    config: TwilioConfig,
    client: Client,
}

impl TwilioMessenger {
    pub fn new(config: TwilioConfig) -> Self {
        Self::with_client(config, HTTP_CLIENT.clone())
    }

    pub fn with_client(config: TwilioConfig, client: Client) -> Self {
        Self { config, client }
    }

    /// Sends an SMS, or a WhatsApp message when `to` carries the `whatsapp:` prefix.
    pub async fn send_sms(&self, to: &str, body: &str) -> Result<NotificationResult, NotifyError> {
        if to.starts_with(WHATSAPP_PREFIX) {
            return self.send_whatsapp(to, body).await;
        }
        self.send(to, &self.config.from_number, body).await
    }

    pub async fn send_whatsapp(
        &self,
        to: &str,
        body: &str,
    ) -> Result<NotificationResult, NotifyError> {
        let from = self
            .config
            .whatsapp_from
            .as_deref()
            .unwrap_or(&self.config.from_number);
        self.send(&whatsapp_address(to), &whatsapp_address(from), body)
            .await
    }

    async fn send(
        &self,
        to: &str,
        from: &str,
        body: &str,
    ) -> Result<NotificationResult, NotifyError> {
        if self.config.account_sid.is_empty() || self.config.auth_token.is_empty() {
            return Err(NotifyError::ConfigError(
                "twilio.account_sid and twilio.auth_token are required".to_string(),
            ));
        }
        let url = format!(
            "{}/Accounts/{}/Messages.json",
            self.config.api_base_url.trim_end_matches('/'),
            self.config.account_sid
        );
        let params = [("To", to), ("From", from), ("Body", body)];

        let response = self
            .client
            .post(&url)
            .basic_auth(&self.config.account_sid, Some(&self.config.auth_token))
            .form(&params)
            .send()
            .await
            .map_err(|source| NotifyError::RequestError {
                service: SERVICE,
                source,
            })?;
        let status = response.status();
        let text = response.text().await.map_err(|source| NotifyError::RequestError {
            service: SERVICE,
            source,
        })?;
        if !status.is_success() {
            error!("[Twilio] Message to {} failed. Status: {}, Body: {}", to, status, text);
            return Err(NotifyError::ApiError {
                service: SERVICE,
                status_code: status.as_u16(),
                message: text,
            });
        }

        let sent: MessageResponse =
            serde_json::from_str(&text).map_err(|source| NotifyError::ParseError {
                service: SERVICE,
                source,
            })?;
        info!("[Twilio] Message {} queued for {}", sent.sid, to);
        Ok(NotificationResult {
            id: sent.sid,
            status: sent.status.unwrap_or_else(|| "queued".to_string()),
        })
    }
}
