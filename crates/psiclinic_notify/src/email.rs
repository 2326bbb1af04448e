//! Transactional email over an HTTP API (Resend-compatible).

use psiclinic_common::services::NotificationResult;
use psiclinic_common::HTTP_CLIENT;
use psiclinic_config::EmailConfig;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::error::NotifyError;

const SERVICE: &str = "email";

#[derive(Serialize, Debug)]
struct EmailBody<'a> {
    from: &'a str,
    to: Vec<&'a str>,
    subject: &'a str,
    html: &'a str,
}

#[derive(Deserialize, Debug)]
struct EmailResponse {
    id: String,
}

#[derive(Clone)]
pub struct EmailSender {
    config: EmailConfig,
    client: Client,
}

impl EmailSender {
    pub fn new(config: EmailConfig) -> Self {
        Self::with_client(config, HTTP_CLIENT.clone())
    }

    pub fn with_client(config: EmailConfig, client: Client) -> Self {
        Self { config, client }
    }

    pub async fn send(
        &self,
        to: &str,
        subject: &str,
        html: &str,
    ) -> Result<NotificationResult, NotifyError> {
        if self.config.api_key.is_empty() {
            return Err(NotifyError::ConfigError("email.api_key is empty".to_string()));
        }
        let body = EmailBody {
            from: &self.config.from,
            to: vec![to],
            subject,
            html,
        };

        let response = self
            .client
            .post(&self.config.api_url)
            .bearer_auth(&self.config.api_key)
            .json(&body)
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
            error!("[Email] Send to {} failed. Status: {}, Body: {}", to, status, text);
            return Err(NotifyError::ApiError {
                service: SERVICE,
                status_code: status.as_u16(),
                message: text,
            });
        }

        let sent: EmailResponse = serde_json::from_str(&text).map_err(|source| {
            NotifyError::ParseError {
                service: SERVICE,
                source,
            }
        })?;
        info!("[Email] Sent '{}' to {} (id {})", subject, to, sent.id);
        Ok(NotificationResult {
            id: sent.id,
            status: "sent".to_string(),
        })
    }
}
