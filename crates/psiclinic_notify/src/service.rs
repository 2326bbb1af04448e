//! [`NotificationService`] over the email and Twilio senders.

use psiclinic_common::services::{BoxFuture, NotificationResult, NotificationService};
use psiclinic_common::ProviderError;
use psiclinic_config::AppConfig;

use crate::email::EmailSender;
use crate::error::NotifyError;
use crate::twilio::TwilioMessenger;

/// Each channel is optional; calling a missing one fails with `NotConfigured`
/// without affecting the others.
#[derive(Clone, Default)]
pub struct Notifier {
    email: Option<EmailSender>,
    twilio: Option<TwilioMessenger>,
}

impl Notifier {
    pub fn new(email: Option<EmailSender>, twilio: Option<TwilioMessenger>) -> Self {
        Self { email, twilio }
    }

    /// Builds the channels enabled in config. `None` when none are.
    pub fn from_config(config: &AppConfig) -> Option<Self> {
        let email = config.email_enabled().cloned().map(EmailSender::new);
        let twilio = config.twilio_enabled().cloned().map(TwilioMessenger::new);
        if email.is_none() && twilio.is_none() {
            return None;
        }
        Some(Self::new(email, twilio))
    }

    fn email(&self) -> Result<&EmailSender, NotifyError> {
        self.email
            .as_ref()
            .ok_or_else(|| NotifyError::ConfigError("email channel disabled".to_string()))
    }

    fn twilio(&self) -> Result<&TwilioMessenger, NotifyError> {
        self.twilio
            .as_ref()
            .ok_or_else(|| NotifyError::ConfigError("twilio channel disabled".to_string()))
    }
}

impl NotificationService for Notifier {
    fn send_email(
        &self,
        to: &str,
        subject: &str,
        html: &str,
    ) -> BoxFuture<'_, NotificationResult, ProviderError> {
        let (to, subject, html) = (to.to_string(), subject.to_string(), html.to_string());
        Box::pin(async move { Ok(self.email()?.send(&to, &subject, &html).await?) })
    }

    fn send_sms(&self, to: &str, body: &str) -> BoxFuture<'_, NotificationResult, ProviderError> {
        let (to, body) = (to.to_string(), body.to_string());
        Box::pin(async move { Ok(self.twilio()?.send_sms(&to, &body).await?) })
    }

    fn send_whatsapp(
        &self,
        to: &str,
        body: &str,
    ) -> BoxFuture<'_, NotificationResult, ProviderError> {
        let (to, body) = (to.to_string(), body.to_string());
        Box::pin(async move { Ok(self.twilio()?.send_whatsapp(&to, &body).await?) })
    }
}
