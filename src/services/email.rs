use crate::error::BeamError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub text: String,
    pub html: String,
}

impl EmailMessage {
    /// The notification sent to a recipient when the sender picks email sharing.
    pub fn claim_notification(to: &str, amount: &str, claim_link: &str) -> Self {
        let subject = format!("You've received ${} USDC on Beam!", amount);

        let text = format!(
            "Great news! Someone sent you ${amount} USDC using Beam.\n\n\
             Click here to claim your funds: {claim_link}\n\n\
             Simply log in with this email address and your funds will be transferred to your secure wallet instantly.\n\n\
             Need help? Visit our support page or reply to this email.\n\n\
             Happy claiming!\n\
             The Beam Team"
        );

        let html = format!(
            r#"<div style="font-family: Arial, sans-serif; max-width: 600px; margin: 0 auto;">
  <h1 style="color: #333; text-align: center;">You've received a Beam payment!</h1>
  <div style="background: #f5f5f5; padding: 20px; border-radius: 8px; text-align: center;">
    <p style="font-size: 18px; margin-bottom: 20px;">Someone sent you ${amount} USDC using Beam.</p>
    <a href="{claim_link}" style="display: inline-block; background: #000; color: white; padding: 12px 24px; text-decoration: none; border-radius: 6px; font-weight: bold;">Claim Your Funds</a>
  </div>
  <p style="text-align: center; color: #666; font-size: 14px; margin-top: 20px;">Powered by Beam - Send crypto as easy as email</p>
</div>"#
        );

        Self {
            to: to.to_string(),
            subject,
            text,
            html,
        }
    }
}

#[async_trait]
pub trait Mailer: Send + Sync {
    /// Returns the provider's message id.
    async fn send(&self, message: &EmailMessage) -> Result<String, BeamError>;
}

/// Sends through the Resend HTTP API.
pub struct ResendMailer {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    from: String,
}

#[derive(Serialize)]
struct ResendRequest<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    html: &'a str,
    text: &'a str,
}

#[derive(Deserialize)]
struct ResendResponse {
    id: Option<String>,
    message: Option<String>,
}

impl ResendMailer {
    pub fn new(api_url: String, api_key: String, from: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: api_url.trim_end_matches('/').to_string(),
            api_key,
            from,
        }
    }
}

#[async_trait]
impl Mailer for ResendMailer {
    async fn send(&self, message: &EmailMessage) -> Result<String, BeamError> {
        let request = ResendRequest {
            from: &self.from,
            to: [message.to.as_str()],
            subject: &message.subject,
            html: &message.html,
            text: &message.text,
        };

        let response = self
            .client
            .post(format!("{}/emails", self.api_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| BeamError::Email(e.to_string()))?;

        let status = response.status();
        let body: ResendResponse = response
            .json()
            .await
            .map_err(|e| BeamError::Email(format!("Unreadable response ({}): {}", status, e)))?;

        if !status.is_success() {
            return Err(BeamError::Email(
                body.message
                    .unwrap_or_else(|| format!("Failed to send email ({})", status)),
            ));
        }

        let id = body
            .id
            .ok_or_else(|| BeamError::Email("Response missing message id".to_string()))?;

        tracing::debug!("Email {} accepted by Resend", id);
        Ok(id)
    }
}

/// Development mailer: writes the message to the log instead of sending it.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, message: &EmailMessage) -> Result<String, BeamError> {
        tracing::info!(
            to = %message.to,
            subject = %message.subject,
            "Email provider not configured, logging message:\n{}",
            message.text
        );
        Ok(format!("logged_{}", chrono::Utc::now().timestamp_millis()))
    }
}
