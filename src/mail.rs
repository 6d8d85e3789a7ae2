use crate::token::TokenIssuer;
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("Mail provider error: {0}")]
    Provider(String),

    #[error("Mail request failed: {0}")]
    Transport(String),

    #[error("Mail delivery timed out")]
    Timeout,
}

/// Outbound email transport.
#[async_trait]
pub trait MailSender: Send + Sync {
    async fn send(&self, to: &str, subject: &str, html_body: &str) -> Result<(), MailError>;
}

/// Logs emails instead of sending them. Used in development.
pub struct ConsoleMailer;

#[async_trait]
impl MailSender for ConsoleMailer {
    async fn send(&self, to: &str, subject: &str, html_body: &str) -> Result<(), MailError> {
        tracing::info!(
            to = %to,
            subject = %subject,
            body_len = html_body.len(),
            "Email (console transport)"
        );
        tracing::debug!(body = %html_body, "Email body");
        Ok(())
    }
}

/// Sends through an HTTP mail API (SendGrid v3 wire shape).
pub struct HttpApiMailer {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    from_email: String,
    from_name: String,
}

impl HttpApiMailer {
    pub fn new(api_url: String, api_key: String, from_email: String, from_name: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url,
            api_key,
            from_email,
            from_name,
        }
    }
}

#[async_trait]
impl MailSender for HttpApiMailer {
    async fn send(&self, to: &str, subject: &str, html_body: &str) -> Result<(), MailError> {
        let payload = json!({
            "personalizations": [{
                "to": [{"email": to}]
            }],
            "from": {
                "email": self.from_email,
                "name": self.from_name
            },
            "subject": subject,
            "content": [{
                "type": "text/html",
                "value": html_body
            }]
        });

        let response = self
            .client
            .post(&self.api_url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&payload)
            .send()
            .await
            .map_err(|e| MailError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(MailError::Provider(format!("{}: {}", status, body)));
        }

        Ok(())
    }
}

/// Render the verification email for `email` holding raw token `token`.
/// Returns (subject, html body).
pub fn render_verification(base_url: &str, email: &str, token: &str) -> (String, String) {
    // Addresses with `+` or other reserved characters must survive the
    // query-string round trip.
    let link = format!(
        "{}/verify-email?token={}&email={}",
        base_url.trim_end_matches('/'),
        urlencoding::encode(token),
        urlencoding::encode(email)
    );
    let code = TokenIssuer::short_code(token);

    let subject = "Verify your email address".to_string();
    let body = format!(
        r#"<h2>Welcome!</h2>
<p>Confirm your email address to finish setting up your account.</p>
<p><a href="{link}">Verify email address</a></p>
<p>Or enter this code: <strong>{code}</strong></p>
<p>This link expires in 24 hours. If you did not create an account, you can ignore this email.</p>"#
    );

    (subject, body)
}

/// Result of attempting to deliver an email. Delivery failure never fails the
/// operation that triggered it; callers report this status instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchStatus {
    Sent,
    Failed(String),
}

impl DispatchStatus {
    pub fn is_sent(&self) -> bool {
        matches!(self, DispatchStatus::Sent)
    }
}

/// Dispatches transactional email with a bounded wait, so a slow provider
/// cannot stall registration.
#[derive(Clone)]
pub struct MailOutbox {
    sender: Arc<dyn MailSender>,
    timeout: Duration,
}

impl MailOutbox {
    pub fn new(sender: Arc<dyn MailSender>, timeout: Duration) -> Self {
        Self { sender, timeout }
    }

    pub async fn deliver_verification(
        &self,
        base_url: &str,
        email: &str,
        token: &str,
    ) -> DispatchStatus {
        let (subject, body) = render_verification(base_url, email, token);

        let result = tokio::time::timeout(self.timeout, self.sender.send(email, &subject, &body))
            .await
            .map_err(|_| MailError::Timeout)
            .and_then(|r| r);

        match result {
            Ok(()) => DispatchStatus::Sent,
            Err(e) => {
                tracing::warn!(to = %email, error = %e, "Verification email delivery failed");
                DispatchStatus::Failed(e.to_string())
            }
        }
    }
}
