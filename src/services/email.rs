// Email delivery via AWS SES

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_sesv2::types::{Body, Content, Destination, EmailContent, Message};
use aws_sdk_sesv2::Client;
use thiserror::Error;
use tracing::info;

use crate::common::safe_email_log;

#[derive(Debug, Error)]
pub enum EmailError {
    #[error("failed to build email: {0}")]
    Build(String),

    #[error("failed to send email: {0}")]
    Send(String),
}

#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, to: &str, subject: &str, html_body: &str) -> Result<(), EmailError>;
}

/// SES-backed mailer. Credentials and region come from the ambient AWS
/// environment.
pub struct SesMailer {
    from_address: String,
}

impl SesMailer {
    pub fn new(from_address: String) -> Self {
        Self { from_address }
    }
}

#[async_trait]
impl EmailSender for SesMailer {
    async fn send(&self, to: &str, subject: &str, html_body: &str) -> Result<(), EmailError> {
        let config = aws_config::defaults(BehaviorVersion::latest()).load().await;
        let client = Client::new(&config);

        let destination = Destination::builder().to_addresses(to).build();
        let subject = Content::builder()
            .data(subject)
            .charset("UTF-8")
            .build()
            .map_err(|e| EmailError::Build(e.to_string()))?;
        let body = Content::builder()
            .data(html_body)
            .charset("UTF-8")
            .build()
            .map_err(|e| EmailError::Build(e.to_string()))?;
        let message = Message::builder()
            .subject(subject)
            .body(Body::builder().html(body).build())
            .build();
        let content = EmailContent::builder().simple(message).build();

        client
            .send_email()
            .from_email_address(&self.from_address)
            .destination(destination)
            .content(content)
            .send()
            .await
            .map_err(|e| EmailError::Send(e.to_string()))?;

        info!(to = %safe_email_log(to), "Email: sent");
        Ok(())
    }
}

/// Account confirmation email. The link carries the verification code; the
/// code itself is shown as a fallback for clients that mangle links.
pub fn confirm_account_email(frontend_url: &str, code: &str) -> (String, String) {
    let subject = "Confirm your account".to_string();
    let body = format!(
        r#"<html>
<body style="font-family: Arial, sans-serif;">
    <h2>Welcome!</h2>
    <p>Thanks for signing up. Please confirm your email address to activate your account.</p>
    <p><a href="{frontend_url}/verifications/confirm?token={code}">Confirm my account</a></p>
    <p>Or enter this code manually: <strong>{code}</strong></p>
    <p>If you did not create this account, you can safely ignore this email.</p>
</body>
</html>"#
    );
    (subject, body)
}

/// Password reset email.
pub fn forgot_password_email(frontend_url: &str, code: &str) -> (String, String) {
    let subject = "Reset your password".to_string();
    let body = format!(
        r#"<html>
<body style="font-family: Arial, sans-serif;">
    <h2>Password reset</h2>
    <p>We received a request to reset your password.</p>
    <p><a href="{frontend_url}/reset-password?token={code}">Choose a new password</a></p>
    <p>Or enter this code manually: <strong>{code}</strong></p>
    <p>If you did not request this, you can safely ignore this email and your password will stay unchanged.</p>
</body>
</html>"#
    );
    (subject, body)
}
