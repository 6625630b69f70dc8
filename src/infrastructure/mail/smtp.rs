use crate::common::error::{JobError, Result};
use crate::config::settings::SmtpSettings;
use async_trait::async_trait;
use lettre::message::{header, Mailbox, Message};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Tokio1Executor};
use std::sync::Arc;
use tracing::{info, warn};

/// Best-effort delivery of a single message. Callers never retry.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, to: &str, subject: &str, html_body: &str) -> Result<()>;
}

/// SMTP notifier, or a logging no-op when no host is configured.
#[derive(Clone)]
pub struct SmtpNotifier {
    transport: Option<Arc<AsyncSmtpTransport<Tokio1Executor>>>,
    from: Mailbox,
}

impl SmtpNotifier {
    pub fn new(config: &SmtpSettings) -> Result<Self> {
        let from = config
            .from
            .parse::<Mailbox>()
            .map_err(|e| JobError::Notification(format!("invalid SMTP_FROM address: {}", e)))?;

        let transport = if config.host.trim().is_empty() {
            warn!("SMTP host not configured; notifications will only be logged");
            None
        } else {
            let builder = if config.tls {
                AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
                    .map_err(|e| JobError::Notification(format!("failed to configure SMTP transport: {}", e)))?
            } else {
                AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
            }
            .port(config.port);

            let builder = match (&config.username, &config.password) {
                (Some(user), Some(pass)) => builder.credentials(Credentials::new(user.clone(), pass.clone())),
                _ => builder,
            };

            info!("✅ SMTP notifier configured for {}:{}", config.host, config.port);
            Some(Arc::new(builder.build()))
        };

        Ok(Self { transport, from })
    }
}

#[async_trait]
impl Notifier for SmtpNotifier {
    async fn notify(&self, to: &str, subject: &str, html_body: &str) -> Result<()> {
        let Some(transport) = &self.transport else {
            info!(to, subject, "Notification (no-op mode)");
            return Ok(());
        };

        let recipient = to
            .parse::<Mailbox>()
            .map_err(|e| JobError::Notification(format!("invalid recipient {}: {}", to, e)))?;

        let message = Message::builder()
            .from(self.from.clone())
            .to(recipient)
            .subject(subject)
            .header(header::ContentType::TEXT_HTML)
            .body(html_body.to_string())
            .map_err(|e| JobError::Notification(e.to_string()))?;

        transport
            .send(message)
            .await
            .map_err(|e| JobError::Notification(e.to_string()))?;

        info!(to, subject, "📧 Notification sent");
        Ok(())
    }
}

pub fn ready_message(download_url: &str, ttl_hours: u64) -> (String, String) {
    let subject = "Your HLS stream is ready".to_string();
    let body = format!(
        r#"<!DOCTYPE html>
<html>
<body style="font-family: sans-serif; color: #333;">
    <h2>Your stream has been generated</h2>
    <p>All renditions were encoded and packaged into a single archive.</p>
    <p><a href="{url}">{url}</a></p>
    <p style="color: #999; font-size: 12px;">This link expires in {ttl} hour(s).</p>
</body>
</html>"#,
        url = download_url,
        ttl = ttl_hours.max(1),
    );
    (subject, body)
}

pub fn failure_message(cause: &str) -> (String, String) {
    let subject = "Your HLS stream could not be generated".to_string();
    let body = format!(
        r#"<!DOCTYPE html>
<html>
<body style="font-family: sans-serif; color: #333;">
    <h2>Stream generation failed</h2>
    <p>{cause}</p>
    <p>Please check the source file and upload it again.</p>
</body>
</html>"#,
        cause = escape_html(cause),
    );
    (subject, body)
}

fn escape_html(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
