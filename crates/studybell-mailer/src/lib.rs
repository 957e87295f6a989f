//! Reminder email rendering and SMTP sending.
//!
//! Stateless: one call renders the fixed HTML template for a block and
//! hands it to the SMTP relay (async lettre, STARTTLS). Subject text is
//! attacker-controlled and is escaped into the template. Transport
//! failures surface as `Send` errors, never as panics.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::Mailbox,
    message::header::ContentType,
    transport::smtp::authentication::Credentials,
};

use studybell_core::config::MailConfig;
use studybell_core::error::{Result, StudybellError};

/// Sends one reminder email per call. The dispatcher talks to this trait
/// so tests can record sends without a relay.
#[async_trait]
pub trait ReminderSender: Send + Sync {
    /// Send a reminder for a block starting at `start_time`.
    /// Returns the message id on success.
    async fn send(&self, recipient: &str, subject: &str, start_time: DateTime<Utc>)
        -> Result<String>;
}

/// SMTP-backed sender.
pub struct SmtpMailer {
    config: MailConfig,
    display_tz: Tz,
}

impl SmtpMailer {
    pub fn new(config: MailConfig, display_tz: Tz) -> Self {
        Self { config, display_tz }
    }
}

#[async_trait]
impl ReminderSender for SmtpMailer {
    async fn send(
        &self,
        recipient: &str,
        subject: &str,
        start_time: DateTime<Utc>,
    ) -> Result<String> {
        let from_mailbox: Mailbox =
            format!("{} <{}>", self.config.from_name, self.config.from_address)
                .parse()
                .map_err(|e| StudybellError::Send(format!("invalid from address: {e}")))?;
        let to_mailbox: Mailbox = recipient
            .parse()
            .map_err(|e| StudybellError::Send(format!("invalid recipient: {e}")))?;

        let formatted = format_start_time(start_time, self.display_tz);
        let message_id = format!("<{}@studybell>", uuid::Uuid::new_v4());

        let email = Message::builder()
            .from(from_mailbox)
            .to(to_mailbox)
            .message_id(Some(message_id.clone()))
            .subject(format!("📚 {subject} - Study session starts in 10 minutes!"))
            .header(ContentType::TEXT_HTML)
            .body(render_reminder_html(subject, &formatted))
            .map_err(|e| StudybellError::Send(format!("build email: {e}")))?;

        let creds = Credentials::new(self.config.username.clone(), self.config.password.clone());
        let mailer = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.config.smtp_host)
            .map_err(|e| StudybellError::Send(format!("SMTP relay: {e}")))?
            .port(self.config.smtp_port)
            .credentials(creds)
            .build();

        mailer
            .send(email)
            .await
            .map_err(|e| StudybellError::Send(format!("SMTP send: {e}")))?;

        tracing::info!("📤 Reminder sent to {recipient}");
        Ok(message_id)
    }
}

/// Human-readable start time in the display timezone,
/// e.g. "June 5, 2026 at 03:04 PM".
pub fn format_start_time(start_time: DateTime<Utc>, tz: Tz) -> String {
    start_time
        .with_timezone(&tz)
        .format("%B %-d, %Y at %I:%M %p")
        .to_string()
}

/// Escape text for embedding in the HTML template.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

/// The fixed reminder template. `subject` is escaped here; `formatted_time`
/// is produced by `format_start_time` and contains no user input.
pub fn render_reminder_html(subject: &str, formatted_time: &str) -> String {
    let subject = escape_html(subject);
    format!(
        r#"<!DOCTYPE html>
<html>
  <head>
    <meta charset="utf-8">
    <title>Study Time Reminder</title>
  </head>
  <body style="font-family: Arial, sans-serif; margin: 0; padding: 0; background-color: #f5f5f5;">
    <div style="max-width: 600px; margin: 20px auto 0; background: white; border-radius: 12px; overflow: hidden; box-shadow: 0 4px 6px rgba(0,0,0,0.1);">
      <div style="background: linear-gradient(135deg, #3B82F6, #8B5CF6); padding: 40px 30px; text-align: center;">
        <h1 style="color: white; margin: 0; font-size: 28px; font-weight: bold;">⏰ Study Time Alert</h1>
        <p style="color: #e0e7ff; margin: 10px 0 0 0; font-size: 16px;">Your focus session is about to begin!</p>
      </div>
      <div style="padding: 30px;">
        <h2 style="color: #1f2937; margin: 0 0 20px 0; font-size: 22px;">📚 {subject}</h2>
        <div style="background: #f0f9ff; padding: 20px; border-radius: 10px; border-left: 4px solid #3B82F6; margin: 20px 0;">
          <p style="color: #1e40af; margin: 0; font-size: 18px; font-weight: bold;">⏰ Starts in 10 minutes</p>
          <p style="color: #64748b; margin: 10px 0 0 0; font-size: 16px;"><strong>Time:</strong> {formatted_time}</p>
        </div>
        <div style="background: #f0fdf4; padding: 20px; border-radius: 10px; border: 1px solid #bbf7d0; margin: 20px 0;">
          <h3 style="color: #166534; margin: 0 0 15px 0; font-size: 16px;">💡 Quick prep checklist:</h3>
          <ul style="color: #166534; margin: 0; padding-left: 20px; line-height: 1.6;">
            <li>Find a quiet, comfortable space</li>
            <li>Gather all your study materials</li>
            <li>Keep water and snacks nearby</li>
            <li>Turn off distracting notifications</li>
          </ul>
        </div>
        <div style="text-align: center; margin: 30px 0;">
          <p style="color: #6b7280; font-size: 16px; margin: 0;">You've got this! 🎯</p>
        </div>
      </div>
      <div style="background: #f8fafc; padding: 20px; text-align: center; border-top: 1px solid #e5e7eb;">
        <p style="color: #9ca3af; margin: 0; font-size: 14px;">
          You're receiving this because you scheduled a study block.<br>
          <strong>Studybell</strong> - Helping you stay focused!
        </p>
      </div>
    </div>
  </body>
</html>
"#
    )
}
