//! SMTP alert channel.

use std::sync::Arc;

use async_trait::async_trait;
use lettre::message::{header, Mailbox, Message, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Tokio1Executor};

use crate::alerts::channel::{AlertChannel, ChannelError, ChannelKind};
use crate::config::EmailSettings;
use crate::domain::Alert;

/// Sends a finished message. Split out so the channel can be tested
/// without an SMTP server.
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(&self, message: Message) -> Result<(), ChannelError>;
}

pub struct SmtpMailTransport {
    inner: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpMailTransport {
    pub fn from_settings(settings: &EmailSettings) -> Result<Self, ChannelError> {
        let builder = if settings.starttls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&settings.smtp_host)
                .map_err(|e| ChannelError::Transport(e.to_string()))?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&settings.smtp_host)
        };
        let mut builder = builder.port(settings.smtp_port);
        if let (Some(user), Some(password)) = (&settings.username, &settings.password) {
            builder = builder.credentials(Credentials::new(user.clone(), password.clone()));
        }
        Ok(Self {
            inner: builder.build(),
        })
    }
}

#[async_trait]
impl MailTransport for SmtpMailTransport {
    async fn send(&self, message: Message) -> Result<(), ChannelError> {
        self.inner
            .send(message)
            .await
            .map(|_| ())
            .map_err(|e| ChannelError::Transport(e.to_string()))
    }
}

pub struct EmailChannel {
    from: Mailbox,
    to: Vec<Mailbox>,
    transport: Arc<dyn MailTransport>,
}

impl EmailChannel {
    pub fn new(
        from: &str,
        to: &[String],
        transport: Arc<dyn MailTransport>,
    ) -> Result<Self, ChannelError> {
        let parse = |addr: &str| {
            addr.parse::<Mailbox>()
                .map_err(|e| ChannelError::Message(format!("{addr:?}: {e}")))
        };
        let to = to.iter().map(|a| parse(a)).collect::<Result<Vec<_>, _>>()?;
        if to.is_empty() {
            return Err(ChannelError::Message("no recipients".to_string()));
        }
        Ok(Self {
            from: parse(from)?,
            to,
            transport,
        })
    }

    pub fn from_settings(settings: &EmailSettings) -> Result<Self, ChannelError> {
        let transport = SmtpMailTransport::from_settings(settings)?;
        Self::new(&settings.from, &settings.to, Arc::new(transport))
    }

    pub fn subject(alert: &Alert) -> String {
        format!(
            "[{}] {}",
            alert.severity.as_str().to_uppercase(),
            alert.title()
        )
    }

    pub fn render_text(alert: &Alert) -> String {
        let mut out = format!(
            "{}\nSeverity: {}\nTime: {}\n\n{}\n",
            alert.title(),
            alert.severity.as_str().to_uppercase(),
            alert.timestamp.to_rfc3339(),
            alert.message
        );
        for (key, value) in alert.fields() {
            out.push_str(&format!("{key}: {value}\n"));
        }
        out
    }

    pub fn render_html(alert: &Alert) -> String {
        let rows: String = alert
            .fields()
            .into_iter()
            .map(|(key, value)| {
                format!(
                    "<tr><th align=\"left\">{}</th><td>{}</td></tr>",
                    escape(&key),
                    escape(&value)
                )
            })
            .collect();
        format!(
            "<html><body>\
             <h2 style=\"color:{color}\">{title}</h2>\
             <p><strong>Severity:</strong> {severity}<br><strong>Time:</strong> {time}</p>\
             <p>{message}</p>\
             <table>{rows}</table>\
             </body></html>",
            color = alert.severity.color(),
            title = escape(&alert.title()),
            severity = alert.severity.as_str().to_uppercase(),
            time = alert.timestamp.to_rfc3339(),
            message = escape(&alert.message),
        )
    }

    pub fn build_message(&self, alert: &Alert) -> Result<Message, ChannelError> {
        let mut builder = Message::builder()
            .from(self.from.clone())
            .subject(Self::subject(alert));
        for recipient in &self.to {
            builder = builder.to(recipient.clone());
        }
        builder
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(header::ContentType::TEXT_PLAIN)
                            .body(Self::render_text(alert)),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(header::ContentType::TEXT_HTML)
                            .body(Self::render_html(alert)),
                    ),
            )
            .map_err(|e| ChannelError::Message(e.to_string()))
    }
}

#[async_trait]
impl AlertChannel for EmailChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Email
    }

    async fn deliver(&self, alert: &Alert) -> Result<(), ChannelError> {
        let message = self.build_message(alert)?;
        self.transport.send(message).await
    }
}

fn escape(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AlertType, Severity};
    use std::sync::Mutex;

    #[derive(Default)]
    struct CapturingTransport {
        sent: Mutex<Vec<Message>>,
    }

    #[async_trait]
    impl MailTransport for CapturingTransport {
        async fn send(&self, message: Message) -> Result<(), ChannelError> {
            self.sent.lock().unwrap().push(message);
            Ok(())
        }
    }

    fn alert() -> Alert {
        Alert::new(
            AlertType::MigrationFailed,
            Severity::High,
            "Migration of <ledger> failed after 4 attempts",
        )
        .with_data("error", "exit code 1")
    }

    #[test]
    fn test_html_is_escaped_and_complete() {
        let html = EmailChannel::render_html(&alert());
        assert!(html.contains("Migration of &lt;ledger&gt; failed"));
        assert!(html.contains("<th align=\"left\">error</th><td>exit code 1</td>"));
        assert!(html.contains("HIGH"));
    }

    #[test]
    fn test_invalid_address_rejected() {
        let transport = Arc::new(CapturingTransport::default());
        assert!(EmailChannel::new("not an address", &["ops@acme.io".into()], transport.clone()).is_err());
        assert!(EmailChannel::new("bot@acme.io", &[], transport).is_err());
    }

    #[tokio::test]
    async fn test_deliver_hands_message_to_transport() {
        let transport = Arc::new(CapturingTransport::default());
        let channel = EmailChannel::new(
            "Migration Bot <bot@acme.io>",
            &["ops@acme.io".into(), "lead@acme.io".into()],
            transport.clone(),
        )
        .unwrap();
        channel.deliver(&alert()).await.unwrap();

        let sent = transport.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].envelope().to().len(), 2);
        let raw = String::from_utf8(sent[0].formatted()).unwrap();
        assert!(raw.contains("Subject: [HIGH] Migration Failed"));
    }
}
