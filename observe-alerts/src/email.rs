//! Email notifier speaking a minimal SMTP conversation.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::DateTime;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::alert::Alert;
use crate::error::DeliveryError;
use crate::notify::Notifier;

/// Configuration for an SMTP notification channel.
///
/// The conversation is plain SMTP with optional `AUTH PLAIN`; point this at
/// a local relay or submission host.
#[derive(Clone, Debug)]
pub struct EmailConfig {
    host: String,
    port: u16,
    from: String,
    recipients: Vec<String>,
    credentials: Option<(String, String)>,
    timeout: Duration,
}

impl EmailConfig {
    /// Creates a configuration for the supplied relay and sender.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16, from: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            from: from.into(),
            recipients: Vec::new(),
            credentials: None,
            timeout: Duration::from_secs(10),
        }
    }

    /// Adds a recipient address.
    #[must_use]
    pub fn with_recipient(mut self, address: impl Into<String>) -> Self {
        self.recipients.push(address.into());
        self
    }

    /// Supplies `AUTH PLAIN` credentials.
    #[must_use]
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.credentials = Some((username.into(), password.into()));
        self
    }

    /// Overrides the whole-conversation timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Sends alerts as plain-text email through a configured SMTP relay.
#[derive(Clone, Debug)]
pub struct EmailNotifier {
    config: EmailConfig,
}

impl EmailNotifier {
    /// Creates a notifier from the supplied configuration.
    #[must_use]
    pub fn new(config: EmailConfig) -> Self {
        Self { config }
    }

    async fn deliver(&self, alert: &Alert) -> Result<(), DeliveryError> {
        let address = format!("{}:{}", self.config.host, self.config.port);
        let stream = TcpStream::connect(&address)
            .await
            .map_err(DeliveryError::transport)?;
        let (read, mut write) = tokio::io::split(stream);
        let mut reader = BufReader::new(read);

        expect_reply(&mut reader, 220).await?;
        command(&mut write, &mut reader, "EHLO agent-observe", 250).await?;

        if let Some((username, password)) = &self.config.credentials {
            let token = BASE64.encode(format!("\0{username}\0{password}"));
            command(&mut write, &mut reader, &format!("AUTH PLAIN {token}"), 235).await?;
        }

        command(
            &mut write,
            &mut reader,
            &format!("MAIL FROM:<{}>", self.config.from),
            250,
        )
        .await?;
        for recipient in &self.config.recipients {
            command(&mut write, &mut reader, &format!("RCPT TO:<{recipient}>"), 250).await?;
        }

        command(&mut write, &mut reader, "DATA", 354).await?;
        let message = dot_stuff(&self.render(alert));
        write
            .write_all(message.as_bytes())
            .await
            .map_err(DeliveryError::transport)?;
        command(&mut write, &mut reader, "\r\n.", 250).await?;
        // Best effort; the message is already accepted.
        let _ = write.write_all(b"QUIT\r\n").await;
        Ok(())
    }

    fn render(&self, alert: &Alert) -> String {
        #[allow(clippy::cast_possible_truncation)]
        let fired_at = DateTime::from_timestamp(alert.timestamp as i64, 0)
            .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
            .unwrap_or_else(|| alert.timestamp.to_string());
        format!(
            "From: {from}\r\nTo: {to}\r\nSubject: [{severity}] {rule}\r\n\r\n\
             Alert triggered: {rule}\r\n\r\n\
             Severity: {severity}\r\n\
             Metric: {metric}\r\n\
             Current value: {value}\r\n\
             Threshold: {threshold}\r\n\r\n\
             Message: {message}\r\n\r\n\
             Timestamp: {fired_at}\r\n",
            from = self.config.from,
            to = self.config.recipients.join(", "),
            severity = alert.severity.as_str().to_uppercase(),
            rule = alert.rule_name,
            metric = alert.metric_name,
            value = alert.value,
            threshold = alert.threshold,
            message = alert.message,
        )
    }
}

#[async_trait]
impl Notifier for EmailNotifier {
    fn name(&self) -> &'static str {
        "email"
    }

    async fn notify(&self, alert: &Alert) -> Result<(), DeliveryError> {
        timeout(self.config.timeout, self.deliver(alert))
            .await
            .map_err(|_| DeliveryError::Timeout)?
    }
}

/// Escapes lines starting with `.` so the body cannot terminate the DATA
/// section early (RFC 5321 dot-stuffing).
fn dot_stuff(message: &str) -> String {
    let stuffed = message.replace("\r\n.", "\r\n..");
    match stuffed.strip_prefix('.') {
        Some(rest) => format!("..{rest}"),
        None => stuffed,
    }
}

async fn command(
    write: &mut WriteHalf<TcpStream>,
    reader: &mut BufReader<ReadHalf<TcpStream>>,
    line: &str,
    expected: u16,
) -> Result<(), DeliveryError> {
    write
        .write_all(format!("{line}\r\n").as_bytes())
        .await
        .map_err(DeliveryError::transport)?;
    expect_reply(reader, expected).await
}

/// Reads one (possibly multiline) SMTP reply and checks its code.
async fn expect_reply(
    reader: &mut BufReader<ReadHalf<TcpStream>>,
    expected: u16,
) -> Result<(), DeliveryError> {
    loop {
        let mut line = String::new();
        let read = reader
            .read_line(&mut line)
            .await
            .map_err(DeliveryError::transport)?;
        if read == 0 {
            return Err(DeliveryError::Transport {
                reason: "connection closed mid-conversation".into(),
            });
        }
        let code: u16 = line
            .get(..3)
            .and_then(|c| c.parse().ok())
            .ok_or_else(|| DeliveryError::Transport {
                reason: format!("malformed SMTP reply: {}", line.trim_end()),
            })?;
        // Continuation lines carry a dash after the code.
        if line.as_bytes().get(3) == Some(&b'-') {
            continue;
        }
        if code == expected {
            return Ok(());
        }
        return Err(DeliveryError::Rejected {
            detail: line.trim_end().to_owned(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    fn sample_alert() -> Alert {
        Alert {
            rule_name: "high_cpu".into(),
            metric_name: "system.cpu_percent".into(),
            severity: observe_primitives::Severity::Error,
            value: 95.0,
            threshold: 90.0,
            message: "system.cpu_percent is 95 (threshold: > 90)".into(),
            timestamp: 1_700_000_000.0,
        }
    }

    #[test]
    fn rendered_message_carries_subject_and_body() {
        let notifier = EmailNotifier::new(
            EmailConfig::new("localhost", 25, "alerts@example.com")
                .with_recipient("ops@example.com"),
        );
        let message = notifier.render(&sample_alert());
        assert!(message.contains("Subject: [ERROR] high_cpu"));
        assert!(message.contains("To: ops@example.com"));
        assert!(message.contains("Metric: system.cpu_percent"));
        assert!(message.contains("Timestamp: 2023-11-14"));
    }

    #[test]
    fn leading_dots_in_the_body_are_escaped() {
        let notifier = EmailNotifier::new(
            EmailConfig::new("localhost", 25, "alerts@example.com")
                .with_recipient("ops@example.com"),
        );
        let mut alert = sample_alert();
        alert.message = "first line\r\n.second line\r\n..third line".into();

        let stuffed = dot_stuff(&notifier.render(&alert));
        assert!(stuffed.contains("\r\n..second line"));
        assert!(stuffed.contains("\r\n...third line"));
        assert!(
            stuffed
                .split("\r\n")
                .all(|line| !line.starts_with('.') || line.starts_with("..")),
        );
    }

    #[tokio::test]
    async fn delivers_through_a_stub_smtp_server() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            socket.write_all(b"220 stub ready\r\n").await.unwrap();
            let mut buf = vec![0u8; 4096];
            let mut transcript = String::new();
            // EHLO, MAIL, RCPT, DATA, body, QUIT.
            for reply in [
                "250-stub hello\r\n250 OK\r\n",
                "250 OK\r\n",
                "250 OK\r\n",
                "354 go ahead\r\n",
                "250 queued\r\n",
            ] {
                let read = socket.read(&mut buf).await.unwrap();
                transcript.push_str(std::str::from_utf8(&buf[..read]).unwrap());
                socket.write_all(reply.as_bytes()).await.unwrap();
            }
            transcript
        });

        let notifier = EmailNotifier::new(
            EmailConfig::new("127.0.0.1", port, "alerts@example.com")
                .with_recipient("ops@example.com"),
        );
        notifier.notify(&sample_alert()).await.unwrap();

        let transcript = server.await.unwrap();
        assert!(transcript.contains("MAIL FROM:<alerts@example.com>"));
        assert!(transcript.contains("RCPT TO:<ops@example.com>"));
        assert!(transcript.contains("Subject: [ERROR] high_cpu"));
    }

    #[tokio::test]
    async fn rejection_is_a_delivery_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            socket.write_all(b"220 stub ready\r\n").await.unwrap();
            let mut buf = vec![0u8; 1024];
            let _ = socket.read(&mut buf).await;
            socket.write_all(b"550 rejected\r\n").await.unwrap();
        });

        let notifier = EmailNotifier::new(
            EmailConfig::new("127.0.0.1", port, "alerts@example.com")
                .with_recipient("ops@example.com"),
        );
        let result = notifier.notify(&sample_alert()).await;
        assert!(matches!(result, Err(DeliveryError::Rejected { .. })));
    }
}
