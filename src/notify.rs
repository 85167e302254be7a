//! Outbound notifications
//!
//! Email over SMTP is the primary channel. Slack, Discord and Telegram
//! webhooks can be configured alongside it; every configured channel gets
//! the message. With nothing configured the message is only logged.

use std::time::Duration;
use chrono::NaiveDate;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};

use crate::error::NotificationError;
use crate::types::{RunSummary, ScoredRecord};

pub trait Notifier {
    fn send(&self, subject: &str, body: &str, recipients: &[String]) -> Result<(), NotificationError>;
}

pub struct SmtpNotifier {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from: String,
    pub timeout: Duration,
}

impl Notifier for SmtpNotifier {
    fn send(&self, subject: &str, body: &str, recipients: &[String]) -> Result<(), NotificationError> {
        if recipients.is_empty() {
            return Err(NotificationError::channel("smtp", "no recipients configured"));
        }

        let from: Mailbox = self.from.parse()
            .map_err(|e| NotificationError::channel("smtp", format!("bad sender '{}': {}", self.from, e)))?;

        let mut builder = Message::builder()
            .from(from)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN);

        for recipient in recipients {
            let to: Mailbox = recipient.parse()
                .map_err(|e| NotificationError::channel("smtp", format!("bad recipient '{}': {}", recipient, e)))?;
            builder = builder.to(to);
        }

        let email = builder.body(body.to_string())
            .map_err(|e| NotificationError::channel("smtp", e))?;

        let mailer = SmtpTransport::starttls_relay(&self.host)
            .map_err(|e| NotificationError::channel("smtp", e))?
            .port(self.port)
            .credentials(Credentials::new(self.username.clone(), self.password.clone()))
            .timeout(Some(self.timeout))
            .build();

        mailer.send(&email).map_err(|e| NotificationError::channel("smtp", e))?;

        tracing::info!(recipients = recipients.len(), subject, "email sent");
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Webhook {
    Slack { url: String },
    Discord { url: String },
    Telegram { token: String, chat_id: String },
}

impl Webhook {
    pub fn channel(&self) -> &'static str {
        match self {
            Webhook::Slack { .. } => "slack",
            Webhook::Discord { .. } => "discord",
            Webhook::Telegram { .. } => "telegram",
        }
    }
}

/// Chat webhook. Recipients are ignored; the hook decides where it posts.
pub struct WebhookNotifier {
    hook: Webhook,
    client: reqwest::blocking::Client,
}

impl WebhookNotifier {
    pub fn new(hook: Webhook, timeout: Duration) -> reqwest::Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()?;
        Ok(Self { hook, client })
    }
}

impl Notifier for WebhookNotifier {
    fn send(&self, subject: &str, body: &str, _recipients: &[String]) -> Result<(), NotificationError> {
        let text = format!("{}\n\n{}", subject, body);
        let channel = self.hook.channel();

        let request = match &self.hook {
            Webhook::Slack { url } => self.client.post(url).json(&serde_json::json!({ "text": text })),
            Webhook::Discord { url } => self.client.post(url).json(&serde_json::json!({ "content": text })),
            Webhook::Telegram { token, chat_id } => {
                let url = format!("https://api.telegram.org/bot{}/sendMessage", token);
                self.client.post(url).form(&[("chat_id", chat_id.as_str()), ("text", text.as_str())])
            }
        };

        request.send()
            .and_then(|resp| resp.error_for_status())
            .map_err(|e| NotificationError::channel(channel, e))?;

        tracing::info!(channel, subject, "webhook notification sent");
        Ok(())
    }
}

/// Used when no channel is configured: the message goes to the log.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn send(&self, subject: &str, body: &str, _recipients: &[String]) -> Result<(), NotificationError> {
        tracing::warn!(subject, "no notification channels configured; message follows\n{}", body);
        Ok(())
    }
}

/// Sends through every channel. Succeeds if at least one channel does.
pub struct FanoutNotifier {
    channels: Vec<Box<dyn Notifier>>,
}

impl FanoutNotifier {
    pub fn new(channels: Vec<Box<dyn Notifier>>) -> Self {
        Self { channels }
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

impl Notifier for FanoutNotifier {
    fn send(&self, subject: &str, body: &str, recipients: &[String]) -> Result<(), NotificationError> {
        if self.channels.is_empty() {
            return LogNotifier.send(subject, body, recipients);
        }

        let mut errors = Vec::new();
        for channel in &self.channels {
            if let Err(e) = channel.send(subject, body, recipients) {
                tracing::warn!(error = %e, "notification channel failed");
                errors.push(e.to_string());
            }
        }

        if errors.len() == self.channels.len() {
            return Err(NotificationError::AllFailed(errors));
        }
        Ok(())
    }
}

/// Subject and body for the batched new-items message.
pub fn format_new_items(prefix: &str, items: &[ScoredRecord], checked: usize) -> (String, String) {
    let noun = if items.len() == 1 { "tender" } else { "tenders" };
    let subject = format!("{} {} new {}", prefix, items.len(), noun);

    let mut body = format!(
        "New matching tenders detected (checked {} items):\n\n",
        checked
    );
    for item in items {
        let record = &item.record;
        body.push_str(&format!("- {}\n", record.title));
        body.push_str(&format!("  {}\n", record.url));
        body.push_str(&format!("  source: {} (score {})\n", item.source_name, item.score));
        if let Some(published) = record.published_at {
            body.push_str(&format!("  published: {}\n", published.format("%Y-%m-%d")));
        }
    }

    (subject, body)
}

/// Subject and body for the daily liveness message.
pub fn format_heartbeat(prefix: &str, date: NaiveDate, summary: &RunSummary) -> (String, String) {
    let subject = format!("{} Daily heartbeat", prefix);

    let mut body = format!("Watcher is running ({}).\n\n", date.format("%Y-%m-%d"));
    body.push_str(&format!(
        "Latest run: {} fetched, {} relevant, {} new.\n",
        summary.fetched,
        summary.relevant,
        summary.new_count()
    ));

    if !summary.failures.is_empty() {
        body.push_str("\nFailing sources:\n");
        for failure in &summary.failures {
            body.push_str(&format!("- {}: {}\n", failure.source_id, failure.error));
        }
    }
    if !summary.anomalies.is_empty() {
        body.push_str(&format!("\nUnrecognized page layout: {}\n", summary.anomalies.join(", ")));
    }

    (subject, body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use crate::types::{NotificationOutcome, SourceFailure, TenderRecord};

    struct Down;
    impl Notifier for Down {
        fn send(&self, _s: &str, _b: &str, _r: &[String]) -> Result<(), NotificationError> {
            Err(NotificationError::channel("down", "refused"))
        }
    }

    struct Up;
    impl Notifier for Up {
        fn send(&self, _s: &str, _b: &str, _r: &[String]) -> Result<(), NotificationError> {
            Ok(())
        }
    }

    fn item(title: &str, score: u32) -> ScoredRecord {
        ScoredRecord {
            record: TenderRecord {
                source_id: "a".to_string(),
                external_id: "1".to_string(),
                title: title.to_string(),
                url: "https://example.com/t/1".to_string(),
                published_at: Some(Utc.with_ymd_and_hms(2026, 10, 17, 0, 0, 0).unwrap()),
                raw_text: String::new(),
            },
            source_name: "Source A".to_string(),
            score,
        }
    }

    #[test]
    fn test_fanout_succeeds_if_any_channel_does() {
        let fanout = FanoutNotifier::new(vec![Box::new(Down), Box::new(Up)]);
        assert!(fanout.send("s", "b", &[]).is_ok());
    }

    #[test]
    fn test_fanout_fails_when_all_fail() {
        let fanout = FanoutNotifier::new(vec![Box::new(Down), Box::new(Down)]);
        match fanout.send("s", "b", &[]) {
            Err(NotificationError::AllFailed(errors)) => assert_eq!(errors.len(), 2),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_empty_fanout_logs() {
        assert!(FanoutNotifier::new(vec![]).send("s", "b", &[]).is_ok());
    }

    #[test]
    fn test_smtp_requires_recipients() {
        let smtp = SmtpNotifier {
            host: "smtp.example.com".to_string(),
            port: 587,
            username: "u".to_string(),
            password: "p".to_string(),
            from: "watcher@example.com".to_string(),
            timeout: Duration::from_secs(1),
        };
        assert!(smtp.send("s", "b", &[]).is_err());
    }

    #[test]
    fn test_webhook_notifier_builds_client() {
        let hook = Webhook::Discord { url: "https://discord.test/api/webhooks/1".to_string() };
        let notifier = WebhookNotifier::new(hook.clone(), Duration::from_secs(5)).unwrap();
        assert_eq!(notifier.hook, hook);
    }

    #[test]
    fn test_format_new_items() {
        let (subject, body) = format_new_items("[Tenders]", &[item("Software Tender for Ministry X", 2)], 14);
        assert_eq!(subject, "[Tenders] 1 new tender");
        assert!(body.contains("checked 14 items"));
        assert!(body.contains("- Software Tender for Ministry X\n"));
        assert!(body.contains("  https://example.com/t/1\n"));
        assert!(body.contains("source: Source A (score 2)"));
        assert!(body.contains("published: 2026-10-17"));

        let (subject, _) = format_new_items("[Tenders]", &[item("a", 1), item("b", 1)], 2);
        assert_eq!(subject, "[Tenders] 2 new tenders");
    }

    #[test]
    fn test_format_heartbeat_lists_failures() {
        let summary = RunSummary {
            fetched: 10,
            relevant: 3,
            new_items: vec![],
            failures: vec![SourceFailure { source_id: "b".to_string(), error: "HTTP 503".to_string() }],
            anomalies: vec!["c".to_string()],
            notification: NotificationOutcome::NotNeeded,
            heartbeat_sent: false,
            pruned: 0,
        };
        let date = NaiveDate::from_ymd_opt(2026, 10, 18).unwrap();
        let (subject, body) = format_heartbeat("[Tenders]", date, &summary);
        assert_eq!(subject, "[Tenders] Daily heartbeat");
        assert!(body.contains("2026-10-18"));
        assert!(body.contains("10 fetched, 3 relevant, 0 new"));
        assert!(body.contains("- b: HTTP 503"));
        assert!(body.contains("Unrecognized page layout: c"));
    }
}
