//! Runtime settings from environment variables
//!
//! Everything is optional except what a configured channel needs. Paths are
//! resolved under `ROOT`.

use std::path::PathBuf;
use std::time::Duration;
use anyhow::{anyhow, Context, Result};

use crate::notify::{FanoutNotifier, Notifier, SmtpNotifier, Webhook, WebhookNotifier};
use crate::pipeline::{DeliveryPolicy, HeartbeatSchedule, RunOptions};
use crate::scrapers::FetchOptions;

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (TenderWatcher; +https://github.com/)";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmtpSettings {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from: String,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub root: PathBuf,
    pub recipients: Vec<String>,
    pub smtp: Option<SmtpSettings>,
    pub webhooks: Vec<Webhook>,
    pub heartbeat_enabled: bool,
    pub heartbeat_hour_utc: u32,
    pub delivery: DeliveryPolicy,
    pub retention_days: Option<i64>,
    pub fetch_timeout: Duration,
    pub source_delay: Duration,
    pub respect_robots: bool,
    pub user_agent: String,
    pub subject_prefix: String,
}

fn parse_var<T: std::str::FromStr>(name: &str, value: Option<String>, default: T) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    match value {
        Some(v) if !v.trim().is_empty() => v.trim().parse::<T>()
            .map_err(|e| anyhow!("{}: invalid value '{}': {}", name, v, e)),
        _ => Ok(default),
    }
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; `from_env` passes the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let recipients: Vec<String> = get("ALERT_TO")
            .map(|v| v.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect())
            .unwrap_or_default();

        let smtp = match (get("SMTP_USER"), get("SMTP_PASS")) {
            (Some(username), Some(password)) => Some(SmtpSettings {
                host: get("SMTP_HOST").unwrap_or_else(|| "smtp.mail.yahoo.com".to_string()),
                port: parse_var("SMTP_PORT", get("SMTP_PORT"), 587u16)?,
                from: get("ALERT_FROM").unwrap_or_else(|| username.clone()),
                username,
                password,
            }),
            _ => None,
        };

        let mut webhooks = Vec::new();
        if let Some(url) = get("SLACK_WEBHOOK_URL") {
            webhooks.push(Webhook::Slack { url });
        }
        if let Some(url) = get("DISCORD_WEBHOOK_URL") {
            webhooks.push(Webhook::Discord { url });
        }
        if let (Some(token), Some(chat_id)) = (get("TELEGRAM_BOT_TOKEN"), get("TELEGRAM_CHAT_ID")) {
            webhooks.push(Webhook::Telegram { token, chat_id });
        }

        let heartbeat_hour_utc = parse_var("HEARTBEAT_HOUR_UTC", get("HEARTBEAT_HOUR_UTC"), 6u32)?;
        if heartbeat_hour_utc > 23 {
            return Err(anyhow!("HEARTBEAT_HOUR_UTC must be 0-23, got {}", heartbeat_hour_utc));
        }

        let retention_days = match get("SEEN_RETENTION_DAYS") {
            Some(v) => {
                let days = parse_var("SEEN_RETENTION_DAYS", Some(v), 0i64)?;
                if days < 1 {
                    return Err(anyhow!("SEEN_RETENTION_DAYS must be at least 1, got {}", days));
                }
                Some(days)
            }
            None => None,
        };

        Ok(Self {
            root: PathBuf::from(get("ROOT").unwrap_or_else(|| ".".to_string())),
            recipients,
            smtp,
            webhooks,
            heartbeat_enabled: parse_var("HEARTBEAT_ENABLE", get("HEARTBEAT_ENABLE").map(|v| v.to_lowercase()), true)?,
            heartbeat_hour_utc,
            delivery: parse_var("DELIVERY_POLICY", get("DELIVERY_POLICY"), DeliveryPolicy::AtMostOnce)?,
            retention_days,
            fetch_timeout: Duration::from_secs(parse_var("FETCH_TIMEOUT_SECS", get("FETCH_TIMEOUT_SECS"), 30u64)?),
            source_delay: Duration::from_millis(parse_var("SOURCE_DELAY_MS", get("SOURCE_DELAY_MS"), 1000u64)?),
            respect_robots: parse_var("RESPECT_ROBOTS", get("RESPECT_ROBOTS").map(|v| v.to_lowercase()), true)?,
            user_agent: get("USER_AGENT").unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
            subject_prefix: get("SUBJECT_PREFIX").unwrap_or_else(|| "[Tenders]".to_string()),
        })
    }

    pub fn sources_path(&self) -> PathBuf {
        self.root.join("config").join("sources.yml")
    }

    pub fn keywords_path(&self) -> PathBuf {
        self.root.join("config").join("keywords.txt")
    }

    pub fn state_path(&self) -> PathBuf {
        self.root.join("state").join("seen.json")
    }

    pub fn fetch_options(&self) -> FetchOptions {
        FetchOptions {
            user_agent: self.user_agent.clone(),
            timeout: self.fetch_timeout,
            respect_robots: self.respect_robots,
        }
    }

    pub fn run_options(&self) -> RunOptions {
        RunOptions {
            recipients: self.recipients.clone(),
            subject_prefix: self.subject_prefix.clone(),
            delivery: self.delivery,
            heartbeat: self.heartbeat_enabled.then_some(HeartbeatSchedule { hour_utc: self.heartbeat_hour_utc }),
            retention: self.retention_days.map(chrono::Duration::days),
            source_delay: self.source_delay,
        }
    }

    /// All configured channels behind one notifier.
    pub fn notifier(&self) -> Result<FanoutNotifier> {
        let mut channels: Vec<Box<dyn Notifier>> = Vec::new();

        if let Some(smtp) = &self.smtp {
            if self.recipients.is_empty() {
                return Err(anyhow!("SMTP credentials are set but ALERT_TO is empty"));
            }
            channels.push(Box::new(SmtpNotifier {
                host: smtp.host.clone(),
                port: smtp.port,
                username: smtp.username.clone(),
                password: smtp.password.clone(),
                from: smtp.from.clone(),
                timeout: self.fetch_timeout,
            }));
        } else {
            tracing::warn!("SMTP_USER/SMTP_PASS not set; email channel disabled");
        }

        for hook in &self.webhooks {
            let notifier = WebhookNotifier::new(hook.clone(), self.fetch_timeout)
                .with_context(|| format!("failed to build {} webhook client", hook.channel()))?;
            channels.push(Box::new(notifier));
        }

        Ok(FanoutNotifier::new(channels))
    }

    pub fn ensure_root(&self) -> Result<()> {
        if !self.root.is_dir() {
            return Err(anyhow!("ROOT {:?} is not a directory", self.root));
        }
        Ok(())
    }
}
