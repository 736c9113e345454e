mod smtp;
mod telegram;

pub use smtp::SmtpNotifier;
pub use telegram::TelegramNotifier;

use std::time::Duration;

use async_trait::async_trait;
use watch_core::{MonitorError, Notifier};

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Trait for notification channels.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    async fn send(&self, text: &str) -> Result<(), NotificationError>;
    fn name(&self) -> &str;
}

/// Errors from the notification system.
#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("Telegram error: {0}")]
    Telegram(String),
    #[error("SMTP error: {0}")]
    Smtp(String),
    #[error("Discord webhook error: {0}")]
    Discord(String),
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Configuration for the notification service.
#[derive(Debug, Clone)]
pub struct NotificationConfig {
    pub telegram_bot_token: Option<String>,
    pub telegram_chat_id: Option<String>,
    pub smtp_host: Option<String>,
    pub smtp_port: u16,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,
    pub smtp_from: Option<String>,
    pub smtp_to: Vec<String>,
    pub smtp_tls: SmtpTls,
    pub discord_webhook_url: Option<String>,
    /// Upper bound for a single send on any channel.
    pub request_timeout: Duration,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            telegram_bot_token: None,
            telegram_chat_id: None,
            smtp_host: None,
            smtp_port: 587,
            smtp_username: None,
            smtp_password: None,
            smtp_from: None,
            smtp_to: Vec::new(),
            smtp_tls: SmtpTls::default(),
            discord_webhook_url: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub enum SmtpTls {
    #[default]
    StartTls,
    Tls,
    None,
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.trim().is_empty())
}

pub(crate) fn build_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

impl NotificationConfig {
    /// Load from environment variables.
    pub fn from_env() -> Self {
        let smtp_to = std::env::var("NOTIFICATION_EMAIL_TO")
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let smtp_tls = match std::env::var("SMTP_TLS").unwrap_or_default().as_str() {
            "tls" => SmtpTls::Tls,
            "none" => SmtpTls::None,
            _ => SmtpTls::StartTls,
        };

        Self {
            telegram_bot_token: non_empty_var("BOT_TOKEN"),
            telegram_chat_id: non_empty_var("ADMIN_CHAT_ID"),
            smtp_host: non_empty_var("SMTP_HOST"),
            smtp_port: std::env::var("SMTP_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(587),
            smtp_username: non_empty_var("SMTP_USERNAME"),
            smtp_password: non_empty_var("SMTP_PASSWORD"),
            smtp_from: non_empty_var("SMTP_FROM_ADDRESS"),
            smtp_to,
            smtp_tls,
            discord_webhook_url: non_empty_var("DISCORD_WEBHOOK_URL"),
            request_timeout: std::env::var("FETCH_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse::<u64>().ok())
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT),
        }
    }
}

/// Dispatches each message to every configured channel.
pub struct NotificationService {
    channels: Vec<Box<dyn NotificationChannel>>,
}

impl NotificationService {
    pub fn new(config: &NotificationConfig) -> Self {
        let mut channels: Vec<Box<dyn NotificationChannel>> = Vec::new();

        if let (Some(token), Some(chat_id)) = (&config.telegram_bot_token, &config.telegram_chat_id) {
            channels.push(Box::new(TelegramNotifier::new(
                token.clone(),
                chat_id.clone(),
                config.request_timeout,
            )));
            tracing::info!("Telegram notifications enabled (chat {})", chat_id);
        }

        // Add SMTP channel if configured
        if config.smtp_host.is_some() && config.smtp_from.is_some() && !config.smtp_to.is_empty() {
            match SmtpNotifier::new(config) {
                Ok(notifier) => {
                    tracing::info!(
                        "Email notifications enabled (SMTP -> {} recipients)",
                        config.smtp_to.len()
                    );
                    channels.push(Box::new(notifier));
                }
                Err(e) => {
                    tracing::warn!("Failed to initialize SMTP notifier: {}", e);
                }
            }
        }

        if let Some(ref webhook_url) = config.discord_webhook_url {
            channels.push(Box::new(DiscordWebhookNotifier {
                webhook_url: webhook_url.clone(),
                client: build_client(config.request_timeout),
            }));
            tracing::info!("Discord webhook notifications enabled");
        }

        if channels.is_empty() {
            tracing::info!(
                "No notification channels configured (set BOT_TOKEN/ADMIN_CHAT_ID, SMTP_HOST or DISCORD_WEBHOOK_URL)"
            );
        }

        Self { channels }
    }

    pub fn with_channels(channels: Vec<Box<dyn NotificationChannel>>) -> Self {
        Self { channels }
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }
}

#[async_trait]
impl Notifier for NotificationService {
    /// Succeeds if at least one channel accepted the message, or if no
    /// channel is configured at all.
    async fn notify(&self, text: &str) -> Result<(), MonitorError> {
        if self.channels.is_empty() {
            tracing::debug!("No channels configured, dropping notification: {}", text);
            return Ok(());
        }

        let mut failures = Vec::new();
        for channel in &self.channels {
            match channel.send(text).await {
                Ok(()) => tracing::debug!("Sent notification via {}", channel.name()),
                Err(e) => {
                    tracing::warn!("Failed to send notification via {}: {}", channel.name(), e);
                    failures.push(format!("{}: {}", channel.name(), e));
                }
            }
        }

        if failures.len() == self.channels.len() {
            Err(MonitorError::Delivery(failures.join("; ")))
        } else {
            Ok(())
        }
    }
}

/// Discord webhook notifier.
struct DiscordWebhookNotifier {
    webhook_url: String,
    client: reqwest::Client,
}

#[async_trait]
impl NotificationChannel for DiscordWebhookNotifier {
    async fn send(&self, text: &str) -> Result<(), NotificationError> {
        let payload = serde_json::json!({
            "content": text,
            "username": "Coin Watcher",
        });

        let response = self
            .client
            .post(&self.webhook_url)
            .json(&payload)
            .send()
            .await
            // the webhook URL is a credential
            .map_err(|e| NotificationError::Discord(e.without_url().to_string()))?;

        if !response.status().is_success() {
            return Err(NotificationError::Discord(format!("HTTP {}", response.status())));
        }

        Ok(())
    }

    fn name(&self) -> &str {
        "discord-webhook"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    struct FakeChannel {
        name: &'static str,
        fail: bool,
        sent: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl NotificationChannel for FakeChannel {
        async fn send(&self, text: &str) -> Result<(), NotificationError> {
            if self.fail {
                return Err(NotificationError::Telegram("chat not found".into()));
            }
            self.sent.lock().unwrap().push(text.to_string());
            Ok(())
        }

        fn name(&self) -> &str {
            self.name
        }
    }

    fn channel(name: &'static str, fail: bool) -> (Box<dyn NotificationChannel>, Arc<Mutex<Vec<String>>>) {
        let sent = Arc::new(Mutex::new(Vec::new()));
        (
            Box::new(FakeChannel {
                name,
                fail,
                sent: sent.clone(),
            }),
            sent,
        )
    }

    #[tokio::test]
    async fn test_fans_out_to_all_channels() {
        let (a, sent_a) = channel("a", false);
        let (b, sent_b) = channel("b", false);
        let service = NotificationService::with_channels(vec![a, b]);

        service.notify("hello").await.unwrap();
        assert_eq!(*sent_a.lock().unwrap(), vec!["hello".to_string()]);
        assert_eq!(*sent_b.lock().unwrap(), vec!["hello".to_string()]);
    }

    #[tokio::test]
    async fn test_partial_failure_still_succeeds() {
        let (a, _) = channel("a", true);
        let (b, sent_b) = channel("b", false);
        let service = NotificationService::with_channels(vec![a, b]);

        assert!(service.notify("hello").await.is_ok());
        assert_eq!(sent_b.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_all_channels_failing_is_delivery_error() {
        let (a, _) = channel("a", true);
        let (b, _) = channel("b", true);
        let service = NotificationService::with_channels(vec![a, b]);

        let err = service.notify("hello").await.unwrap_err();
        assert!(matches!(err, MonitorError::Delivery(_)));
        assert!(err.to_string().contains("a: Telegram error"));
    }

    #[tokio::test]
    async fn test_no_channels_is_noop() {
        let service = NotificationService::new(&NotificationConfig::default());
        assert_eq!(service.channel_count(), 0);
        assert!(service.notify("hello").await.is_ok());
    }

    #[tokio::test]
    async fn test_unresponsive_webhook_is_bounded() {
        // accepts connections and never answers
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let config = NotificationConfig {
            discord_webhook_url: Some(format!("http://{}/api/webhooks/1/secret", addr)),
            request_timeout: Duration::from_millis(200),
            ..Default::default()
        };
        let service = NotificationService::new(&config);
        assert_eq!(service.channel_count(), 1);

        let result = tokio::time::timeout(Duration::from_secs(5), service.notify("startup"))
            .await
            .expect("notify should give up after the request timeout");
        let err = result.unwrap_err();
        assert!(matches!(err, MonitorError::Delivery(_)));
        assert!(!err.to_string().contains("secret"));
    }

    #[test]
    fn test_default_request_timeout() {
        assert_eq!(
            NotificationConfig::default().request_timeout,
            DEFAULT_REQUEST_TIMEOUT
        );
    }

    #[test]
    fn test_telegram_requires_token_and_chat() {
        let config = NotificationConfig {
            telegram_bot_token: Some("123:abc".into()),
            ..Default::default()
        };
        assert_eq!(NotificationService::new(&config).channel_count(), 0);

        let config = NotificationConfig {
            telegram_bot_token: Some("123:abc".into()),
            telegram_chat_id: Some("42".into()),
            ..Default::default()
        };
        assert_eq!(NotificationService::new(&config).channel_count(), 1);
    }
}
