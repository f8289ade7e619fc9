//! Operator notifications
//!
//! Fire-and-forget text to a single operator chat. Delivery failures are
//! logged and swallowed; a notification never affects the reply flow.

use crate::config::Config;
use crate::error::{Error, Result};
use reqwest::blocking::Client;
use std::time::Duration;
use tracing::{debug, warn};

/// Best-effort side channel for decisions and failures
pub trait Notifier {
    fn notify(&self, text: &str);
}

/// Notifier used when no destination is configured
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, text: &str) {
        debug!(text, "Notification (no operator channel configured)");
    }
}

/// Telegram bot `sendMessage` to a fixed chat
pub struct TelegramNotifier {
    http: Client,
    api_url: String,
    token: String,
    chat_id: String,
}

impl TelegramNotifier {
    pub fn new(config: &Config, token: &str, chat_id: &str) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.http_timeout_secs))
            .build()?;

        Ok(Self {
            http,
            api_url: config.telegram_api_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            chat_id: chat_id.to_string(),
        })
    }

    pub fn send(&self, text: &str) -> Result<()> {
        let url = format!("{}/bot{}/sendMessage", self.api_url, self.token);
        let body = serde_json::json!({
            "chat_id": self.chat_id,
            "text": text,
        });

        let response = self.http.post(&url).json(&body).send()?;
        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().unwrap_or_default();
            return Err(Error::Transport(format!("telegram send failed: status={} body={}", status, text)));
        }
        Ok(())
    }
}

impl Notifier for TelegramNotifier {
    fn notify(&self, text: &str) {
        if let Err(e) = self.send(text) {
            warn!(error = %e, "Operator notification failed");
        }
    }
}

/// Telegram when both token and chat id are configured, otherwise log only
pub fn from_config(config: &Config) -> Result<Box<dyn Notifier>> {
    match (config.telegram_token.as_deref(), config.telegram_chat_id.as_deref()) {
        (Some(token), Some(chat_id)) => Ok(Box::new(TelegramNotifier::new(config, token, chat_id)?)),
        _ => Ok(Box::new(LogNotifier)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unreachable_telegram_is_swallowed() {
        let temp = std::env::temp_dir();
        let config = Config::for_test(&temp);
        let notifier = TelegramNotifier::new(&config, "123:abc", "-100").unwrap();

        assert!(notifier.send("hello").is_err());
        // notify never panics or propagates
        notifier.notify("hello");
    }

    #[test]
    fn test_from_config_without_credentials() {
        let temp = std::env::temp_dir();
        let config = Config::for_test(&temp);
        let notifier = from_config(&config).unwrap();
        notifier.notify("only logged");
    }
}
