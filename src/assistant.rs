//! LLM reply generation
//!
//! Sends the guest message plus a short reservation context to a
//! chat-completions endpoint and returns the generated reply text.

use crate::booking::{Message, Reservation};
use crate::config::Config;
use crate::error::{Error, Result};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

pub const SYSTEM_INSTRUCTIONS: &str = "You are an assistant that responds to guest messages for tourist apartments in Turin. \
Answer in the language of the guest (Italian or English). Be polite, concise and helpful, \
and only state facts you are given.";

/// Produces reply text for a guest message
pub trait ReplyGenerator {
    fn generate(&self, reservation: &Reservation, message: &Message) -> Result<String>;
}

/// Context note describing the stay
pub fn reservation_context(reservation: &Reservation) -> String {
    let date = |d: Option<chrono::NaiveDate>| d.map(|d| d.to_string()).unwrap_or_else(|| "N/A".to_string());
    let apartment = match reservation.apartment_name() {
        "" => "N/A",
        name => name,
    };

    format!(
        "You're helping respond to a guest named {}.\n\
         Their reservation is for apartment '{}' from {} to {}.",
        reservation.guest_display_name(),
        apartment,
        date(reservation.arrival),
        date(reservation.departure),
    )
}

/// The user turn: the message itself plus who sent it and where they stay
pub fn user_content(reservation: &Reservation, message: &Message) -> String {
    format!(
        "User message: {}\nGuest name: {}\nApartment name: {}\n",
        message.body.trim(),
        reservation.guest_display_name(),
        reservation.apartment_name(),
    )
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f32,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

impl ChatMessage {
    fn new(role: &str, content: String) -> Self {
        Self {
            role: role.to_string(),
            content,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

/// OpenAI-compatible chat-completions client
pub struct OpenAiGenerator {
    http: Client,
    url: String,
    api_key: Option<String>,
    model: String,
}

impl OpenAiGenerator {
    pub fn new(config: &Config) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.http_timeout_secs))
            .build()?;

        Ok(Self {
            http,
            url: config.openai_api_url.clone(),
            api_key: config.openai_api_key.clone(),
            model: config.openai_model.clone(),
        })
    }

    fn complete(&self, messages: Vec<ChatMessage>) -> Result<String> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| Error::Generation("OPENAI_API_KEY is not set".to_string()))?;

        let request = ChatRequest {
            model: &self.model,
            messages,
            temperature: 0.6,
        };

        let response = self
            .http
            .post(&self.url)
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .map_err(|e| Error::Generation(e.to_string()))?;

        let status = response.status();
        let body = response.text().map_err(|e| Error::Generation(e.to_string()))?;
        if !status.is_success() {
            return Err(Error::Generation(format!("chat status={} body={}", status, body)));
        }

        let parsed: ChatResponse =
            serde_json::from_str(&body).map_err(|e| Error::Generation(format!("chat response: {}", e)))?;

        let text = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content.trim().to_string())
            .unwrap_or_default();

        if text.is_empty() {
            return Err(Error::Generation("empty completion".to_string()));
        }
        Ok(text)
    }
}

impl ReplyGenerator for OpenAiGenerator {
    fn generate(&self, reservation: &Reservation, message: &Message) -> Result<String> {
        debug!(reservation_id = reservation.id, message_id = message.id, "Requesting completion");
        self.complete(vec![
            ChatMessage::new("system", SYSTEM_INSTRUCTIONS.to_string()),
            ChatMessage::new("system", reservation_context(reservation)),
            ChatMessage::new("user", user_content(reservation, message)),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::booking::Apartment;
    use chrono::NaiveDate;

    fn reservation() -> Reservation {
        Reservation {
            id: 42,
            guest_name: Some("Anna Bianchi".to_string()),
            apartment: Some(Apartment {
                id: Some(3),
                name: "B6 Carlina".to_string(),
            }),
            arrival: NaiveDate::from_ymd_opt(2024, 7, 1),
            departure: NaiveDate::from_ymd_opt(2024, 7, 5),
            language: Some("it".to_string()),
            created_at: None,
        }
    }

    fn message() -> Message {
        Message {
            id: 9,
            message_type: 1,
            body: "  A che ora è il check-in? ".to_string(),
            subject: None,
            created_at: None,
        }
    }

    #[test]
    fn test_reservation_context() {
        let context = reservation_context(&reservation());
        assert!(context.contains("Anna Bianchi"));
        assert!(context.contains("'B6 Carlina' from 2024-07-01 to 2024-07-05"));
    }

    #[test]
    fn test_reservation_context_missing_fields() {
        let mut res = reservation();
        res.apartment = None;
        res.departure = None;
        let context = reservation_context(&res);
        assert!(context.contains("apartment 'N/A'"));
        assert!(context.contains("to N/A"));
    }

    #[test]
    fn test_user_content() {
        let content = user_content(&reservation(), &message());
        assert!(content.starts_with("User message: A che ora è il check-in?\n"));
        assert!(content.contains("Apartment name: B6 Carlina"));
    }

    #[test]
    fn test_missing_key_is_generation_error() {
        let temp = std::env::temp_dir();
        let generator = OpenAiGenerator::new(&Config::for_test(&temp)).unwrap();
        let result = generator.generate(&reservation(), &message());
        assert!(matches!(result, Err(Error::Generation(_))));
    }
}
