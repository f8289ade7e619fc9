//! Booking platform API client
//!
//! Reservation listing, per-reservation message listing and the
//! send-message-to-guest endpoint. Authenticated with a static `Api-Key` header.

use crate::config::{Config, GUEST_MESSAGE_TYPE};
use crate::error::{Error, Result};
use chrono::{Duration, NaiveDate, NaiveDateTime};
use reqwest::blocking::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use std::time::Duration as StdDuration;
use tracing::debug;

/// Timestamp format the platform uses for message `createdAt`
pub const MESSAGE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Apartment reference embedded in a reservation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Apartment {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
}

/// A booking as seen by this system (immutable once observed)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: i64,
    #[serde(rename = "guest-name", alias = "guestName", default)]
    pub guest_name: Option<String>,
    #[serde(default)]
    pub apartment: Option<Apartment>,
    #[serde(default)]
    pub arrival: Option<NaiveDate>,
    #[serde(default)]
    pub departure: Option<NaiveDate>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(rename = "created-at", default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

impl Reservation {
    pub fn apartment_name(&self) -> &str {
        self.apartment.as_ref().map(|a| a.name.as_str()).unwrap_or("")
    }

    pub fn guest_display_name(&self) -> &str {
        self.guest_name.as_deref().unwrap_or("ospite")
    }
}

/// A message on a reservation thread (read-only)
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Message {
    pub id: i64,
    #[serde(rename = "type", default, deserialize_with = "null_as_default")]
    pub message_type: i64,
    #[serde(rename = "message", default, deserialize_with = "null_as_default")]
    pub body: String,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(rename = "createdAt", default, deserialize_with = "deserialize_created_at")]
    pub created_at: Option<NaiveDateTime>,
}

impl Message {
    pub fn is_from_guest(&self) -> bool {
        self.message_type == GUEST_MESSAGE_TYPE
    }
}

/// The platform sends `null` for blank fields; read those as the default
fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn deserialize_created_at<'de, D>(deserializer: D) -> std::result::Result<Option<NaiveDateTime>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.and_then(|s| NaiveDateTime::parse_from_str(s.trim(), MESSAGE_TIME_FORMAT).ok()))
}

/// One page of a paginated listing
#[derive(Debug, Clone, PartialEq)]
pub enum Page<T> {
    Records(Vec<T>),
    Empty,
}

impl<T> Page<T> {
    pub fn from_vec(records: Vec<T>) -> Self {
        if records.is_empty() {
            Page::Empty
        } else {
            Page::Records(records)
        }
    }

    pub fn into_vec(self) -> Vec<T> {
        match self {
            Page::Records(records) => records,
            Page::Empty => Vec::new(),
        }
    }
}

/// Which reservation timestamp a sync window filters on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowKind {
    Created,
    Arrival,
}

/// Time window for a reservation listing
#[derive(Debug, Clone, PartialEq)]
pub struct SyncWindow {
    pub kind: WindowKind,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl SyncWindow {
    /// Bookings created in the last `minutes`
    pub fn new_bookings(now: NaiveDateTime, minutes: i64) -> Self {
        Self {
            kind: WindowKind::Created,
            start: now - Duration::minutes(minutes),
            end: now,
        }
    }

    /// Bookings arriving between `days_back` ago and `days_ahead` from now
    pub fn arrivals(now: NaiveDateTime, days_back: i64, days_ahead: i64) -> Self {
        Self {
            kind: WindowKind::Arrival,
            start: now - Duration::days(days_back),
            end: now + Duration::days(days_ahead),
        }
    }

    /// Query parameters for the listing endpoint
    pub fn query_params(&self) -> Vec<(&'static str, String)> {
        match self.kind {
            WindowKind::Created => vec![
                ("createdFrom", self.start.format("%Y-%m-%dT%H:%M:%S").to_string()),
                ("createdTo", self.end.format("%Y-%m-%dT%H:%M:%S").to_string()),
            ],
            WindowKind::Arrival => vec![
                ("arrivalFrom", self.start.format("%Y-%m-%d").to_string()),
                ("arrivalTo", self.end.format("%Y-%m-%d").to_string()),
            ],
        }
    }
}

/// Operations the rest of the crate needs from the booking platform
pub trait BookingApi {
    fn list_reservations(&self, window: &SyncWindow, page: u32) -> Result<Page<Reservation>>;

    fn list_messages(&self, reservation_id: i64, page: u32) -> Result<Page<Message>>;

    fn send_message(&self, reservation_id: i64, subject: &str, body: &str) -> Result<()>;
}

#[derive(Deserialize)]
struct BookingsEnvelope {
    #[serde(default)]
    bookings: Vec<Reservation>,
}

#[derive(Deserialize)]
struct MessagesEnvelope {
    #[serde(default)]
    messages: Vec<Message>,
}

#[derive(Serialize)]
struct SendMessageBody<'a> {
    subject: &'a str,
    #[serde(rename = "messageBody")]
    message_body: &'a str,
}

/// Blocking HTTP client for the booking platform
pub struct HttpBookingClient {
    http: Client,
    base_url: String,
    api_key: String,
    page_size: u32,
}

impl HttpBookingClient {
    pub fn new(config: &Config) -> Result<Self> {
        let api_key = config.require_booking_key()?.to_string();
        let http = Client::builder()
            .timeout(StdDuration::from_secs(config.http_timeout_secs))
            .build()?;

        Ok(Self {
            http,
            base_url: config.booking_api_url.trim_end_matches('/').to_string(),
            api_key,
            page_size: config.page_size,
        })
    }

    /// First page of the unfiltered listing (most recent bookings first)
    pub fn recent_reservations(&self) -> Result<Vec<Reservation>> {
        let url = format!("{}/reservations", self.base_url);
        let envelope: BookingsEnvelope = self.get_json(&url, &[])?;
        Ok(envelope.bookings)
    }

    fn get_json<T: DeserializeOwned>(&self, url: &str, query: &[(&str, String)]) -> Result<T> {
        debug!(url, ?query, "GET");
        let response = self
            .http
            .get(url)
            .header("Api-Key", &self.api_key)
            .query(query)
            .send()?;

        let status = response.status();
        let body = response.text()?;
        if !status.is_success() {
            return Err(Error::Transport(format!("GET {} status={} body={}", url, status, body)));
        }

        serde_json::from_str(&body).map_err(|e| Error::Decode(format!("GET {}: {}", url, e)))
    }
}

impl BookingApi for HttpBookingClient {
    fn list_reservations(&self, window: &SyncWindow, page: u32) -> Result<Page<Reservation>> {
        let url = format!("{}/reservations", self.base_url);
        let mut query = window.query_params();
        query.push(("page", page.to_string()));
        query.push(("pageSize", self.page_size.to_string()));

        let envelope: BookingsEnvelope = self.get_json(&url, &query)?;
        Ok(Page::from_vec(envelope.bookings))
    }

    fn list_messages(&self, reservation_id: i64, page: u32) -> Result<Page<Message>> {
        let url = format!("{}/reservations/{}/messages", self.base_url, reservation_id);
        let query = [
            ("page", page.to_string()),
            ("pageSize", self.page_size.to_string()),
            ("onlyRelatedToGuest", "true".to_string()),
        ];

        let envelope: MessagesEnvelope = self.get_json(&url, &query)?;
        Ok(Page::from_vec(envelope.messages))
    }

    fn send_message(&self, reservation_id: i64, subject: &str, body: &str) -> Result<()> {
        let url = format!(
            "{}/reservations/{}/messages/send-message-to-guest",
            self.base_url, reservation_id
        );
        let response = self
            .http
            .post(&url)
            .header("Api-Key", &self.api_key)
            .json(&SendMessageBody {
                subject,
                message_body: body,
            })
            .send()?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().unwrap_or_default();
            return Err(Error::Transport(format!("POST {} status={} body={}", url, status, text)));
        }

        Ok(())
    }
}
