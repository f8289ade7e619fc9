//! Configuration and paths
//!
//! Everything comes from the environment (optionally seeded by a `.env` file).
//! The struct is built once at startup and handed to each component.

use crate::error::{Error, Result};
use std::path::{Path, PathBuf};

/// All configurable paths, endpoints and constants
#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: PathBuf,
    pub snapshot_file: PathBuf,
    pub replied_file: PathBuf,
    pub sensitive_terms_file: PathBuf,
    pub booking_api_url: String,
    pub booking_api_key: Option<String>,
    pub openai_api_url: String,
    pub openai_api_key: Option<String>,
    pub openai_model: String,
    pub telegram_api_url: String,
    pub telegram_token: Option<String>,
    pub telegram_chat_id: Option<String>,
    pub flagsmith_api_url: String,
    pub flagsmith_env_key: Option<String>,
    pub parking_apartments: Vec<String>,
    pub parking_keywords: Vec<String>,
    pub http_timeout_secs: u64,
    pub page_size: u32,
    pub max_pages: u32,
    pub new_booking_window_mins: i64,
    pub resync_days_back: i64,
    pub resync_days_ahead: i64,
    /// Reservations that departed more than this many days ago are not swept
    pub stale_after_days: i64,
    pub sweep_schedule: String,
    pub sync_schedule: String,
    pub resync_schedule: String,
    pub poll_interval_ms: u64,
}

impl Config {
    /// Build from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup (the environment in production)
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let data_dir = match get("DATA_DIR") {
            Some(dir) => PathBuf::from(dir),
            None if Path::new(PERSISTENT_DISK_DIR).exists() => PathBuf::from(PERSISTENT_DISK_DIR),
            None => PathBuf::from("data"),
        };

        let http_timeout_secs = match get("HTTP_TIMEOUT_SECS") {
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|_| Error::Config(format!("HTTP_TIMEOUT_SECS is not a number: {}", raw)))?,
            None => 30,
        };

        let stale_after_days = match get("STALE_AFTER_DAYS") {
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|_| Error::Config(format!("STALE_AFTER_DAYS is not a number: {}", raw)))?,
            None => 10,
        };

        let parking_apartments = get("PARKING_APARTMENTS")
            .map(|raw| split_list(&raw))
            .unwrap_or_else(|| to_strings(DEFAULT_PARKING_APARTMENTS));

        Ok(Self {
            snapshot_file: data_dir.join(SNAPSHOT_FILE_NAME),
            replied_file: data_dir.join(REPLIED_FILE_NAME),
            sensitive_terms_file: get("SENSITIVE_TERMS_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| data_dir.join(SENSITIVE_TERMS_FILE_NAME)),
            data_dir,
            booking_api_url: get("SMOOBU_API_URL").unwrap_or_else(|| DEFAULT_BOOKING_API_URL.to_string()),
            booking_api_key: get("SMOOBU_API_KEY"),
            openai_api_url: get("OPENAI_API_URL").unwrap_or_else(|| DEFAULT_OPENAI_API_URL.to_string()),
            openai_api_key: get("OPENAI_API_KEY"),
            openai_model: get("OPENAI_MODEL").unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string()),
            telegram_api_url: get("TELEGRAM_API_URL").unwrap_or_else(|| DEFAULT_TELEGRAM_API_URL.to_string()),
            telegram_token: get("TELEGRAM_TOKEN"),
            telegram_chat_id: get("TELEGRAM_CHAT_ID"),
            flagsmith_api_url: get("FLAGSMITH_API_URL").unwrap_or_else(|| DEFAULT_FLAGSMITH_API_URL.to_string()),
            flagsmith_env_key: get("FLAGSMITH_ENV_KEY"),
            parking_apartments,
            parking_keywords: to_strings(DEFAULT_PARKING_KEYWORDS),
            http_timeout_secs,
            page_size: 100,
            max_pages: 500,
            new_booking_window_mins: 15,
            resync_days_back: 10,
            resync_days_ahead: 20,
            stale_after_days,
            sweep_schedule: "0 * * * * *".to_string(),
            sync_schedule: "0 */15 * * * *".to_string(),
            resync_schedule: "0 0 3 * * *".to_string(),
            poll_interval_ms: 1000,
        })
    }

    /// Create config for testing with custom paths and no network credentials
    pub fn for_test(temp_dir: &Path) -> Self {
        Self {
            data_dir: temp_dir.to_path_buf(),
            snapshot_file: temp_dir.join(SNAPSHOT_FILE_NAME),
            replied_file: temp_dir.join(REPLIED_FILE_NAME),
            sensitive_terms_file: temp_dir.join(SENSITIVE_TERMS_FILE_NAME),
            booking_api_url: "http://127.0.0.1:9/api".to_string(),
            booking_api_key: Some("test-key".to_string()),
            openai_api_url: "http://127.0.0.1:9/v1/chat/completions".to_string(),
            openai_api_key: None,
            openai_model: DEFAULT_OPENAI_MODEL.to_string(),
            telegram_api_url: "http://127.0.0.1:9".to_string(),
            telegram_token: None,
            telegram_chat_id: None,
            flagsmith_api_url: "http://127.0.0.1:9/api/v1".to_string(),
            flagsmith_env_key: None,
            parking_apartments: to_strings(DEFAULT_PARKING_APARTMENTS),
            parking_keywords: to_strings(DEFAULT_PARKING_KEYWORDS),
            http_timeout_secs: 5,
            page_size: 100,
            max_pages: 500,
            new_booking_window_mins: 15,
            resync_days_back: 10,
            resync_days_ahead: 20,
            stale_after_days: 10,
            sweep_schedule: "0 * * * * *".to_string(),
            sync_schedule: "0 */15 * * * *".to_string(),
            resync_schedule: "0 0 3 * * *".to_string(),
            poll_interval_ms: 100,
        }
    }

    /// Booking API key, required by every networked command
    pub fn require_booking_key(&self) -> Result<&str> {
        self.booking_api_key
            .as_deref()
            .ok_or_else(|| Error::Config("SMOOBU_API_KEY is not set".to_string()))
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

fn to_strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Mounted persistent disk used in container deployments
pub const PERSISTENT_DISK_DIR: &str = "/mnt/data";

pub const SNAPSHOT_FILE_NAME: &str = "current_reservations.json";
pub const REPLIED_FILE_NAME: &str = "replied.json";
pub const SENSITIVE_TERMS_FILE_NAME: &str = "sensitive_terms.csv";

pub const DEFAULT_BOOKING_API_URL: &str = "https://login.smoobu.com/api";
pub const DEFAULT_OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_TELEGRAM_API_URL: &str = "https://api.telegram.org";
pub const DEFAULT_FLAGSMITH_API_URL: &str = "https://edge.api.flagsmith.com/api/v1";

/// Message `type` value the booking platform uses for guest-authored messages
pub const GUEST_MESSAGE_TYPE: i64 = 1;

/// Subject line attached to every automated reply
pub const REPLY_SUBJECT: &str = "Risposta automatica";

/// Sent when the LLM call fails
pub const FALLBACK_REPLY: &str = "Grazie per il messaggio! Ti risponderemo al più presto.";

pub const DEFAULT_PARKING_APARTMENTS: &[&str] = &[
    "B1 Suite 1",
    "B2 Suite 2",
    "B3 Suite 3",
    "B4 Casa dell'Alfiere",
    "B5 Casa Solferino",
    "B6 Carlina",
    "B7 San Carlo",
    "C1 De Lellis 1",
    "C2 De Lellis 2",
    "C3 De Lellis 3",
    "C4 De Lellis 4",
    "D Mercanti",
];

pub const DEFAULT_PARKING_KEYWORDS: &[&str] = &[
    "parcheggio",
    "auto",
    "macchina",
    "garage",
    "dove parcheggiare",
    "parking",
    "car",
    "where to park",
];

pub const PARKING_REPLY_IT: &str = "Per quanto riguarda il parcheggio, ci appoggiamo a un'autorimessa convenzionata che si trova \
a 3 minuti a piedi dall'appartamento. Si chiama Garage AUTOPALAZZO in Via Bertola 7. \
All'arrivo, comunicando che siete ospiti presso Top Living Apartments, otterrete una tariffa ridotta di 32€ al giorno.";

pub const PARKING_REPLY_EN: &str = "For what concerns parking, you can use a partner garage located 3 minutes away from the apartment. \
The place is called Garage AUTOPALAZZO (https://www.garageautopalazzo.it/?page_id=475), in Via Bertola 7.\n\
When you arrive at the garage, tell the personnel you are guests at Top Living Apartments and you'll pay a reduced tariff of 32€ per day.";
