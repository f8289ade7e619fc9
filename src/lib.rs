//! Guest auto-reply - vacation-rental messaging poller
//!
//! Syncs reservations from the booking platform, triages the latest guest
//! message on each one and answers it with a canned or generated reply,
//! escalating sensitive messages to a human operator.

pub mod error;
pub mod config;
pub mod store;
pub mod booking;
pub mod reservations;
pub mod messages;
pub mod filters;
pub mod flags;
pub mod triage;
pub mod assistant;
pub mod notify;
pub mod dispatch;
pub mod scheduler;

pub use error::{Error, Result};
