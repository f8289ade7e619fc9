//! Message fetcher
//!
//! Pages through a reservation's message thread and returns it newest first.
//! Best effort: a failed page ends the walk and whatever arrived so far is
//! returned, since the next poll picks up anything missed.

use crate::booking::{BookingApi, Message, Page};
use crate::error::Error;
use tracing::{debug, warn};

/// Reads message threads through the booking API
pub struct MessageFetcher<'a> {
    api: &'a dyn BookingApi,
    max_pages: u32,
}

impl<'a> MessageFetcher<'a> {
    pub fn new(api: &'a dyn BookingApi, max_pages: u32) -> Self {
        Self { api, max_pages }
    }

    /// All messages of a reservation, newest first
    pub fn fetch_messages(&self, reservation_id: i64) -> Vec<Message> {
        let mut messages = Vec::new();
        let mut page = 1;

        while page <= self.max_pages {
            match self.api.list_messages(reservation_id, page) {
                Ok(Page::Records(records)) => messages.extend(records),
                Ok(Page::Empty) => break,
                Err(Error::Decode(e)) => {
                    warn!(reservation_id, page, error = %e, "Undecodable messages page, treating as empty");
                    break;
                }
                Err(e) => {
                    warn!(reservation_id, page, error = %e, "Message fetch interrupted, using partial thread");
                    break;
                }
            }
            page += 1;
        }

        debug!(reservation_id, count = messages.len(), "Fetched messages");
        sort_newest_first(&mut messages);
        messages
    }
}

/// Stable sort by creation time, descending. Undated messages sink to the end.
pub fn sort_newest_first(messages: &mut [Message]) {
    messages.sort_by(|a, b| b.created_at.cmp(&a.created_at));
}
