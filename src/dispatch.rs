//! Reply dispatcher and idempotency markers
//!
//! A marker keyed by (reservation id, message id) is written right after a
//! successful send and checked before every send. A crash between the two can
//! repeat a reply on the next cycle; delivery is at-least-once.

use crate::assistant::ReplyGenerator;
use crate::booking::{BookingApi, Message, Reservation};
use crate::config::{Config, FALLBACK_REPLY, REPLY_SUBJECT};
use crate::error::{Error, Result};
use crate::notify::Notifier;
use crate::store;
use crate::triage::TriageDecision;
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::path::PathBuf;
use tracing::{debug, error, info, warn};

/// Identifies the guest message a reply answers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MarkerKey {
    pub reservation_id: i64,
    pub message_id: i64,
}

impl MarkerKey {
    pub fn new(reservation_id: i64, message_id: i64) -> Self {
        Self {
            reservation_id,
            message_id,
        }
    }
}

impl fmt::Display for MarkerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.reservation_id, self.message_id)
    }
}

/// Durable set of answered messages, rewritten whole on every insert
pub struct ReplyMarkers {
    path: PathBuf,
    ids: BTreeSet<String>,
}

impl ReplyMarkers {
    pub fn new(config: &Config) -> Self {
        Self {
            path: config.replied_file.clone(),
            ids: BTreeSet::new(),
        }
    }

    pub fn load(&mut self) -> Result<usize> {
        self.ids = store::load_json(&self.path)?;
        Ok(self.ids.len())
    }

    pub fn contains(&self, key: MarkerKey) -> bool {
        self.ids.contains(&key.to_string())
    }

    /// Insert and persist. On a failed save the key is dropped again, so
    /// memory never claims more than the file holds.
    pub fn record(&mut self, key: MarkerKey) -> Result<()> {
        let id = key.to_string();
        if !self.ids.insert(id.clone()) {
            return Ok(());
        }
        if let Err(e) = store::save_json(&self.path, &self.ids) {
            self.ids.remove(&id);
            return Err(e);
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Turns triage decisions into outbound messages and notifications
pub struct Dispatcher<'a> {
    api: &'a dyn BookingApi,
    generator: &'a dyn ReplyGenerator,
    notifier: &'a dyn Notifier,
    markers: ReplyMarkers,
    escalated: HashSet<MarkerKey>,
}

impl<'a> Dispatcher<'a> {
    pub fn new(
        api: &'a dyn BookingApi,
        generator: &'a dyn ReplyGenerator,
        notifier: &'a dyn Notifier,
        markers: ReplyMarkers,
    ) -> Self {
        Self {
            api,
            generator,
            notifier,
            markers,
            escalated: HashSet::new(),
        }
    }

    pub fn markers(&self) -> &ReplyMarkers {
        &self.markers
    }

    /// Whether an automated reply to `trigger` was already delivered
    pub fn already_replied(&self, reservation_id: i64, trigger: &Message) -> bool {
        self.markers.contains(MarkerKey::new(reservation_id, trigger.id))
    }

    /// Act on `decision` for the message that triggered it. Returns true only
    /// when a reply was sent in this call.
    pub fn dispatch(
        &mut self,
        reservation: &Reservation,
        decision: &TriageDecision,
        trigger: &Message,
    ) -> Result<bool> {
        let key = MarkerKey::new(reservation.id, trigger.id);

        let text = match decision {
            TriageDecision::Ignore(reason) => {
                debug!(reservation_id = reservation.id, ?reason, "Nothing to answer");
                return Ok(false);
            }
            TriageDecision::Escalate { term } => {
                self.escalate(reservation, trigger, key, term);
                return Ok(false);
            }
            _ if self.markers.contains(key) => {
                debug!(reservation_id = reservation.id, message_id = trigger.id, "Already replied");
                return Ok(false);
            }
            TriageDecision::CannedReply(text) => text.clone(),
            TriageDecision::GenerateReply => self.generate(reservation, trigger),
        };

        match self.api.send_message(reservation.id, REPLY_SUBJECT, &text) {
            Ok(()) => {
                let recorded = self.markers.record(key);
                if let Err(e) = &recorded {
                    error!(
                        reservation_id = reservation.id,
                        message_id = trigger.id,
                        error = %e,
                        "Reply sent but marker not saved"
                    );
                }
                info!(
                    reservation_id = reservation.id,
                    message_id = trigger.id,
                    decision = decision.label(),
                    "Reply sent"
                );
                self.notifier.notify(&format!(
                    "🤖 Risposta automatica per prenotazione #{} ({}) - inviata: true\nMessaggio: {}",
                    reservation.id,
                    reservation.guest_display_name(),
                    text
                ));
                recorded.map(|()| true)
            }
            Err(e) => {
                warn!(
                    reservation_id = reservation.id,
                    message_id = trigger.id,
                    error = %e,
                    "Reply send failed, will retry next cycle"
                );
                self.notifier.notify(&format!(
                    "❌ Risposta automatica per prenotazione #{} - inviata: false\nErrore: {}",
                    reservation.id, e
                ));
                Ok(false)
            }
        }
    }

    fn generate(&self, reservation: &Reservation, trigger: &Message) -> String {
        match self.generator.generate(reservation, trigger) {
            Ok(text) => text,
            Err(e) => {
                let reason = match e {
                    Error::Generation(reason) => reason,
                    other => other.to_string(),
                };
                warn!(reservation_id = reservation.id, error = %reason, "Generation failed, using fallback reply");
                self.notifier.notify(&format!(
                    "⚠️ Generazione risposta fallita per prenotazione #{}: {}",
                    reservation.id, reason
                ));
                FALLBACK_REPLY.to_string()
            }
        }
    }

    fn escalate(&mut self, reservation: &Reservation, trigger: &Message, key: MarkerKey, term: &str) {
        if !self.escalated.insert(key) {
            debug!(reservation_id = reservation.id, message_id = trigger.id, "Escalation already reported");
            return;
        }

        warn!(
            reservation_id = reservation.id,
            message_id = trigger.id,
            term,
            "Sensitive message, escalating to a human"
        );
        self.notifier.notify(&format!(
            "⚠️ Messaggio sensibile da {} (prenotazione #{}, {}), serve una risposta umana.\nMessaggio: {}",
            reservation.guest_display_name(),
            reservation.id,
            reservation.apartment_name(),
            trigger.body
        ));
    }
}
