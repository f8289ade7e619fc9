//! Triage policy - decides how to answer the latest message on a reservation
//!
//! Order is fixed: nothing to answer, then escalation, then canned replies,
//! then generation. Sensitive content must never get an automated reply.

use crate::booking::{Message, Reservation};
use crate::config::{Config, PARKING_REPLY_EN, PARKING_REPLY_IT};
use crate::filters::{contains_any_keyword, SensitiveTermSet};
use crate::flags::FlagSet;
use std::collections::HashSet;

/// Why no reply is due
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    NoMessages,
    HostHasLastWord,
}

/// Outcome of triage for one reservation in one cycle (never persisted)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriageDecision {
    Ignore(IgnoreReason),
    Escalate { term: String },
    CannedReply(String),
    GenerateReply,
}

impl TriageDecision {
    /// Whether this decision leads to an outbound message
    pub fn replies(&self) -> bool {
        matches!(self, TriageDecision::CannedReply(_) | TriageDecision::GenerateReply)
    }

    pub fn label(&self) -> &'static str {
        match self {
            TriageDecision::Ignore(_) => "ignore",
            TriageDecision::Escalate { .. } => "escalate",
            TriageDecision::CannedReply(_) => "canned_reply",
            TriageDecision::GenerateReply => "generate_reply",
        }
    }
}

/// Reply language, taken from the reservation's upstream language field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    Italian,
    English,
}

impl Language {
    /// Missing, blank and Italian codes mean Italian; every other code gets English
    pub fn from_code(code: Option<&str>) -> Self {
        let code = code.map(|c| c.trim().to_lowercase()).unwrap_or_default();
        if code.is_empty() || code == "it" || code.starts_with("it-") || code.starts_with("it_") {
            Language::Italian
        } else {
            Language::English
        }
    }

    pub fn parking_reply(self) -> &'static str {
        match self {
            Language::Italian => PARKING_REPLY_IT,
            Language::English => PARKING_REPLY_EN,
        }
    }
}

/// Inputs to triage that stay fixed for the process lifetime
#[derive(Debug, Clone, Default)]
pub struct TriagePolicy {
    pub sensitive: SensitiveTermSet,
    pub parking_apartments: HashSet<String>,
    pub parking_keywords: Vec<String>,
    pub human_resolved: HashSet<i64>,
}

impl TriagePolicy {
    pub fn new(config: &Config, sensitive: SensitiveTermSet, flags: &FlagSet) -> Self {
        Self {
            sensitive,
            parking_apartments: config.parking_apartments.iter().cloned().collect(),
            parking_keywords: config.parking_keywords.clone(),
            human_resolved: flags.human_resolved_ids.clone(),
        }
    }

    /// Decide for `reservation` given its thread, newest message first
    pub fn decide(&self, reservation: &Reservation, messages: &[Message]) -> TriageDecision {
        let Some(latest) = messages.first() else {
            return TriageDecision::Ignore(IgnoreReason::NoMessages);
        };

        if !latest.is_from_guest() {
            return TriageDecision::Ignore(IgnoreReason::HostHasLastWord);
        }

        if !self.human_resolved.contains(&reservation.id) {
            if let Some(term) = self.sensitive.matched_term(&latest.body) {
                return TriageDecision::Escalate {
                    term: term.to_string(),
                };
            }
        }

        if self.parking_apartments.contains(reservation.apartment_name())
            && contains_any_keyword(&latest.body, &self.parking_keywords)
        {
            let language = Language::from_code(reservation.language.as_deref());
            return TriageDecision::CannedReply(language.parking_reply().to_string());
        }

        TriageDecision::GenerateReply
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::booking::Apartment;
    use crate::config::{DEFAULT_PARKING_APARTMENTS, DEFAULT_PARKING_KEYWORDS};

    fn policy() -> TriagePolicy {
        TriagePolicy {
            sensitive: SensitiveTermSet::from_terms(&["refund", "unacceptable"], &[r"\bpolizia\b"]),
            parking_apartments: DEFAULT_PARKING_APARTMENTS.iter().map(|s| s.to_string()).collect(),
            parking_keywords: DEFAULT_PARKING_KEYWORDS.iter().map(|s| s.to_string()).collect(),
            human_resolved: HashSet::new(),
        }
    }

    fn reservation(id: i64, apartment: &str, language: Option<&str>) -> Reservation {
        Reservation {
            id,
            guest_name: Some("Guest".to_string()),
            apartment: Some(Apartment {
                id: Some(1),
                name: apartment.to_string(),
            }),
            arrival: None,
            departure: None,
            language: language.map(|l| l.to_string()),
            created_at: None,
        }
    }

    fn message(id: i64, message_type: i64, body: &str) -> Message {
        Message {
            id,
            message_type,
            body: body.to_string(),
            subject: None,
            created_at: None,
        }
    }

    #[test]
    fn test_no_messages_ignored() {
        let decision = policy().decide(&reservation(102, "B1 Suite 1", None), &[]);
        assert_eq!(decision, TriageDecision::Ignore(IgnoreReason::NoMessages));
        assert!(!decision.replies());
    }

    #[test]
    fn test_host_last_word_ignored() {
        let messages = [message(2, 2, "See you soon"), message(1, 1, "refund now")];
        let decision = policy().decide(&reservation(1, "B1 Suite 1", None), &messages);
        assert_eq!(decision, TriageDecision::Ignore(IgnoreReason::HostHasLastWord));
    }

    #[test]
    fn test_parking_canned_reply_english() {
        let messages = [message(1, 1, "Is there parking nearby?")];
        let decision = policy().decide(&reservation(100, "B1 Suite 1", Some("en")), &messages);
        assert_eq!(decision, TriageDecision::CannedReply(PARKING_REPLY_EN.to_string()));
    }

    #[test]
    fn test_parking_canned_reply_defaults_italian() {
        let messages = [message(1, 1, "Is there parking nearby?")];
        for language in [None, Some(""), Some("it"), Some("IT")] {
            let decision = policy().decide(&reservation(100, "D Mercanti", language), &messages);
            assert_eq!(decision, TriageDecision::CannedReply(PARKING_REPLY_IT.to_string()));
        }
    }

    #[test]
    fn test_parking_canned_reply_other_languages_english() {
        let messages = [message(1, 1, "Wo kann ich das Auto parken? parking")];
        for language in ["de", "fr", "es"] {
            let decision = policy().decide(&reservation(100, "D Mercanti", Some(language)), &messages);
            assert_eq!(decision, TriageDecision::CannedReply(PARKING_REPLY_EN.to_string()));
        }
    }

    #[test]
    fn test_parking_outside_enabled_apartments_generates() {
        let messages = [message(1, 1, "Where to park the car?")];
        let decision = policy().decide(&reservation(100, "Some Other Flat", Some("en")), &messages);
        assert_eq!(decision, TriageDecision::GenerateReply);
    }

    #[test]
    fn test_sensitive_escalates() {
        let messages = [message(1, 1, "I want a refund, this is unacceptable")];
        let decision = policy().decide(&reservation(101, "B1 Suite 1", None), &messages);
        assert_eq!(
            decision,
            TriageDecision::Escalate {
                term: "refund".to_string()
            }
        );
    }

    #[test]
    fn test_escalation_beats_parking() {
        let messages = [message(1, 1, "The parking was unacceptable")];
        let decision = policy().decide(&reservation(101, "B1 Suite 1", None), &messages);
        assert!(matches!(decision, TriageDecision::Escalate { .. }));
    }

    #[test]
    fn test_human_resolved_skips_escalation() {
        let mut policy = policy();
        policy.human_resolved.insert(101);
        let messages = [message(1, 1, "Thanks for the refund, where can I park the car?")];
        let decision = policy.decide(&reservation(101, "B1 Suite 1", Some("en")), &messages);
        assert_eq!(decision, TriageDecision::CannedReply(PARKING_REPLY_EN.to_string()));
    }

    #[test]
    fn test_generic_question_generates() {
        let messages = [message(1, 1, "What time is check-in?")];
        let decision = policy().decide(&reservation(1, "B1 Suite 1", None), &messages);
        assert_eq!(decision, TriageDecision::GenerateReply);
        assert_eq!(decision.label(), "generate_reply");
    }

    #[test]
    fn test_language_codes() {
        assert_eq!(Language::from_code(Some("EN")), Language::English);
        assert_eq!(Language::from_code(Some("en-GB")), Language::English);
        assert_eq!(Language::from_code(Some("eng")), Language::English);
        assert_eq!(Language::from_code(Some("fr")), Language::English);
        assert_eq!(Language::from_code(Some(" it ")), Language::Italian);
        assert_eq!(Language::from_code(Some("it-CH")), Language::Italian);
        assert_eq!(Language::from_code(Some("  ")), Language::Italian);
        assert_eq!(Language::from_code(None), Language::Italian);
    }
}
