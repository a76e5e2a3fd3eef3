use serde::{Deserialize, Serialize};

use crate::error::DialogueError;

pub const DEFAULT_FORM_TYPE: &str = "10-K";

/// Where a conversation attempt currently stands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Phase {
    /// Waiting for a free-text request (or a follow-up that fills a missing slot)
    #[default]
    AwaitingQuery,
    /// All required slots present; the next message is a yes/no reply
    AwaitingConfirmation,
    /// Slots locked, analysis request in flight
    Analyzing,
    /// Analysis returned; chat input is closed until a reset
    Completed,
    /// Feedback for the completed analysis has been stored
    FeedbackRecorded,
}

impl Phase {
    /// Phases in which the one analysis of this session has already returned.
    pub fn is_locked(&self) -> bool {
        matches!(self, Phase::Completed | Phase::FeedbackRecorded)
    }
}

/// User verdict on a completed analysis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(try_from = "u8", into = "u8")]
pub enum Rating {
    #[default]
    Unset = 0,
    Incorrect = 1,
    PartiallyCorrect = 2,
    Correct = 3,
}

impl Rating {
    pub fn label(&self) -> &'static str {
        match self {
            Rating::Unset => "unset",
            Rating::Incorrect => "incorrect",
            Rating::PartiallyCorrect => "partially correct",
            Rating::Correct => "correct",
        }
    }
}

impl TryFrom<u8> for Rating {
    type Error = DialogueError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Rating::Unset),
            1 => Ok(Rating::Incorrect),
            2 => Ok(Rating::PartiallyCorrect),
            3 => Ok(Rating::Correct),
            other => Err(DialogueError::InvalidRating(other)),
        }
    }
}

impl From<Rating> for u8 {
    fn from(rating: Rating) -> Self {
        rating as u8
    }
}

/// Slots returned by the extraction collaborator; every field may be absent
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedSlots {
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub form_type: Option<String>,
    #[serde(default)]
    pub year: Option<String>,
}

/// The single remote call a session may have outstanding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PendingCall {
    Extraction { query: String },
    Analysis { fallback_test_id: String },
    Feedback,
}

/// Transient notification bookkeeping
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationSlot {
    /// Id of the notification currently on screen
    pub active: Option<u64>,
    /// Last id handed out; survives resets so stale timers never match
    pub seq: u64,
}

impl NotificationSlot {
    pub fn next_id(&mut self) -> u64 {
        self.seq += 1;
        self.seq
    }
}

/// Slot store and lifecycle flags for one conversation attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    pub phase: Phase,
    pub company: Option<String>,
    pub form_type: String,
    pub year: Option<String>,
    pub query: String,
    pub confirmed: bool,
    pub test_id: Option<String>,
    pub rating: Rating,
    pub comment: String,
    pub query_completed: bool,
    pub pending: Option<PendingCall>,
    pub notification: NotificationSlot,
}

impl SessionState {
    pub fn new(default_form_type: impl Into<String>) -> Self {
        Self {
            phase: Phase::AwaitingQuery,
            company: None,
            form_type: default_form_type.into(),
            year: None,
            query: String::new(),
            confirmed: false,
            test_id: None,
            rating: Rating::Unset,
            comment: String::new(),
            query_completed: false,
            pending: None,
            notification: NotificationSlot::default(),
        }
    }

    /// A fresh instance that only inherits the notification id counter.
    pub fn reset(&self, default_form_type: &str) -> Self {
        let mut fresh = Self::new(default_form_type);
        fresh.notification.seq = self.notification.seq;
        fresh
    }

    pub fn input_enabled(&self) -> bool {
        !self.phase.is_locked() && !matches!(self.pending, Some(PendingCall::Analysis { .. }))
    }

    pub fn feedback_enabled(&self) -> bool {
        self.phase == Phase::Completed && self.test_id.is_some()
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new(DEFAULT_FORM_TYPE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_state_has_defaults() {
        let state = SessionState::default();
        assert_eq!(state.phase, Phase::AwaitingQuery);
        assert_eq!(state.form_type, "10-K");
        assert!(state.company.is_none());
        assert!(state.year.is_none());
        assert!(state.query.is_empty());
        assert!(!state.confirmed);
        assert!(!state.query_completed);
        assert_eq!(state.rating, Rating::Unset);
        assert!(state.input_enabled());
        assert!(!state.feedback_enabled());
    }

    #[test]
    fn rating_accepts_only_known_values() {
        for value in 0u8..=3 {
            let rating = Rating::try_from(value).unwrap();
            assert_eq!(u8::from(rating), value);
        }
        assert_eq!(Rating::try_from(4), Err(DialogueError::InvalidRating(4)));
    }

    #[test]
    fn rating_serializes_as_integer() {
        assert_eq!(serde_json::to_string(&Rating::Correct).unwrap(), "3");
        let rating: Rating = serde_json::from_str("2").unwrap();
        assert_eq!(rating, Rating::PartiallyCorrect);
        assert!(serde_json::from_str::<Rating>("7").is_err());
    }

    #[test]
    fn reset_keeps_notification_counter_only() {
        let mut state = SessionState::default();
        state.company = Some("Apple".to_string());
        state.test_id = Some("abc123".to_string());
        state.query_completed = true;
        state.phase = Phase::Completed;
        let id = state.notification.next_id();

        let fresh = state.reset(DEFAULT_FORM_TYPE);
        assert_eq!(fresh.phase, Phase::AwaitingQuery);
        assert!(fresh.company.is_none());
        assert!(fresh.test_id.is_none());
        assert!(!fresh.query_completed);
        assert_eq!(fresh.notification.seq, id);
        assert!(fresh.notification.active.is_none());
    }

    #[test]
    fn extracted_slots_use_camel_case() {
        let slots: ExtractedSlots =
            serde_json::from_str(r#"{"company":"Apple","formType":"10-Q"}"#).unwrap();
        assert_eq!(slots.company.as_deref(), Some("Apple"));
        assert_eq!(slots.form_type.as_deref(), Some("10-Q"));
        assert!(slots.year.is_none());
    }
}
