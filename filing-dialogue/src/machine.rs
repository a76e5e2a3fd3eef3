use std::{sync::Arc, time::Duration};
use tracing::{debug, info, warn};

use crate::{
    analysis,
    clock::{Clock, SystemClock},
    confirmation, extraction, feedback,
    intent::{Effect, Event, Intent, Transition},
    session::{DEFAULT_FORM_TYPE, PendingCall, Phase, SessionState},
};

pub const GREETING: &str = "Hi! Ask me about a company's SEC filing, for example: \
     \"What are Apple's risk factors in their 2023 10-K?\"";

/// Tunables of the dialogue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialogueConfig {
    /// Form type assumed when extraction does not name one
    pub default_form_type: String,
    /// How long the feedback acknowledgement stays on screen
    pub notification_ttl: Duration,
    /// Upper bound on a single extraction, analysis or feedback call
    pub call_timeout: Duration,
}

impl Default for DialogueConfig {
    fn default() -> Self {
        Self {
            default_form_type: DEFAULT_FORM_TYPE.to_string(),
            notification_ttl: Duration::from_millis(3000),
            call_timeout: Duration::from_secs(120),
        }
    }
}

/// Pure transition function over [`SessionState`].
///
/// `step` never performs I/O: remote calls and timers come back as
/// [`Effect`]s, and what the user should see comes back as [`Intent`]s.
#[derive(Clone)]
pub struct DialogueMachine {
    config: DialogueConfig,
    clock: Arc<dyn Clock>,
}

impl DialogueMachine {
    pub fn new(config: DialogueConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: DialogueConfig, clock: Arc<dyn Clock>) -> Self {
        Self { config, clock }
    }

    pub fn config(&self) -> &DialogueConfig {
        &self.config
    }

    pub fn fresh_state(&self) -> SessionState {
        SessionState::new(self.config.default_form_type.clone())
    }

    /// Intents shown when a session is first opened.
    pub fn greeting(&self) -> Vec<Intent> {
        vec![Intent::EnableInput, Intent::bot(GREETING)]
    }

    pub fn step(&self, state: SessionState, event: Event) -> Transition {
        debug!(event = event.name(), phase = ?state.phase, "Dialogue step");
        match event {
            Event::UserMessage(text) => self.user_message(state, text),
            Event::ExtractionSucceeded(slots) => match state.pending.clone() {
                Some(PendingCall::Extraction { query }) => {
                    extraction::succeeded(state, query, slots, self.clock.as_ref())
                }
                other => unexpected(state, "extraction_succeeded", other),
            },
            Event::ExtractionFailed(reason) => match state.pending.clone() {
                Some(PendingCall::Extraction { .. }) => extraction::failed(state, &reason),
                other => unexpected(state, "extraction_failed", other),
            },
            Event::AnalysisSucceeded(result) => match state.pending.clone() {
                Some(PendingCall::Analysis { fallback_test_id }) => {
                    analysis::succeeded(state, fallback_test_id, result)
                }
                other => unexpected(state, "analysis_succeeded", other),
            },
            Event::AnalysisFailed(reason) => match state.pending.clone() {
                Some(PendingCall::Analysis { .. }) => analysis::failed(state, &reason),
                other => unexpected(state, "analysis_failed", other),
            },
            Event::SelectRating(rating) => feedback::select_rating(state, rating),
            Event::EditComment(comment) => feedback::edit_comment(state, comment),
            Event::SubmitFeedback => feedback::submit(state),
            Event::FeedbackSucceeded => match state.pending.clone() {
                Some(PendingCall::Feedback) => {
                    feedback::succeeded(state, self.config.notification_ttl)
                }
                other => unexpected(state, "feedback_succeeded", other),
            },
            Event::FeedbackFailed(error) => match state.pending.clone() {
                Some(PendingCall::Feedback) => feedback::failed(state, error),
                other => unexpected(state, "feedback_failed", other),
            },
            Event::NewQuery => self.new_query(state),
            Event::NotificationExpired(id) => feedback::notification_expired(state, id),
        }
    }

    fn user_message(&self, state: SessionState, text: String) -> Transition {
        if text.trim().is_empty() {
            return Transition::new(state);
        }
        if let Some(pending) = &state.pending {
            debug!(pending = ?pending, "Message ignored while a call is outstanding");
            return Transition::new(state);
        }
        match state.phase {
            Phase::AwaitingQuery => extraction::begin(state, &text),
            Phase::AwaitingConfirmation => confirmation::reply(
                state,
                &text,
                &self.config.default_form_type,
                self.clock.as_ref(),
            ),
            Phase::Analyzing | Phase::Completed | Phase::FeedbackRecorded => {
                info!(phase = ?state.phase, "Chat input closed for this session");
                Transition::new(state)
            }
        }
    }

    fn new_query(&self, state: SessionState) -> Transition {
        if state.is_pending() {
            debug!("New query ignored while a call is outstanding");
            return Transition::new(state);
        }
        info!(test_id = ?state.test_id, "Starting a new query");

        let active = state.notification.active;
        let mut transition = Transition::new(state.reset(&self.config.default_form_type))
            .intent(Intent::HideDocument)
            .intent(Intent::HideFeedback)
            .intent(Intent::HideNewQuery)
            .intent(Intent::EnableInput);
        if let Some(id) = active {
            transition = transition
                .intent(Intent::DismissNotification { id })
                .effect(Effect::CancelDismiss { id });
        }
        transition.intent(Intent::bot(GREETING))
    }
}

impl Default for DialogueMachine {
    fn default() -> Self {
        Self::new(DialogueConfig::default())
    }
}

fn unexpected(state: SessionState, event: &str, pending: Option<PendingCall>) -> Transition {
    warn!(event, pending = ?pending, "Completion event does not match the outstanding call");
    Transition::new(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        analysis::AnalysisResult,
        clock::FixedClock,
        session::{ExtractedSlots, Rating},
    };

    // 2025-06-15T12:00:00Z
    const NOW_MS: i64 = 1_749_988_800_000;

    fn machine() -> DialogueMachine {
        DialogueMachine::with_clock(
            DialogueConfig::default(),
            Arc::new(FixedClock::from_millis(NOW_MS)),
        )
    }

    fn drive(machine: &DialogueMachine, state: SessionState, events: Vec<Event>) -> SessionState {
        events
            .into_iter()
            .fold(state, |state, event| machine.step(state, event).state)
    }

    fn completed(machine: &DialogueMachine) -> SessionState {
        drive(
            machine,
            machine.fresh_state(),
            vec![
                Event::UserMessage("Apple 2023 10-K risks".into()),
                Event::ExtractionSucceeded(ExtractedSlots {
                    company: Some("Apple".into()),
                    form_type: Some("10-K".into()),
                    year: Some("2023".into()),
                }),
                Event::UserMessage("yes".into()),
                Event::AnalysisSucceeded(AnalysisResult {
                    analysis: "analysis".into(),
                    pdf_path: "apple.pdf".into(),
                    id: Some("abc123".into()),
                }),
            ],
        )
    }

    #[test]
    fn message_in_awaiting_query_requests_extraction() {
        let machine = machine();
        let transition = machine.step(machine.fresh_state(), Event::UserMessage("Apple".into()));
        assert_eq!(
            transition.effects,
            vec![Effect::Extract { query: "Apple".into() }]
        );
        assert!(transition.state.is_pending());
    }

    #[test]
    fn second_message_while_extracting_is_ignored() {
        let machine = machine();
        let state = machine.step(machine.fresh_state(), Event::UserMessage("Apple".into())).state;
        let transition = machine.step(state.clone(), Event::UserMessage("Microsoft".into()));
        assert!(transition.is_noop());
        assert_eq!(transition.state, state);
    }

    #[test]
    fn blank_message_is_ignored() {
        let machine = machine();
        let transition = machine.step(machine.fresh_state(), Event::UserMessage("   ".into()));
        assert!(transition.is_noop());
    }

    #[test]
    fn completed_session_ignores_chat_input() {
        let machine = machine();
        let state = completed(&machine);
        assert!(state.query_completed);
        let transition = machine.step(state.clone(), Event::UserMessage("Now do Microsoft".into()));
        assert!(transition.is_noop());
        assert_eq!(transition.state, state);
    }

    #[test]
    fn stray_completion_events_change_nothing() {
        let machine = machine();
        let state = machine.fresh_state();
        for event in [
            Event::ExtractionFailed("late".into()),
            Event::AnalysisFailed("late".into()),
            Event::FeedbackSucceeded,
            Event::FeedbackFailed(None),
        ] {
            let transition = machine.step(state.clone(), event);
            assert!(transition.is_noop());
            assert_eq!(transition.state, state);
        }
    }

    #[test]
    fn new_query_resets_completed_session() {
        let machine = machine();
        let state = completed(&machine);
        let transition = machine.step(state, Event::NewQuery);
        assert_eq!(transition.state, machine.fresh_state());
        assert!(transition.intents.contains(&Intent::EnableInput));
        assert!(transition.intents.contains(&Intent::HideDocument));
    }

    #[test]
    fn new_query_cancels_pending_notification() {
        let machine = machine();
        let state = drive(
            &machine,
            completed(&machine),
            vec![
                Event::SelectRating(Rating::Correct),
                Event::SubmitFeedback,
                Event::FeedbackSucceeded,
            ],
        );
        assert_eq!(state.notification.active, Some(1));

        let transition = machine.step(state, Event::NewQuery);
        assert_eq!(transition.effects, vec![Effect::CancelDismiss { id: 1 }]);
        assert!(transition.state.notification.active.is_none());
        assert_eq!(transition.state.notification.seq, 1);
    }

    #[test]
    fn test_id_is_stable_across_feedback() {
        let machine = machine();
        let state = drive(
            &machine,
            completed(&machine),
            vec![
                Event::SelectRating(Rating::Incorrect),
                Event::SubmitFeedback,
                Event::FeedbackFailed(Some("boom".into())),
                Event::SubmitFeedback,
                Event::FeedbackSucceeded,
                Event::SubmitFeedback,
            ],
        );
        assert_eq!(state.test_id.as_deref(), Some("abc123"));
        assert_eq!(state.phase, Phase::FeedbackRecorded);
        assert!(state.pending.is_none());
    }
}
