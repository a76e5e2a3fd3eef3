//! Confirmation gate between slot filling and analysis.

use tracing::info;

use crate::{
    analysis,
    clock::Clock,
    intent::{Intent, Transition},
    session::SessionState,
};

pub const RESTART_PROMPT: &str =
    "No problem, let's start over. What would you like to know about a company's filings?";

/// Classify a reply to the confirmation prompt.
///
/// Substring match on "yes" or "correct", ignoring case. Replies such as
/// "yes, but not the 10-K" therefore count as affirmative.
pub fn is_affirmative(reply: &str) -> bool {
    let reply = reply.to_lowercase();
    reply.contains("yes") || reply.contains("correct")
}

pub(crate) fn reply(
    state: SessionState,
    text: &str,
    default_form_type: &str,
    clock: &dyn Clock,
) -> Transition {
    let user = Intent::AppendUserMessage {
        text: text.to_string(),
    };

    if is_affirmative(text) {
        let mut state = state;
        state.confirmed = true;
        info!(
            company = ?state.company,
            year = ?state.year,
            form_type = %state.form_type,
            "Slots confirmed"
        );
        let mut transition = analysis::start(state, clock);
        transition.intents.insert(0, user);
        transition
    } else {
        info!("Confirmation declined, resetting session");
        Transition::new(state.reset(default_form_type))
            .intent(user)
            .intent(Intent::bot(RESTART_PROMPT))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        clock::FixedClock,
        intent::Effect,
        session::{DEFAULT_FORM_TYPE, Phase},
    };
    use proptest::prelude::*;

    fn confirmable() -> SessionState {
        let mut state = SessionState::default();
        state.company = Some("Apple".into());
        state.year = Some("2023".into());
        state.query = "Apple 2023 risks".into();
        state.phase = Phase::AwaitingConfirmation;
        state
    }

    #[test]
    fn classifier_matches_keywords_anywhere() {
        assert!(is_affirmative("yes"));
        assert!(is_affirmative("YES please"));
        assert!(is_affirmative("That's Correct"));
        assert!(is_affirmative("eyes"));
        assert!(is_affirmative("yes, but not the 10-K"));
        assert!(is_affirmative("that's not correct"));
        assert!(!is_affirmative("no"));
        assert!(!is_affirmative("yep"));
        assert!(!is_affirmative(""));
    }

    #[test]
    fn negative_reply_resets_everything() {
        let clock = FixedClock::from_millis(0);
        let transition = reply(confirmable(), "no", DEFAULT_FORM_TYPE, &clock);
        let state = &transition.state;
        assert_eq!(state.phase, Phase::AwaitingQuery);
        assert!(state.company.is_none());
        assert!(state.year.is_none());
        assert!(state.query.is_empty());
        assert!(!state.confirmed);
        assert!(transition.effects.is_empty());
        assert!(transition.intents.contains(&Intent::bot(RESTART_PROMPT)));
    }

    #[test]
    fn affirmative_reply_starts_analysis() {
        let clock = FixedClock::from_millis(1_700_000_000_123);
        let transition = reply(confirmable(), "Yes", DEFAULT_FORM_TYPE, &clock);
        assert!(transition.state.confirmed);
        assert_eq!(transition.state.phase, Phase::Analyzing);
        assert!(matches!(transition.effects.as_slice(), [Effect::Analyze(_)]));
        assert_eq!(
            transition.intents.first(),
            Some(&Intent::AppendUserMessage { text: "Yes".into() })
        );
    }

    proptest! {
        #[test]
        fn gate_advances_iff_keyword_present(reply_text in "\\PC{0,40}") {
            let clock = FixedClock::from_millis(0);
            let transition = reply(confirmable(), &reply_text, DEFAULT_FORM_TYPE, &clock);
            let lower = reply_text.to_lowercase();
            if lower.contains("yes") || lower.contains("correct") {
                prop_assert_eq!(transition.state.phase, Phase::Analyzing);
                prop_assert!(transition.state.confirmed);
            } else {
                prop_assert_eq!(transition.state, SessionState::default());
            }
        }
    }
}
