//! Feedback collector for a completed analysis.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::{
    error::DialogueError,
    intent::{Effect, Intent, Transition},
    session::{PendingCall, Phase, Rating, SessionState},
};

pub const FEEDBACK_THANKS: &str = "Thank you for your feedback!";
pub const FEEDBACK_GENERIC_ERROR: &str = "Could not submit feedback. Please try again.";

/// Feedback payload bound to the analysis it rates
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackSubmission {
    #[serde(skip)]
    pub test_id: String,
    pub feedback: String,
    pub rating: Rating,
}

pub(crate) fn select_rating(mut state: SessionState, rating: Rating) -> Transition {
    if !state.feedback_enabled() || state.is_pending() {
        debug!("Rating ignored, feedback surface not active");
        return Transition::new(state);
    }
    if state.rating == rating {
        return Transition::new(state);
    }
    state.rating = rating;
    Transition::new(state).intent(Intent::RatingSelected { rating })
}

pub(crate) fn edit_comment(mut state: SessionState, comment: String) -> Transition {
    if !state.feedback_enabled() || state.is_pending() {
        debug!("Comment ignored, feedback surface not active");
        return Transition::new(state);
    }
    state.comment = comment;
    Transition::new(state)
}

pub(crate) fn submit(mut state: SessionState) -> Transition {
    let Some(test_id) = state.test_id.clone() else {
        let err = DialogueError::Precondition(
            "there is no completed analysis to attach feedback to".to_string(),
        );
        warn!(error = %err, "Feedback submitted without a test id");
        return Transition::new(state).intent(Intent::ShowAlert {
            text: err.to_string(),
        });
    };
    if !state.feedback_enabled() || state.is_pending() {
        debug!(test_id = %test_id, "Feedback submit ignored");
        return Transition::new(state);
    }

    state.pending = Some(PendingCall::Feedback);
    let submission = FeedbackSubmission {
        test_id,
        feedback: state.comment.clone(),
        rating: state.rating,
    };
    info!(
        test_id = %submission.test_id,
        rating = u8::from(submission.rating),
        "Submitting feedback"
    );
    Transition::new(state).effect(Effect::SubmitFeedback(submission))
}

pub(crate) fn succeeded(mut state: SessionState, notification_ttl: Duration) -> Transition {
    state.pending = None;
    state.rating = Rating::Unset;
    state.comment.clear();
    state.phase = Phase::FeedbackRecorded;
    info!(test_id = ?state.test_id, "Feedback recorded");

    let mut transition = Transition::new(state).intent(Intent::HideFeedback);
    if let Some(previous) = transition.state.notification.active.take() {
        transition = transition
            .intent(Intent::DismissNotification { id: previous })
            .effect(Effect::CancelDismiss { id: previous });
    }
    let id = transition.state.notification.next_id();
    transition.state.notification.active = Some(id);
    transition
        .intent(Intent::ShowNotification {
            id,
            text: FEEDBACK_THANKS.to_string(),
        })
        .effect(Effect::ScheduleDismiss {
            id,
            after: notification_ttl,
        })
}

pub(crate) fn failed(mut state: SessionState, error: Option<String>) -> Transition {
    state.pending = None;
    let text = error
        .filter(|e| !e.trim().is_empty())
        .unwrap_or_else(|| FEEDBACK_GENERIC_ERROR.to_string());
    warn!(error = %text, "Feedback submission failed");
    Transition::new(state).intent(Intent::ShowAlert { text })
}

pub(crate) fn notification_expired(mut state: SessionState, id: u64) -> Transition {
    if state.notification.active != Some(id) {
        debug!(notification_id = id, "Stale notification timer");
        return Transition::new(state);
    }
    state.notification.active = None;
    Transition::new(state).intent(Intent::DismissNotification { id })
}
