use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::{
    analysis::{AnalysisRequest, AnalysisResult},
    feedback::FeedbackSubmission,
    session::{ExtractedSlots, Rating, SessionState},
};

/// Presentation signal for whatever surface renders the conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Intent {
    AppendUserMessage { text: String },
    AppendBotMessage { text: String },
    ShowLoading,
    HideLoading,
    ShowDocument { reference: String },
    HideDocument,
    EnableInput,
    DisableInput,
    ShowFeedback,
    HideFeedback,
    ShowNewQuery,
    HideNewQuery,
    RatingSelected { rating: Rating },
    ShowAlert { text: String },
    ShowNotification { id: u64, text: String },
    DismissNotification { id: u64 },
}

impl Intent {
    pub fn bot(text: impl Into<String>) -> Self {
        Intent::AppendBotMessage { text: text.into() }
    }
}

/// Work the runner performs on behalf of the machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    Extract { query: String },
    Analyze(AnalysisRequest),
    SubmitFeedback(FeedbackSubmission),
    ScheduleDismiss { id: u64, after: Duration },
    CancelDismiss { id: u64 },
}

/// Inputs to the state machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    UserMessage(String),
    ExtractionSucceeded(ExtractedSlots),
    ExtractionFailed(String),
    AnalysisSucceeded(AnalysisResult),
    AnalysisFailed(String),
    SelectRating(Rating),
    EditComment(String),
    SubmitFeedback,
    FeedbackSucceeded,
    FeedbackFailed(Option<String>),
    NewQuery,
    NotificationExpired(u64),
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::UserMessage(_) => "user_message",
            Event::ExtractionSucceeded(_) => "extraction_succeeded",
            Event::ExtractionFailed(_) => "extraction_failed",
            Event::AnalysisSucceeded(_) => "analysis_succeeded",
            Event::AnalysisFailed(_) => "analysis_failed",
            Event::SelectRating(_) => "select_rating",
            Event::EditComment(_) => "edit_comment",
            Event::SubmitFeedback => "submit_feedback",
            Event::FeedbackSucceeded => "feedback_succeeded",
            Event::FeedbackFailed(_) => "feedback_failed",
            Event::NewQuery => "new_query",
            Event::NotificationExpired(_) => "notification_expired",
        }
    }
}

/// Result of one step: the next state plus everything it asks the outside world to do
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub state: SessionState,
    pub intents: Vec<Intent>,
    pub effects: Vec<Effect>,
}

impl Transition {
    /// Start from `state` with nothing to show and nothing to do.
    pub fn new(state: SessionState) -> Self {
        Self {
            state,
            intents: Vec::new(),
            effects: Vec::new(),
        }
    }

    pub fn intent(mut self, intent: Intent) -> Self {
        self.intents.push(intent);
        self
    }

    pub fn effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }

    pub fn is_noop(&self) -> bool {
        self.intents.is_empty() && self.effects.is_empty()
    }
}
