pub mod analysis;
pub mod clock;
pub mod collaborators;
pub mod confirmation;
pub mod error;
pub mod extraction;
pub mod feedback;
pub mod intent;
pub mod machine;
pub mod renderer;
pub mod runner;
pub mod scheduler;
pub mod session;
pub mod storage;

// Re-export commonly used types
pub use analysis::{AnalysisRequest, AnalysisResult};
pub use clock::{Clock, FixedClock, SystemClock};
pub use collaborators::{
    Collaborators, FeedbackReceipt, FeedbackStore, FilingAnalyzer, FilingExtractor,
};
#[cfg(feature = "http")]
pub use collaborators::HttpEndpoints;
pub use error::{DialogueError, Result};
pub use feedback::FeedbackSubmission;
pub use intent::{Effect, Event, Intent, Transition};
pub use machine::{DialogueConfig, DialogueMachine};
pub use renderer::{IntentOutbox, Renderer};
pub use runner::DialogueRunner;
pub use scheduler::{Expiry, NotificationScheduler};
pub use session::{ExtractedSlots, PendingCall, Phase, Rating, SessionState};
pub use storage::{InMemorySessionStorage, Session, SessionStorage};
