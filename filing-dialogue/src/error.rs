use thiserror::Error;

/// Errors raised by the dialogue core and its collaborators
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DialogueError {
    /// A remote collaborator (extraction, analysis or feedback) failed or
    /// answered with a non-success status.
    #[error("Communication error: {0}")]
    Communication(String),

    #[error("Precondition failed: {0}")]
    Precondition(String),

    #[error("Invalid rating: {0} (expected 0, 1, 2 or 3)")]
    InvalidRating(u8),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// The task driving a dialogue turn panicked or was cancelled.
    #[error("Dialogue turn interrupted: {0}")]
    Interrupted(String),
}

pub type Result<T> = std::result::Result<T, DialogueError>;

#[cfg(feature = "http")]
impl From<reqwest::Error> for DialogueError {
    fn from(err: reqwest::Error) -> Self {
        DialogueError::Communication(err.to_string())
    }
}
