use dashmap::DashMap;
use std::sync::Arc;

use crate::intent::Intent;

/// Applies presentation intents to some surface (browser, terminal, test recorder)
pub trait Renderer: Send + Sync {
    fn render(&self, session_id: &str, intent: &Intent);
}

/// Buffers intents per session until the surface collects them.
///
/// The HTTP service drains it after each request; anything produced later
/// (notification dismissals) waits here for the next poll.
#[derive(Clone, Default)]
pub struct IntentOutbox {
    queues: Arc<DashMap<String, Vec<Intent>>>,
}

impl IntentOutbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn drain(&self, session_id: &str) -> Vec<Intent> {
        self.queues
            .remove(session_id)
            .map(|(_, intents)| intents)
            .unwrap_or_default()
    }
}

impl Renderer for IntentOutbox {
    fn render(&self, session_id: &str, intent: &Intent) {
        self.queues
            .entry(session_id.to_string())
            .or_default()
            .push(intent.clone());
    }
}
