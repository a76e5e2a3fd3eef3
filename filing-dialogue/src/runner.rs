//! DialogueRunner: the controller that owns session state between turns.
//!
//! Each call loads the session, applies one event through the pure
//! [`DialogueMachine`], persists the result and hands the intents to the
//! [`Renderer`]. Effects are then carried out: remote calls are awaited and
//! their outcome is fed back as the next event, timers go to the
//! [`NotificationScheduler`].
//!
//! Load, step and save run under a per-session lock, and the pending marker
//! is saved before any remote call is issued. A concurrent request for the
//! same session therefore sees the marker and is ignored by the machine.
//! The lock is not held while a remote call is in flight.
//!
//! A turn runs on its own tokio task. If the caller goes away (an HTTP
//! client disconnecting mid-analysis), the remote call still completes and
//! its completion event is still applied. Every remote call is bounded by
//! [`DialogueConfig::call_timeout`](crate::DialogueConfig).

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::{collections::VecDeque, future::Future, sync::Arc};
use tokio::sync::Mutex;
use tracing::{Instrument, debug, info, warn};

use crate::{
    collaborators::Collaborators,
    error::{DialogueError, Result},
    intent::{Effect, Event},
    machine::DialogueMachine,
    renderer::Renderer,
    scheduler::{Expiry, NotificationScheduler},
    session::SessionState,
    storage::{Session, SessionStorage},
};

#[derive(Clone)]
pub struct DialogueRunner {
    machine: DialogueMachine,
    storage: Arc<dyn SessionStorage>,
    collaborators: Collaborators,
    renderer: Arc<dyn Renderer>,
    scheduler: NotificationScheduler,
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl DialogueRunner {
    pub fn new(
        machine: DialogueMachine,
        storage: Arc<dyn SessionStorage>,
        collaborators: Collaborators,
        renderer: Arc<dyn Renderer>,
        scheduler: NotificationScheduler,
    ) -> Self {
        Self {
            machine,
            storage,
            collaborators,
            renderer,
            scheduler,
            locks: Arc::new(DashMap::new()),
        }
    }

    pub fn machine(&self) -> &DialogueMachine {
        &self.machine
    }

    /// Create (or replace) a session with fresh state and render the greeting.
    pub async fn start_session(&self, session_id: &str) -> Result<Session> {
        let lock = self.session_lock(session_id);
        let _guard = lock.lock().await;

        let session = Session::new(session_id, self.machine.fresh_state());
        self.storage.save(session.clone()).await?;
        info!(session_id, "Session started");
        for intent in self.machine.greeting() {
            self.renderer.render(session_id, &intent);
        }
        Ok(session)
    }

    /// Drop a session and its lock. Timers still pending for it fire into
    /// the void and are ignored by [`handle_expiry`](Self::handle_expiry).
    pub async fn end_session(&self, session_id: &str) -> Result<()> {
        let lock = self.session_lock(session_id);
        let _guard = lock.lock().await;

        self.storage.delete(session_id).await?;
        self.locks.remove(session_id);
        info!(session_id, "Session ended");
        Ok(())
    }

    /// End the session only if it was last saved before `cutoff` and has no
    /// call in flight. Returns whether it was removed.
    pub async fn end_session_if_idle(
        &self,
        session_id: &str,
        cutoff: DateTime<Utc>,
    ) -> Result<bool> {
        let lock = self.session_lock(session_id);
        let _guard = lock.lock().await;

        let Some(session) = self.storage.get(session_id).await? else {
            self.locks.remove(session_id);
            return Ok(false);
        };
        if session.updated_at >= cutoff || session.state.is_pending() {
            return Ok(false);
        }
        self.storage.delete(session_id).await?;
        self.locks.remove(session_id);
        debug!(session_id, "Idle session evicted");
        Ok(true)
    }

    pub async fn session(&self, session_id: &str) -> Result<Session> {
        self.storage
            .get(session_id)
            .await?
            .ok_or_else(|| DialogueError::SessionNotFound(session_id.to_string()))
    }

    /// Apply `event` and everything it causes, returning the settled state.
    ///
    /// The work continues on a detached task when the returned future is
    /// dropped before it resolves.
    pub async fn dispatch(&self, session_id: &str, event: Event) -> Result<SessionState> {
        let span = tracing::info_span!("dispatch", session_id, event = event.name());
        let turn = self
            .clone()
            .settle(session_id.to_string(), event)
            .instrument(span);
        tokio::spawn(turn)
            .await
            .map_err(|e| DialogueError::Interrupted(e.to_string()))?
    }

    /// Feed a fired notification timer back into its session.
    pub async fn handle_expiry(&self, expiry: Expiry) -> Result<()> {
        match self
            .dispatch(
                &expiry.session_id,
                Event::NotificationExpired(expiry.notification_id),
            )
            .await
        {
            Ok(_) => Ok(()),
            Err(DialogueError::SessionNotFound(id)) => {
                debug!(session_id = %id, "Notification expired for a session that is gone");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn settle(self, session_id: String, event: Event) -> Result<SessionState> {
        let mut queue = VecDeque::from([event]);
        let mut state = None;

        while let Some(event) = queue.pop_front() {
            let (settled, effects) = self.apply(&session_id, event).await?;
            for effect in effects {
                if let Some(next) = self.perform(&session_id, effect).await {
                    queue.push_back(next);
                }
            }
            state = Some(settled);
        }

        state.ok_or(DialogueError::SessionNotFound(session_id))
    }

    /// One locked load, step, save and render cycle.
    async fn apply(&self, session_id: &str, event: Event) -> Result<(SessionState, Vec<Effect>)> {
        let lock = self.session_lock(session_id);
        let _guard = lock.lock().await;

        let Some(mut session) = self.storage.get(session_id).await? else {
            self.locks.remove(session_id);
            return Err(DialogueError::SessionNotFound(session_id.to_string()));
        };
        let transition = self.machine.step(session.state, event);
        session.state = transition.state;

        // Persist before any effect runs
        self.storage.save(session.clone()).await?;

        for intent in &transition.intents {
            self.renderer.render(session_id, intent);
        }
        Ok((session.state, transition.effects))
    }

    fn session_lock(&self, session_id: &str) -> Arc<Mutex<()>> {
        self.locks.entry(session_id.to_string()).or_default().clone()
    }

    async fn bounded<T>(&self, call: impl Future<Output = Result<T>>) -> Result<T> {
        let limit = self.machine.config().call_timeout;
        tokio::time::timeout(limit, call).await.map_err(|_| {
            DialogueError::Communication(format!("no response within {}ms", limit.as_millis()))
        })?
    }

    async fn perform(&self, session_id: &str, effect: Effect) -> Option<Event> {
        match effect {
            Effect::Extract { query } => {
                let outcome = self
                    .bounded(self.collaborators.extractor.extract(&query))
                    .await;
                Some(match outcome {
                    Ok(slots) => Event::ExtractionSucceeded(slots),
                    Err(e) => Event::ExtractionFailed(e.to_string()),
                })
            }
            Effect::Analyze(request) => {
                let outcome = self
                    .bounded(self.collaborators.analyzer.analyze(&request))
                    .await;
                Some(match outcome {
                    Ok(result) => Event::AnalysisSucceeded(result),
                    Err(e) => Event::AnalysisFailed(e.to_string()),
                })
            }
            Effect::SubmitFeedback(submission) => {
                let outcome = self
                    .bounded(self.collaborators.feedback.submit(&submission))
                    .await;
                Some(match outcome {
                    Ok(receipt) if receipt.success => Event::FeedbackSucceeded,
                    Ok(receipt) => Event::FeedbackFailed(receipt.error),
                    Err(e) => {
                        warn!(session_id, error = %e, "Feedback call failed");
                        Event::FeedbackFailed(None)
                    }
                })
            }
            Effect::ScheduleDismiss { id, after } => {
                self.scheduler.schedule(session_id, id, after);
                None
            }
            Effect::CancelDismiss { id } => {
                self.scheduler.cancel(session_id, id);
                None
            }
        }
    }
}
