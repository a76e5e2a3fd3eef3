//! Analysis orchestrator: one analysis request per confirmed session.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{
    clock::Clock,
    intent::{Effect, Intent, Transition},
    session::{PendingCall, Phase, SessionState},
};

pub const ANALYSIS_ACK: &str = "Great, I'm analyzing that filing now. This can take a moment.";
pub const ANALYSIS_APOLOGY: &str =
    "Sorry, something went wrong while analyzing the filing. Please send your request again.";

/// Body of the remote analysis call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRequest {
    pub query: String,
    pub company: String,
    pub form_type: String,
    pub year: String,
    pub test_id: String,
}

/// Successful analysis response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub analysis: String,
    pub pdf_path: String,
    #[serde(default)]
    pub id: Option<String>,
}

pub fn fallback_test_id(clock: &dyn Clock) -> String {
    format!("test-{}", clock.timestamp_millis())
}

pub(crate) fn start(mut state: SessionState, clock: &dyn Clock) -> Transition {
    let fallback = fallback_test_id(clock);
    let request = AnalysisRequest {
        query: state.query.clone(),
        company: state.company.clone().unwrap_or_default(),
        form_type: state.form_type.clone(),
        year: state.year.clone().unwrap_or_default(),
        test_id: fallback.clone(),
    };

    state.phase = Phase::Analyzing;
    state.pending = Some(PendingCall::Analysis {
        fallback_test_id: fallback,
    });

    info!(test_id = %request.test_id, company = %request.company, "Issuing analysis request");

    Transition::new(state)
        .intent(Intent::bot(ANALYSIS_ACK))
        .intent(Intent::DisableInput)
        .intent(Intent::ShowLoading)
        .effect(Effect::Analyze(request))
}

pub(crate) fn succeeded(
    mut state: SessionState,
    fallback_test_id: String,
    result: AnalysisResult,
) -> Transition {
    let server_id = result.id.filter(|id| !id.trim().is_empty());
    if state.test_id.is_none() {
        state.test_id = Some(server_id.unwrap_or(fallback_test_id));
    }
    state.pending = None;
    state.query_completed = true;
    state.phase = Phase::Completed;

    info!(test_id = ?state.test_id, pdf_path = %result.pdf_path, "Analysis completed");

    Transition::new(state)
        .intent(Intent::HideLoading)
        .intent(Intent::bot(result.analysis))
        .intent(Intent::ShowDocument {
            reference: result.pdf_path,
        })
        .intent(Intent::DisableInput)
        .intent(Intent::ShowNewQuery)
        .intent(Intent::ShowFeedback)
}

/// The slots are unlocked again; the next message goes back through extraction.
pub(crate) fn failed(mut state: SessionState, reason: &str) -> Transition {
    warn!(error = %reason, "Analysis failed");
    state.pending = None;
    state.confirmed = false;
    state.phase = Phase::AwaitingQuery;

    Transition::new(state)
        .intent(Intent::HideLoading)
        .intent(Intent::EnableInput)
        .intent(Intent::bot(ANALYSIS_APOLOGY))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;

    fn analyzing() -> (SessionState, String) {
        let clock = FixedClock::from_millis(1_700_000_000_123);
        let mut state = SessionState::default();
        state.company = Some("Apple".into());
        state.year = Some("2023".into());
        state.query = "What are Apple's risk factors in their 2023 10-K?".into();
        state.confirmed = true;
        let transition = start(state, &clock);
        (transition.state, fallback_test_id(&clock))
    }

    fn result(id: Option<&str>) -> AnalysisResult {
        AnalysisResult {
            analysis: "Key risks include supply chain concentration.".into(),
            pdf_path: "filings/apple_10-K_2023.pdf".into(),
            id: id.map(String::from),
        }
    }

    #[test]
    fn start_builds_request_with_fallback_id() {
        let clock = FixedClock::from_millis(1_700_000_000_123);
        let mut state = SessionState::default();
        state.company = Some("Apple".into());
        state.year = Some("2023".into());
        state.query = "q".into();
        let transition = start(state, &clock);

        assert_eq!(
            transition.effects,
            vec![Effect::Analyze(AnalysisRequest {
                query: "q".into(),
                company: "Apple".into(),
                form_type: "10-K".into(),
                year: "2023".into(),
                test_id: "test-1700000000123".into(),
            })]
        );
        assert!(transition.intents.contains(&Intent::DisableInput));
        assert!(!transition.state.input_enabled());
    }

    #[test]
    fn success_adopts_server_id() {
        let (state, fallback) = analyzing();
        let transition = succeeded(state, fallback, result(Some("abc123")));
        assert_eq!(transition.state.test_id.as_deref(), Some("abc123"));
        assert!(transition.state.query_completed);
        assert_eq!(transition.state.phase, Phase::Completed);
        assert!(transition.intents.contains(&Intent::ShowDocument {
            reference: "filings/apple_10-K_2023.pdf".into()
        }));
        assert!(transition.state.feedback_enabled());
    }

    #[test]
    fn success_without_server_id_keeps_fallback() {
        let (state, fallback) = analyzing();
        let transition = succeeded(state, fallback, result(Some("")));
        assert_eq!(transition.state.test_id.as_deref(), Some("test-1700000000123"));
    }

    #[test]
    fn failure_reopens_input() {
        let (state, _) = analyzing();
        let transition = failed(state, "500 Internal Server Error");
        assert!(!transition.state.query_completed);
        assert_eq!(transition.state.phase, Phase::AwaitingQuery);
        assert!(transition.state.input_enabled());
        assert!(transition.intents.contains(&Intent::EnableInput));
        assert!(transition.intents.contains(&Intent::bot(ANALYSIS_APOLOGY)));
    }

    #[test]
    fn result_reads_pdf_path_field() {
        let parsed: AnalysisResult =
            serde_json::from_str(r#"{"analysis":"text","pdfPath":"a.pdf"}"#).unwrap();
        assert_eq!(parsed.pdf_path, "a.pdf");
        assert!(parsed.id.is_none());
    }
}
