//! Parameter extraction adapter: slot merge and completeness check.
//!
//! The remote call itself lives behind [`crate::collaborators::FilingExtractor`];
//! this module only decides what an extraction result does to the session.

use tracing::{debug, info, warn};

use crate::{
    clock::Clock,
    intent::{Effect, Intent, Transition},
    session::{ExtractedSlots, PendingCall, Phase, SessionState},
};

pub const ASK_COMPANY: &str =
    "Which company's filing would you like me to analyze? Please mention the company name.";
pub const EXTRACTION_APOLOGY: &str =
    "Sorry, I had trouble understanding that request. Could you try asking again?";

/// Outcome of the completeness check after a merge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completeness {
    MissingCompany,
    MissingYear,
    Complete,
}

pub fn mentions_latest(text: &str) -> bool {
    text.to_lowercase().contains("latest")
}

fn present(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn four_digit_year(value: Option<String>) -> Option<String> {
    let year = present(value)?;
    if year.len() == 4 && year.chars().all(|c| c.is_ascii_digit()) {
        Some(year)
    } else {
        warn!(year = %year, "Ignoring extracted year that is not a four-digit year");
        None
    }
}

/// Merge an extraction result into the session.
///
/// Present values overwrite, absent ones keep whatever an earlier turn filled
/// in. A missing year becomes the current year only when the raw text asks
/// for the "latest" filing.
pub fn merge_slots(state: &mut SessionState, slots: ExtractedSlots, raw: &str, clock: &dyn Clock) {
    if let Some(company) = present(slots.company) {
        state.company = Some(company);
    }
    if let Some(form_type) = present(slots.form_type) {
        state.form_type = form_type;
    }
    match four_digit_year(slots.year) {
        Some(year) => state.year = Some(year),
        None if mentions_latest(raw) => {
            let year = clock.current_year();
            debug!(year = %year, "Synthesized year from 'latest'");
            state.year = Some(year);
        }
        None => {}
    }
    state.query = raw.to_string();
}

pub fn completeness(state: &SessionState) -> Completeness {
    if state.company.is_none() {
        Completeness::MissingCompany
    } else if state.year.is_none() {
        Completeness::MissingYear
    } else {
        Completeness::Complete
    }
}

pub fn ask_year(state: &SessionState) -> String {
    format!(
        "Which year's {} for {} should I look at? You can also ask for the latest one.",
        state.form_type,
        state.company.as_deref().unwrap_or("that company")
    )
}

pub fn confirmation_prompt(state: &SessionState) -> String {
    format!(
        "Let me make sure I have this right. You asked: \"{}\"\n\n\
         Company: {}\nYear: {}\nForm type: {}\n\n\
         Is that correct? (yes/no)",
        state.query,
        state.company.as_deref().unwrap_or_default(),
        state.year.as_deref().unwrap_or_default(),
        state.form_type
    )
}

/// A new request arrived while awaiting a query: hand it to the extractor.
pub(crate) fn begin(mut state: SessionState, text: &str) -> Transition {
    state.pending = Some(PendingCall::Extraction {
        query: text.to_string(),
    });
    Transition::new(state)
        .intent(Intent::AppendUserMessage {
            text: text.to_string(),
        })
        .intent(Intent::ShowLoading)
        .effect(Effect::Extract {
            query: text.to_string(),
        })
}

pub(crate) fn succeeded(
    mut state: SessionState,
    query: String,
    slots: ExtractedSlots,
    clock: &dyn Clock,
) -> Transition {
    state.pending = None;
    merge_slots(&mut state, slots, &query, clock);

    let transition = Transition::new(state).intent(Intent::HideLoading);
    match completeness(&transition.state) {
        Completeness::MissingCompany => {
            info!("Extraction incomplete: company missing");
            transition.intent(Intent::bot(ASK_COMPANY))
        }
        Completeness::MissingYear => {
            info!("Extraction incomplete: year missing");
            let prompt = ask_year(&transition.state);
            transition.intent(Intent::bot(prompt))
        }
        Completeness::Complete => {
            let mut transition = transition;
            transition.state.phase = Phase::AwaitingConfirmation;
            info!(
                company = ?transition.state.company,
                year = ?transition.state.year,
                form_type = %transition.state.form_type,
                "All slots present, awaiting confirmation"
            );
            let prompt = confirmation_prompt(&transition.state);
            transition.intent(Intent::bot(prompt))
        }
    }
}

pub(crate) fn failed(mut state: SessionState, reason: &str) -> Transition {
    warn!(error = %reason, "Extraction failed");
    state.pending = None;
    Transition::new(state)
        .intent(Intent::HideLoading)
        .intent(Intent::bot(EXTRACTION_APOLOGY))
}
