//! Remote services the dialogue depends on.
//!
//! The runner only sees these traits; [`http`] provides the JSON-over-HTTP
//! implementations used in production.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::{
    analysis::{AnalysisRequest, AnalysisResult},
    error::Result,
    feedback::FeedbackSubmission,
    session::ExtractedSlots,
};

#[cfg(feature = "http")]
pub mod http;

#[cfg(feature = "http")]
pub use http::{HttpAnalyzer, HttpEndpoints, HttpExtractor, HttpFeedbackStore};

/// Turns free text into company / form type / year slots
#[async_trait]
pub trait FilingExtractor: Send + Sync {
    async fn extract(&self, query: &str) -> Result<ExtractedSlots>;
}

/// Runs the filing analysis for a confirmed slot set
#[async_trait]
pub trait FilingAnalyzer: Send + Sync {
    async fn analyze(&self, request: &AnalysisRequest) -> Result<AnalysisResult>;
}

/// Answer of the feedback backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackReceipt {
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
}

/// Persists feedback for a completed analysis
#[async_trait]
pub trait FeedbackStore: Send + Sync {
    async fn submit(&self, submission: &FeedbackSubmission) -> Result<FeedbackReceipt>;
}

/// The three collaborators a runner talks to
#[derive(Clone)]
pub struct Collaborators {
    pub extractor: Arc<dyn FilingExtractor>,
    pub analyzer: Arc<dyn FilingAnalyzer>,
    pub feedback: Arc<dyn FeedbackStore>,
}

impl Collaborators {
    pub fn new(
        extractor: Arc<dyn FilingExtractor>,
        analyzer: Arc<dyn FilingAnalyzer>,
        feedback: Arc<dyn FeedbackStore>,
    ) -> Self {
        Self {
            extractor,
            analyzer,
            feedback,
        }
    }

    #[cfg(feature = "http")]
    pub fn http(endpoints: HttpEndpoints) -> Self {
        let client = reqwest::Client::new();
        Self::new(
            Arc::new(HttpExtractor::new(client.clone(), &endpoints.extraction_url)),
            Arc::new(HttpAnalyzer::new(client.clone(), &endpoints.analysis_url)),
            Arc::new(HttpFeedbackStore::new(client, &endpoints.feedback_url)),
        )
    }
}
