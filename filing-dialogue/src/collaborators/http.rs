use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, error};

use super::{FeedbackReceipt, FeedbackStore, FilingAnalyzer, FilingExtractor};
use crate::{
    analysis::{AnalysisRequest, AnalysisResult},
    error::{DialogueError, Result},
    feedback::FeedbackSubmission,
    session::ExtractedSlots,
};

/// Base URLs of the three backend services
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpEndpoints {
    pub extraction_url: String,
    pub analysis_url: String,
    pub feedback_url: String,
}

impl HttpEndpoints {
    /// All three services behind a single base URL.
    pub fn from_base(base_url: &str) -> Self {
        Self {
            extraction_url: base_url.to_string(),
            analysis_url: base_url.to_string(),
            feedback_url: base_url.to_string(),
        }
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    error: Option<String>,
}

fn endpoint(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path)
}

/// Turn a non-success response into a communication error, keeping the
/// server's `{error}` text when it sent one.
async fn non_success(service: &str, response: Response) -> DialogueError {
    let status = response.status();
    let detail = response
        .json::<ErrorBody>()
        .await
        .ok()
        .and_then(|body| body.error);
    error!(service, status = %status, detail = ?detail, "Backend returned non-success status");
    DialogueError::Communication(match detail {
        Some(detail) => format!("{service} returned {status}: {detail}"),
        None => format!("{service} returned {status}"),
    })
}

pub struct HttpExtractor {
    client: Client,
    url: String,
}

impl HttpExtractor {
    pub fn new(client: Client, base_url: &str) -> Self {
        Self {
            client,
            url: endpoint(base_url, "extract"),
        }
    }
}

#[async_trait]
impl FilingExtractor for HttpExtractor {
    async fn extract(&self, query: &str) -> Result<ExtractedSlots> {
        debug!(url = %self.url, "Calling extraction service");
        let response = self
            .client
            .post(&self.url)
            .json(&json!({ "query": query }))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(non_success("extraction", response).await);
        }
        Ok(response.json::<ExtractedSlots>().await?)
    }
}

pub struct HttpAnalyzer {
    client: Client,
    url: String,
}

impl HttpAnalyzer {
    pub fn new(client: Client, base_url: &str) -> Self {
        Self {
            client,
            url: endpoint(base_url, "analyze"),
        }
    }
}

#[async_trait]
impl FilingAnalyzer for HttpAnalyzer {
    async fn analyze(&self, request: &AnalysisRequest) -> Result<AnalysisResult> {
        debug!(url = %self.url, test_id = %request.test_id, "Calling analysis service");
        let response = self.client.post(&self.url).json(request).send().await?;
        if !response.status().is_success() {
            return Err(non_success("analysis", response).await);
        }
        Ok(response.json::<AnalysisResult>().await?)
    }
}

pub struct HttpFeedbackStore {
    client: Client,
    base_url: String,
}

impl HttpFeedbackStore {
    pub fn new(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, test_id: &str) -> String {
        format!("{}/feedback/{}", self.base_url, test_id)
    }
}

#[async_trait]
impl FeedbackStore for HttpFeedbackStore {
    async fn submit(&self, submission: &FeedbackSubmission) -> Result<FeedbackReceipt> {
        let url = self.url(&submission.test_id);
        debug!(url = %url, "Calling feedback service");
        let response = self.client.post(&url).json(submission).send().await?;
        let status = response.status();

        // Error responses from this backend still use the receipt shape.
        match response.json::<FeedbackReceipt>().await {
            Ok(receipt) if status.is_success() => Ok(receipt),
            Ok(receipt) => Ok(FeedbackReceipt {
                success: false,
                error: receipt.error,
            }),
            Err(e) if status.is_success() => Err(e.into()),
            Err(_) => {
                error!(status = %status, "Feedback service returned non-success status");
                Err(DialogueError::Communication(format!(
                    "feedback returned {status}"
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Rating;
    use axum::{
        Json, Router,
        extract::Path,
        http::StatusCode,
        routing::post,
    };
    use serde_json::Value;

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn extractor_posts_query_and_reads_slots() {
        let router = Router::new().route(
            "/extract",
            post(|Json(body): Json<Value>| async move {
                assert_eq!(body["query"], "Tell me about Microsoft's latest revenue");
                Json(serde_json::json!({ "company": "Microsoft" }))
            }),
        );
        let base = serve(router).await;
        let extractor = HttpExtractor::new(Client::new(), &format!("{base}/"));

        let slots = extractor
            .extract("Tell me about Microsoft's latest revenue")
            .await
            .unwrap();
        assert_eq!(slots.company.as_deref(), Some("Microsoft"));
        assert!(slots.form_type.is_none());
        assert!(slots.year.is_none());
    }

    #[tokio::test]
    async fn extractor_maps_server_error_to_communication_error() {
        let router = Router::new().route(
            "/extract",
            post(|| async { (StatusCode::BAD_GATEWAY, "upstream down") }),
        );
        let base = serve(router).await;
        let extractor = HttpExtractor::new(Client::new(), &base);

        let err = extractor.extract("anything").await.unwrap_err();
        assert!(matches!(err, DialogueError::Communication(_)));
    }

    #[tokio::test]
    async fn analyzer_sends_camel_case_request() {
        let router = Router::new().route(
            "/analyze",
            post(|Json(body): Json<Value>| async move {
                assert_eq!(body["formType"], "10-K");
                assert_eq!(body["testId"], "test-1");
                Json(serde_json::json!({
                    "analysis": "Risk summary",
                    "pdfPath": "filings/apple.pdf",
                    "id": "abc123"
                }))
            }),
        );
        let base = serve(router).await;
        let analyzer = HttpAnalyzer::new(Client::new(), &base);

        let result = analyzer
            .analyze(&AnalysisRequest {
                query: "q".into(),
                company: "Apple".into(),
                form_type: "10-K".into(),
                year: "2023".into(),
                test_id: "test-1".into(),
            })
            .await
            .unwrap();
        assert_eq!(result.id.as_deref(), Some("abc123"));
        assert_eq!(result.pdf_path, "filings/apple.pdf");
    }

    #[tokio::test]
    async fn analyzer_keeps_server_error_text() {
        let router = Router::new().route(
            "/analyze",
            post(|| async {
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(serde_json::json!({ "error": "filing not found" })),
                )
            }),
        );
        let base = serve(router).await;
        let analyzer = HttpAnalyzer::new(Client::new(), &base);

        let err = analyzer
            .analyze(&AnalysisRequest {
                query: "q".into(),
                company: "Apple".into(),
                form_type: "10-K".into(),
                year: "2023".into(),
                test_id: "test-1".into(),
            })
            .await
            .unwrap_err();
        match err {
            DialogueError::Communication(message) => assert!(message.contains("filing not found")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn feedback_is_scoped_by_test_id() {
        let router = Router::new().route(
            "/feedback/{test_id}",
            post(|Path(test_id): Path<String>, Json(body): Json<Value>| async move {
                assert_eq!(test_id, "abc123");
                assert_eq!(body["rating"], 3);
                assert_eq!(body["feedback"], "great");
                assert!(body.get("test_id").is_none());
                Json(serde_json::json!({ "success": true }))
            }),
        );
        let base = serve(router).await;
        let store = HttpFeedbackStore::new(Client::new(), &base);

        let receipt = store
            .submit(&FeedbackSubmission {
                test_id: "abc123".into(),
                feedback: "great".into(),
                rating: Rating::Correct,
            })
            .await
            .unwrap();
        assert!(receipt.success);
    }

    #[tokio::test]
    async fn feedback_error_body_is_reported() {
        let router = Router::new().route(
            "/feedback/{test_id}",
            post(|| async {
                (
                    StatusCode::BAD_REQUEST,
                    Json(serde_json::json!({ "success": false, "error": "unknown test id" })),
                )
            }),
        );
        let base = serve(router).await;
        let store = HttpFeedbackStore::new(Client::new(), &base);

        let receipt = store
            .submit(&FeedbackSubmission {
                test_id: "nope".into(),
                feedback: String::new(),
                rating: Rating::Unset,
            })
            .await
            .unwrap();
        assert!(!receipt.success);
        assert_eq!(receipt.error.as_deref(), Some("unknown test id"));
    }
}
