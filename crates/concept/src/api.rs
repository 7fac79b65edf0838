use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::ApiConfig;
use crate::error::TransportError;
use crate::sse::decode_events;
use crate::steps::StepKey;
use crate::transport::{
    AnalysisRequest, AnalysisTransport, AppCreator, CreateAppRequest, CreatedApp, EventStream,
    SessionInfo,
};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

// --- Request/response bodies ---

#[derive(Serialize)]
struct AnalyzeBody<'a> {
    input: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    session_id: Option<&'a str>,
}

#[derive(Serialize)]
struct StatusBody<'a> {
    status: &'a str,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// HTTP client for the analysis and app services.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    app_id: String,
    token: Option<String>,
}

impl ApiClient {
    pub fn new(config: &ApiConfig) -> Result<Self, TransportError> {
        // No total timeout: it would cut long streams. The read timeout
        // bounds the gap between chunks instead.
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .read_timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            app_id: config.app_id.clone(),
            token: Some(config.token.clone()).filter(|t| !t.is_empty()),
        })
    }

    fn analyze_url(&self) -> String {
        format!(
            "{}/apps/{}/game-requirements/analyze",
            self.base_url, self.app_id
        )
    }

    fn session_url(&self, session_id: &str) -> String {
        format!(
            "{}/apps/{}/game-requirements/sessions/{}",
            self.base_url, self.app_id, session_id
        )
    }

    fn apps_url(&self) -> String {
        format!("{}/apps", self.base_url)
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }
}

/// Turn a non-success response into a typed error, logging whatever
/// explanation the server put in the body.
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, TransportError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let url = response.url().clone();
    let body = response.text().await.unwrap_or_default();
    let detail = serde_json::from_str::<ErrorBody>(&body)
        .ok()
        .and_then(|b| b.error.or(b.message))
        .unwrap_or(body);
    warn!("HTTP {} from {url}: {detail}", status.as_u16());
    Err(TransportError::from_status(status.as_u16()))
}

impl AnalysisTransport for ApiClient {
    async fn submit(&self, request: AnalysisRequest) -> Result<EventStream, TransportError> {
        let body = AnalyzeBody {
            input: &request.input,
            session_id: request.session_id.as_deref(),
        };
        debug!(
            "Submitting analysis turn ({} chars, session {:?})",
            request.input.len(),
            request.session_id
        );

        let response = self
            .authorized(self.http.post(self.analyze_url()))
            .json(&body)
            .send()
            .await?;
        let response = check_status(response).await?;

        Ok(decode_events(response.bytes_stream()))
    }

    async fn fetch_session(&self, session_id: &str) -> Result<SessionInfo, TransportError> {
        let response = self
            .authorized(self.http.get(self.session_url(session_id)))
            .send()
            .await?;
        let response = check_status(response).await?;
        Ok(response.json().await?)
    }

    async fn update_status(&self, session_id: &str, phase: StepKey) -> Result<(), TransportError> {
        let response = self
            .authorized(self.http.put(self.session_url(session_id)))
            .json(&StatusBody {
                status: phase.as_str(),
            })
            .send()
            .await?;
        check_status(response).await?;
        info!("Session {session_id} advanced to {phase}");
        Ok(())
    }

    async fn discard_session(&self, session_id: &str) -> Result<(), TransportError> {
        let response = self
            .authorized(self.http.delete(self.session_url(session_id)))
            .send()
            .await?;
        check_status(response).await?;
        info!("Session {session_id} deleted");
        Ok(())
    }
}

impl AppCreator for ApiClient {
    async fn create_app(&self, request: CreateAppRequest) -> Result<CreatedApp, TransportError> {
        let response = self
            .authorized(self.http.post(self.apps_url()))
            .json(&request)
            .send()
            .await?;
        let response = check_status(response).await?;
        let app: CreatedApp = response.json().await?;
        info!(
            "Created app {} ({})",
            app.id,
            app.name.as_deref().unwrap_or(&request.name)
        );
        Ok(app)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base_url: &str, token: &str) -> ApiClient {
        ApiClient::new(&ApiConfig {
            base_url: base_url.into(),
            app_id: "app-1".into(),
            token: token.into(),
            timeout_secs: 5,
        })
        .unwrap()
    }

    #[test]
    fn urls_follow_the_service_layout() {
        let c = client("http://localhost:5001/console/api/", "");
        assert_eq!(
            c.analyze_url(),
            "http://localhost:5001/console/api/apps/app-1/game-requirements/analyze"
        );
        assert_eq!(
            c.session_url("s1"),
            "http://localhost:5001/console/api/apps/app-1/game-requirements/sessions/s1"
        );
        assert_eq!(c.apps_url(), "http://localhost:5001/console/api/apps");
    }

    #[test]
    fn empty_token_means_no_auth_header() {
        assert!(client("http://x", "").token.is_none());
        assert_eq!(client("http://x", "t0k").token.as_deref(), Some("t0k"));
    }

    #[test]
    fn analyze_body_omits_absent_session() {
        let body = AnalyzeBody {
            input: "Make an RPG",
            session_id: None,
        };
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            serde_json::json!({ "input": "Make an RPG" })
        );
        let body = AnalyzeBody {
            input: "More",
            session_id: Some("s1"),
        };
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            serde_json::json!({ "input": "More", "session_id": "s1" })
        );
    }
}
