use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

use super::types::{
    AnswerRequest, AnswerResponse, ConclusionResponse, EvaluateRequest, EvaluateResponse,
    ModuleResponse, OutcomeResponse, QuestionResponse, ResultsResponse, StartResponse,
    SubmitRequest, SubmitResponse, TreeResponse,
};
use crate::config::{RequestConfig, ServiceConfig};
use crate::error::{ServiceError, ServiceResult};

/// Client for the remote evaluation service.
///
/// Thin request/response mapping only: no retries, no state. Calls are
/// idempotent-safe, so retry policy belongs to the caller.
#[derive(Clone)]
pub struct EvaluationClient {
    client: Client,
    base_url: String,
    lang: Option<String>,
    request_config: RequestConfig,
}

impl EvaluationClient {
    /// Create a new evaluation service client
    pub fn new(config: &ServiceConfig, request_config: RequestConfig) -> ServiceResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(request_config.timeout_ms))
            .build()
            .map_err(ServiceError::Http)?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            lang: config.lang.clone(),
            request_config,
        })
    }

    /// Begin or resume a session; returns the session id and first module
    pub async fn start(&self) -> ServiceResult<StartResponse> {
        let url = format!("{}/start", self.base_url);
        self.execute("start", self.with_lang(self.client.post(&url)))
            .await
    }

    /// Fetch the full question tree for client-side traversal
    pub async fn fetch_tree(&self) -> ServiceResult<TreeResponse> {
        let url = format!("{}/tree", self.base_url);
        self.execute("tree", self.client.get(&url)).await
    }

    /// Fetch the full terminal result set
    pub async fn fetch_results(&self) -> ServiceResult<ResultsResponse> {
        let url = format!("{}/results", self.base_url);
        self.execute("results", self.client.get(&url)).await
    }

    /// Fetch a single question by id
    pub async fn fetch_question(&self, question_id: &str) -> ServiceResult<QuestionResponse> {
        let url = format!("{}/question/{}", self.base_url, question_id);
        self.execute("question", self.with_lang(self.client.get(&url)))
            .await
    }

    /// Fetch a module by id for an active session
    pub async fn fetch_module(
        &self,
        module_id: &str,
        session_id: &str,
    ) -> ServiceResult<ModuleResponse> {
        let url = format!("{}/module/{}", self.base_url, module_id);
        let req = self
            .client
            .get(&url)
            .query(&[("session_id", session_id)]);
        self.execute("module", self.with_lang(req)).await
    }

    /// Fetch a terminal result by id
    pub async fn fetch_outcome(&self, result_id: &str) -> ServiceResult<OutcomeResponse> {
        let url = format!("{}/result/{}", self.base_url, result_id);
        self.execute("result", self.with_lang(self.client.get(&url)))
            .await
    }

    /// Submit a single answer for server-side tree traversal
    pub async fn answer(&self, request: &AnswerRequest) -> ServiceResult<AnswerResponse> {
        let url = format!("{}/answer", self.base_url);
        self.execute("answer", self.client.post(&url).json(request))
            .await
    }

    /// Submit accumulated answers for a module
    pub async fn submit(&self, request: &SubmitRequest) -> ServiceResult<SubmitResponse> {
        let url = format!("{}/submit-answer", self.base_url);
        self.execute(
            "submit-answer",
            self.with_lang(self.client.post(&url).json(request)),
        )
        .await
    }

    /// Evaluate the complete answer map server-side
    pub async fn evaluate(&self, request: &EvaluateRequest) -> ServiceResult<EvaluateResponse> {
        let url = format!("{}/evaluate", self.base_url);
        self.execute("evaluate", self.client.post(&url).json(request))
            .await
    }

    /// Fetch the parameter-driven conclusion for a session
    pub async fn fetch_conclusion(&self, session_id: &str) -> ServiceResult<ConclusionResponse> {
        let url = format!("{}/result", self.base_url);
        let req = self
            .client
            .get(&url)
            .query(&[("session_id", session_id)]);
        self.execute("conclusion", self.with_lang(req)).await
    }

    /// Get the base URL (for testing)
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn with_lang(&self, req: RequestBuilder) -> RequestBuilder {
        match &self.lang {
            Some(lang) => req.query(&[("lang", lang.as_str())]),
            None => req,
        }
    }

    /// Execute a single request and decode the JSON body
    async fn execute<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        req: RequestBuilder,
    ) -> ServiceResult<T> {
        debug!(endpoint, "Calling evaluation service");
        let start = Instant::now();

        let response = req.send().await.map_err(|e| {
            let err = if e.is_timeout() {
                ServiceError::Timeout {
                    timeout_ms: self.request_config.timeout_ms,
                }
            } else if e.is_connect() || e.is_request() {
                ServiceError::Network {
                    message: e.to_string(),
                }
            } else {
                ServiceError::Http(e)
            };
            error!(endpoint, error = %err, "Evaluation service request failed");
            err
        })?;

        let status = response.status();
        let latency = start.elapsed();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let detail = if body.is_empty() { None } else { Some(body) };
            let err = ServiceError::Api {
                status: status.as_u16(),
                detail,
            };
            error!(
                endpoint,
                status = status.as_u16(),
                latency_ms = latency.as_millis() as u64,
                "Evaluation service returned error status"
            );
            return Err(err);
        }

        info!(
            endpoint,
            latency_ms = latency.as_millis() as u64,
            "Evaluation service call succeeded"
        );

        response
            .json()
            .await
            .map_err(|e| ServiceError::InvalidResponse {
                message: format!("Failed to parse response: {}", e),
            })
    }
}
