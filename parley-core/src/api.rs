//! REST collaborators around the live session.
//!
//! Session setup, evaluation, and feedback retrieval happen over plain
//! HTTP; only the interview itself runs on the WebSocket. The feedback
//! report shape varies with the evaluator, so it is kept as raw JSON.

use serde::{Deserialize, Serialize};

use crate::error::{ParleyError, Result};

#[derive(Debug, Clone, Serialize)]
pub struct StartInterviewRequest {
    pub candidate_name: String,
    pub company: String,
    pub position: String,
    pub question_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StartInterviewResponse {
    pub session_id: String,
    pub questions_count: u32,
    pub status: String,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InterviewStatusResponse {
    pub session_id: String,
    pub status: String,
    pub phase: String,
    pub current_question: u32,
    pub total_questions: u32,
    pub progress_percent: f32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EvaluateResponse {
    pub session_id: String,
    pub status: String,
    #[serde(default)]
    pub message: Option<String>,
}

pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    /// `base_url` is the HTTP origin, e.g. `http://localhost:8000`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_owned(),
        }
    }

    pub async fn start_interview(
        &self,
        request: &StartInterviewRequest,
    ) -> Result<StartInterviewResponse> {
        let url = format!("{}/api/interviews/start", self.base_url);
        let response = self.http.post(&url).json(request).send().await?;
        Self::parse(response).await
    }

    pub async fn status(&self, session_id: &str) -> Result<InterviewStatusResponse> {
        let url = format!("{}/api/interviews/{session_id}/status", self.base_url);
        let response = self.http.get(&url).send().await?;
        Self::parse(response).await
    }

    pub async fn evaluate(&self, session_id: &str) -> Result<EvaluateResponse> {
        let url = format!("{}/api/interviews/{session_id}/evaluate", self.base_url);
        let response = self.http.post(&url).send().await?;
        Self::parse(response).await
    }

    /// Feedback reports have no stable schema; callers pick out the fields
    /// they understand.
    pub async fn feedback(&self, session_id: &str) -> Result<serde_json::Value> {
        let url = format!("{}/api/interviews/{session_id}/feedback", self.base_url);
        let response = self.http.get(&url).send().await?;
        Self::parse(response).await
    }

    /// Non-2xx responses become `ParleyError::Api` carrying the body, which
    /// the backend fills with a human-readable detail message.
    async fn parse<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ParleyError::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response.json::<T>().await?)
    }
}
