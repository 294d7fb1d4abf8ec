//! Upstream data gateway.
//!
//! Wraps the outbound REST calls the scoring pipeline needs. Pure
//! request/response; no state beyond the shared token provider.

use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::auth::M2mTokenProvider;
use crate::config::UpstreamApiConfig;
use crate::error::ProcessorError;
use crate::models::{Challenge, ExistingSummation, ReviewDetails, ReviewSummation, Submission};

/// Operations the scoring pipeline needs from the upstream REST API.
#[async_trait]
pub trait SubmissionGateway: Send + Sync {
    async fn get_submission(&self, submission_id: &str) -> Result<Submission, ProcessorError>;

    /// Resolve a challenge; fails unless exactly one record matches.
    async fn get_challenge(&self, challenge_id: &str) -> Result<Challenge, ProcessorError>;

    /// All submissions to a challenge; fails when the result set is empty.
    async fn get_sibling_submissions(
        &self,
        challenge_id: &str,
    ) -> Result<Vec<Submission>, ProcessorError>;

    async fn get_review_details(&self, review_id: &str) -> Result<ReviewDetails, ProcessorError>;

    /// Create or fully replace the summation for a submission. At most one
    /// summation exists per submission id.
    async fn upsert_review_summation(
        &self,
        submission_id: &str,
        summation: &ReviewSummation,
    ) -> Result<(), ProcessorError>;
}

/// reqwest-backed gateway using the templated upstream URLs from config.
pub struct HttpGateway {
    client: reqwest::Client,
    urls: UpstreamApiConfig,
    tokens: Arc<M2mTokenProvider>,
}

impl HttpGateway {
    pub fn new(urls: UpstreamApiConfig, tokens: Arc<M2mTokenProvider>) -> Self {
        Self {
            client: reqwest::Client::new(),
            urls,
            tokens,
        }
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        endpoint: &'static str,
        url: &str,
    ) -> Result<T, ProcessorError> {
        let token = self.tokens.token().await?;
        let response = self
            .client
            .get(url)
            .bearer_auth(token)
            .header("Accept", "application/json")
            .send()
            .await?;
        decode(endpoint, response).await
    }
}

async fn decode<T: DeserializeOwned>(
    endpoint: &'static str,
    response: reqwest::Response,
) -> Result<T, ProcessorError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ProcessorError::upstream_status(
            endpoint,
            status.as_u16(),
            &body,
        ));
    }
    response.json().await.map_err(|err| {
        ProcessorError::Upstream(format!("{endpoint} returned a malformed body: {err}"))
    })
}

/// Substitute a `{placeholder}` segment in a URL template.
fn expand(template: &str, placeholder: &str, value: &str) -> String {
    template.replace(&format!("{{{placeholder}}}"), value)
}

#[async_trait]
impl SubmissionGateway for HttpGateway {
    async fn get_submission(&self, submission_id: &str) -> Result<Submission, ProcessorError> {
        let url = expand(&self.urls.submission_url, "submissionId", submission_id);
        self.get_json("submission details", &url).await
    }

    async fn get_challenge(&self, challenge_id: &str) -> Result<Challenge, ProcessorError> {
        let url = expand(&self.urls.challenge_url, "challengeId", challenge_id);
        let mut matches: Vec<Challenge> = self.get_json("challenge details", &url).await?;
        if matches.len() != 1 {
            return Err(ProcessorError::Upstream(format!(
                "challenge {challenge_id} resolved to {} records, expected exactly one",
                matches.len()
            )));
        }
        Ok(matches.remove(0))
    }

    async fn get_sibling_submissions(
        &self,
        challenge_id: &str,
    ) -> Result<Vec<Submission>, ProcessorError> {
        let url = expand(
            &self.urls.challenge_submissions_url,
            "challengeId",
            challenge_id,
        );
        let submissions: Vec<Submission> = self.get_json("challenge submissions", &url).await?;
        if submissions.is_empty() {
            return Err(ProcessorError::Upstream(format!(
                "challenge {challenge_id} has no submissions"
            )));
        }
        Ok(submissions)
    }

    async fn get_review_details(&self, review_id: &str) -> Result<ReviewDetails, ProcessorError> {
        let url = expand(&self.urls.review_url, "reviewId", review_id);
        self.get_json("review details", &url).await
    }

    async fn upsert_review_summation(
        &self,
        submission_id: &str,
        summation: &ReviewSummation,
    ) -> Result<(), ProcessorError> {
        let query_url = expand(
            &self.urls.review_summation_query_url,
            "submissionId",
            submission_id,
        );
        let existing: Vec<ExistingSummation> =
            self.get_json("review summation query", &query_url).await?;

        let token = self.tokens.token().await?;
        let response = match existing.first() {
            None => {
                debug!(submission_id, "creating review summation");
                self.client
                    .post(&self.urls.review_summation_create_url)
                    .bearer_auth(token)
                    .json(summation)
                    .send()
                    .await?
            }
            Some(record) => {
                debug!(
                    submission_id,
                    summation_id = %record.id,
                    "updating existing review summation"
                );
                let url = expand(
                    &self.urls.review_summation_update_url,
                    "reviewSummationId",
                    &record.id,
                );
                self.client
                    .put(&url)
                    .bearer_auth(token)
                    .json(summation)
                    .send()
                    .await?
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProcessorError::upstream_status(
                "review summation save",
                status.as_u16(),
                &body,
            ));
        }
        Ok(())
    }
}
