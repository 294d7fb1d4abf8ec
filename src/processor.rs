//! Event handling pipeline.
//!
//! One `handle` call covers a full message: validate, filter, fetch the
//! upstream entities, pick a formula, compute, persist. The boolean result
//! distinguishes "scored" from "filtered out"; both are handled outcomes and
//! both let the consumer commit the offset.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::info;

use crate::config::AppConfig;
use crate::error::ProcessorError;
use crate::gateway::SubmissionGateway;
use crate::models::{
    Challenge, EventPayload, InboundEvent, PhaseWindow, ReviewSummation, Submission,
};
use crate::scoring::{self, ranking, rdm, test_ratio, Classifier, ContestClass};

pub struct Processor<G> {
    gateway: G,
    config: Arc<AppConfig>,
}

impl<G: SubmissionGateway> Processor<G> {
    pub fn new(gateway: G, config: Arc<AppConfig>) -> Self {
        Self { gateway, config }
    }

    /// Handle one raw message body. `Ok(true)` means a summation was
    /// persisted, `Ok(false)` means the event was filtered out; errors mean
    /// the message must be seen again.
    pub async fn handle(&self, raw: Value) -> Result<bool, ProcessorError> {
        let event = InboundEvent::from_value(raw)?;

        let filter = &self.config.filter;
        if event.payload.resource != filter.payload_resource {
            info!(
                resource = %event.payload.resource,
                "skipping event for unrelated resource"
            );
            return Ok(false);
        }
        if !filter.payload_type_ids.contains(&event.payload.type_id) {
            info!(
                type_id = %event.payload.type_id,
                "skipping review of unrelated type"
            );
            return Ok(false);
        }

        let submission_id = event.payload.submission_id.clone();
        let submission = self.gateway.get_submission(&submission_id).await?;
        let challenge = self.gateway.get_challenge(&submission.challenge_id).await?;
        let window = phase_window(&challenge, &submission, &filter.submission_phase)?;

        let weights = &self.config.scoring;
        let classifier = Classifier::new(weights);
        let (aggregate_score, is_passing, metadata) =
            match classifier.classify(&challenge.tags) {
                ContestClass::Rdm(tier) => {
                    let metadata = self.review_metadata(&event.payload).await?;
                    let counts = test_ratio::extract_counts(metadata.as_ref()).ok_or_else(|| {
                        ProcessorError::Processing(format!(
                            "review for submission {submission_id} carries no test counts"
                        ))
                    })?;
                    let score = rdm::score(rdm::RdmInputs {
                        tests_passed: counts.passed,
                        total_tests: counts.total,
                        max_points: tier.max_points,
                        elapsed_ms: window.time_since_ms as f64,
                        tier_total_ms: tier.total_time_hours * 3_600_000.0,
                    });
                    let score = scoring::round_to(score, weights.score_decimals);
                    info!(tier = %tier.name, score, "scored RDM submission");
                    (score, true, metadata)
                }
                ContestClass::Ranking(tier) => {
                    let siblings = self
                        .gateway
                        .get_sibling_submissions(&submission.challenge_id)
                        .await?;
                    let score = ranking::score(&siblings, &submission, &tier.scores);
                    let score = scoring::round_to(score, weights.score_decimals);
                    info!(tier = %tier.name, score, "scored F2F submission");
                    (score, true, self.review_metadata(&event.payload).await?)
                }
                ContestClass::TestRatio => {
                    let metadata = self.review_metadata(&event.payload).await?;
                    match test_ratio::default_counts(metadata.as_ref()) {
                        None => {
                            // No tests block to score against: record a zero
                            // so the submission still shows up as reviewed.
                            info!("review carries no tests block, recording zero score");
                            (0.0, false, None)
                        }
                        Some(counts) => {
                            let (time_left_ms, total_time_ms) = window
                                .time_left_ms
                                .zip(window.total_time_ms)
                                .ok_or_else(|| {
                                    ProcessorError::Processing(format!(
                                        "phase {} has no scheduled end date",
                                        filter.submission_phase
                                    ))
                                })?;
                            let score = test_ratio::score(
                                counts,
                                time_left_ms as f64,
                                total_time_ms as f64,
                                weights.time_weight,
                            );
                            info!(score, "scored submission by test ratio");
                            (score, true, metadata)
                        }
                    }
                }
            };

        let summation = ReviewSummation {
            aggregate_score,
            is_passing,
            score_card_id: weights.score_card_id,
            submission_id: submission_id.clone(),
            metadata: metadata.unwrap_or_else(|| Value::Object(Default::default())),
        };
        self.gateway
            .upsert_review_summation(&submission_id, &summation)
            .await?;

        Ok(true)
    }

    /// Review metadata comes from the review endpoint when the event names a
    /// stored review, otherwise from the inline payload.
    async fn review_metadata(
        &self,
        payload: &EventPayload,
    ) -> Result<Option<Value>, ProcessorError> {
        match &payload.id {
            Some(review_id) => {
                let details = self.gateway.get_review_details(review_id).await?;
                Ok(details.metadata)
            }
            None => Ok(payload.extra.get("metadata").cloned()),
        }
    }
}

/// Locate the submission phase and position the submission within it.
/// Exactly one phase must carry the configured name, it must have started,
/// and the submission cannot predate the start.
pub fn phase_window(
    challenge: &Challenge,
    submission: &Submission,
    phase_name: &str,
) -> Result<PhaseWindow, ProcessorError> {
    let mut matches = challenge
        .phases
        .iter()
        .filter(|phase| phase.name == phase_name);
    let phase = match (matches.next(), matches.next()) {
        (Some(phase), None) => phase,
        (None, _) => {
            return Err(ProcessorError::Processing(format!(
                "challenge {} has no phase named {phase_name}",
                submission.challenge_id
            )))
        }
        (Some(_), Some(_)) => {
            return Err(ProcessorError::Processing(format!(
                "challenge {} has multiple phases named {phase_name}",
                submission.challenge_id
            )))
        }
    };

    let start = phase.actual_start_date.ok_or_else(|| {
        ProcessorError::Processing(format!("phase {phase_name} has not started"))
    })?;
    if submission.created < start {
        return Err(ProcessorError::Processing(format!(
            "submission {} predates the {phase_name} phase start",
            submission.id
        )));
    }

    let time_since_ms = millis_between(start, submission.created);
    let (time_left_ms, total_time_ms) = match phase.scheduled_end_date {
        Some(end) => (
            Some(millis_between(submission.created, end)),
            Some(millis_between(start, end)),
        ),
        None => (None, None),
    };

    Ok(PhaseWindow {
        time_since_ms,
        time_left_ms,
        total_time_ms,
    })
}

fn millis_between(from: DateTime<Utc>, to: DateTime<Utc>) -> i64 {
    (to - from).num_milliseconds()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Phase;

    fn at(value: &str) -> DateTime<Utc> {
        value.parse().unwrap()
    }

    fn phase(name: &str, start: Option<&str>, end: Option<&str>) -> Phase {
        Phase {
            name: name.to_string(),
            actual_start_date: start.map(at),
            scheduled_end_date: end.map(at),
        }
    }

    fn submission(created: &str) -> Submission {
        Submission {
            id: "sub-1".to_string(),
            challenge_id: "ch-1".to_string(),
            member_id: "m-1".to_string(),
            created: at(created),
        }
    }

    fn challenge(phases: Vec<Phase>) -> Challenge {
        Challenge {
            tags: Vec::new(),
            phases,
        }
    }

    #[test]
    fn window_is_measured_from_the_matching_phase() {
        let challenge = challenge(vec![
            phase("Registration", Some("2024-05-01T00:00:00Z"), None),
            phase(
                "Submission",
                Some("2024-05-04T00:00:00Z"),
                Some("2024-05-06T00:00:00Z"),
            ),
        ]);
        let window =
            phase_window(&challenge, &submission("2024-05-04T12:00:00Z"), "Submission").unwrap();
        assert_eq!(window.time_since_ms, 12 * 3_600_000);
        assert_eq!(window.time_left_ms, Some(36 * 3_600_000));
        assert_eq!(window.total_time_ms, Some(48 * 3_600_000));
    }

    #[test]
    fn missing_end_date_leaves_the_window_open() {
        let challenge = challenge(vec![phase(
            "Submission",
            Some("2024-05-04T00:00:00Z"),
            None,
        )]);
        let window =
            phase_window(&challenge, &submission("2024-05-04T06:00:00Z"), "Submission").unwrap();
        assert_eq!(window.time_since_ms, 6 * 3_600_000);
        assert_eq!(window.time_left_ms, None);
        assert_eq!(window.total_time_ms, None);
    }

    #[test]
    fn absent_phase_is_a_processing_error() {
        let challenge = challenge(vec![phase("Review", Some("2024-05-04T00:00:00Z"), None)]);
        let err = phase_window(&challenge, &submission("2024-05-04T06:00:00Z"), "Submission")
            .unwrap_err();
        assert!(matches!(err, ProcessorError::Processing(_)));
        assert!(err.to_string().contains("no phase named"));
    }

    #[test]
    fn duplicate_phases_are_a_processing_error() {
        let challenge = challenge(vec![
            phase("Submission", Some("2024-05-04T00:00:00Z"), None),
            phase("Submission", Some("2024-05-05T00:00:00Z"), None),
        ]);
        let err = phase_window(&challenge, &submission("2024-05-06T00:00:00Z"), "Submission")
            .unwrap_err();
        assert!(err.to_string().contains("multiple phases"));
    }

    #[test]
    fn unstarted_phase_is_a_processing_error() {
        let challenge = challenge(vec![phase("Submission", None, None)]);
        let err = phase_window(&challenge, &submission("2024-05-04T06:00:00Z"), "Submission")
            .unwrap_err();
        assert!(err.to_string().contains("has not started"));
    }

    #[test]
    fn submission_before_phase_start_is_a_processing_error() {
        let challenge = challenge(vec![phase("Submission", Some("2024-05-04T00:00:00Z"), None)]);
        let err = phase_window(&challenge, &submission("2024-05-03T23:59:59Z"), "Submission")
            .unwrap_err();
        assert!(err.to_string().contains("predates"));
    }
}
