//! Wire types for inbound events and upstream API entities.
//!
//! Everything here is transient: rebuilt per message, never cached across
//! messages. Durability of the events themselves is the bus's concern.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::ProcessorError;

/// One bus message, schema-validated.
#[derive(Debug, Clone, Deserialize)]
pub struct InboundEvent {
    pub topic: String,
    pub originator: String,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "mime-type")]
    pub mime_type: String,
    pub payload: EventPayload,
}

/// Event payload. Required fields are typed; everything else is preserved
/// in `extra` so review fields like `metadata` pass through untouched.
#[derive(Debug, Clone, Deserialize)]
pub struct EventPayload {
    pub resource: String,
    #[serde(rename = "typeId")]
    pub type_id: String,
    #[serde(rename = "submissionId")]
    pub submission_id: String,
    /// Review identifier; present when the event references a stored review.
    #[serde(default)]
    pub id: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl InboundEvent {
    /// Parse and validate a raw message body. The only source of
    /// `Validation` errors; fires before any network call is made.
    pub fn from_value(raw: Value) -> Result<Self, ProcessorError> {
        let event: InboundEvent = serde_json::from_value(raw)
            .map_err(|err| ProcessorError::Validation(err.to_string()))?;

        for (field, value) in [
            ("topic", &event.topic),
            ("originator", &event.originator),
            ("mime-type", &event.mime_type),
            ("payload.resource", &event.payload.resource),
            ("payload.typeId", &event.payload.type_id),
            ("payload.submissionId", &event.payload.submission_id),
        ] {
            if value.trim().is_empty() {
                return Err(ProcessorError::Validation(format!(
                    "{field} must not be empty"
                )));
            }
        }

        Ok(event)
    }
}

/// Submission details as fetched from the upstream API.
#[derive(Debug, Clone, Deserialize)]
pub struct Submission {
    pub id: String,
    #[serde(rename = "challengeId", deserialize_with = "string_or_number")]
    pub challenge_id: String,
    #[serde(rename = "memberId", deserialize_with = "string_or_number")]
    pub member_id: String,
    pub created: DateTime<Utc>,
}

/// Challenge details; only tags and phases drive scoring.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Challenge {
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub phases: Vec<Phase>,
}

/// One challenge lifecycle phase.
#[derive(Debug, Clone, Deserialize)]
pub struct Phase {
    pub name: String,
    #[serde(rename = "actualStartDate", default)]
    pub actual_start_date: Option<DateTime<Utc>>,
    #[serde(rename = "scheduledEndDate", default)]
    pub scheduled_end_date: Option<DateTime<Utc>>,
}

/// Review details; only the metadata blob matters for scoring.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReviewDetails {
    #[serde(default)]
    pub metadata: Option<Value>,
}

/// The computed scoring outcome persisted upstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewSummation {
    pub aggregate_score: f64,
    pub is_passing: bool,
    pub score_card_id: u64,
    pub submission_id: String,
    pub metadata: Value,
}

/// Existing summation record returned by the query endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct ExistingSummation {
    pub id: String,
}

/// Time window of the submission phase relative to the submission, in
/// milliseconds. End-date-dependent values are absent when the phase has no
/// scheduled end date.
#[derive(Debug, Clone, Copy)]
pub struct PhaseWindow {
    pub time_since_ms: i64,
    pub time_left_ms: Option<i64>,
    pub total_time_ms: Option<i64>,
}

// Legacy challenge and member ids arrive as JSON numbers; newer records use
// strings. Normalize both to `String`.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(value) => Ok(value),
        Value::Number(value) => Ok(value.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number, got {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn valid_event() -> Value {
        json!({
            "topic": "submission.notification.create",
            "originator": "submission-api",
            "timestamp": "2024-05-04T12:00:00Z",
            "mime-type": "application/json",
            "payload": {
                "resource": "review",
                "typeId": "e6ca06fe-bec5-41bb-afac-636860fb39a7",
                "submissionId": "sub-1",
                "id": "review-1",
                "score": 92.5,
                "metadata": { "tests": { "total": 10, "passed": 9 } }
            }
        })
    }

    #[test]
    fn valid_event_parses_and_preserves_unknown_payload_fields() {
        let event = InboundEvent::from_value(valid_event()).unwrap();
        assert_eq!(event.payload.submission_id, "sub-1");
        assert_eq!(event.payload.id.as_deref(), Some("review-1"));
        assert_eq!(event.payload.extra.get("score"), Some(&json!(92.5)));
        assert!(event.payload.extra.contains_key("metadata"));
    }

    #[test]
    fn missing_topic_is_rejected() {
        let mut raw = valid_event();
        raw.as_object_mut().unwrap().remove("topic");
        let err = InboundEvent::from_value(raw).unwrap_err();
        assert!(matches!(err, ProcessorError::Validation(_)));
    }

    #[test]
    fn empty_resource_is_rejected() {
        let mut raw = valid_event();
        raw["payload"]["resource"] = json!("");
        let err = InboundEvent::from_value(raw).unwrap_err();
        assert!(err.to_string().contains("payload.resource"));
    }

    #[test]
    fn malformed_timestamp_is_rejected() {
        let mut raw = valid_event();
        raw["timestamp"] = json!("yesterday");
        assert!(InboundEvent::from_value(raw).is_err());
    }

    #[test]
    fn numeric_ids_normalize_to_strings() {
        let submission: Submission = serde_json::from_value(json!({
            "id": "sub-1",
            "challengeId": 30052924,
            "memberId": 8547899,
            "created": "2024-05-04T12:00:00Z"
        }))
        .unwrap();
        assert_eq!(submission.challenge_id, "30052924");
        assert_eq!(submission.member_id, "8547899");
    }

    #[test]
    fn review_summation_serializes_camel_case() {
        let summation = ReviewSummation {
            aggregate_score: 87.5,
            is_passing: true,
            score_card_id: 30001850,
            submission_id: "sub-1".to_string(),
            metadata: json!({}),
        };
        let value = serde_json::to_value(&summation).unwrap();
        assert_eq!(value["aggregateScore"], json!(87.5));
        assert_eq!(value["isPassing"], json!(true));
        assert_eq!(value["scoreCardId"], json!(30001850));
    }
}
