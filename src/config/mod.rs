//! Configuration loading for the aggregate scorer.
//!
//! Loads layered `.env` files and environment variables prefixed with
//! `SCORER_`, producing a typed [`AppConfig`].

use std::{collections::BTreeMap, env, path::PathBuf};

use serde::Serialize;
use thiserror::Error;

/// Application configuration derived from `SCORER_*` environment variables.
#[derive(Debug, Clone, Serialize)]
pub struct AppConfig {
    pub profile: String,
    pub api_bind_addr: String,
    pub log_level: String,
    pub log_format: String,
    pub kafka: KafkaConfig,
    pub auth: AuthConfig,
    pub api: UpstreamApiConfig,
    pub filter: EventFilterConfig,
    pub scoring: ScoringConfig,
}

/// Message bus connection settings.
#[derive(Debug, Clone, Serialize)]
pub struct KafkaConfig {
    pub url: String,
    pub group_id: String,
    pub topics: Vec<String>,
    /// PEM client certificate for secured brokers; optional for local use.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_cert: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_key: Option<String>,
}

/// Machine-to-machine token endpoint settings.
#[derive(Debug, Clone, Serialize)]
pub struct AuthConfig {
    pub token_url: String,
    pub audience: String,
    pub client_id: String,
    pub client_secret: String,
    pub token_cache_secs: u64,
}

/// Templated URLs of the upstream REST surface. `{placeholder}` segments
/// are substituted at call time.
#[derive(Debug, Clone, Serialize)]
pub struct UpstreamApiConfig {
    pub submission_url: String,
    pub challenge_url: String,
    pub challenge_submissions_url: String,
    pub review_url: String,
    pub review_summation_query_url: String,
    pub review_summation_create_url: String,
    pub review_summation_update_url: String,
}

/// Which events are of interest and which phase anchors the time window.
#[derive(Debug, Clone, Serialize)]
pub struct EventFilterConfig {
    pub payload_resource: String,
    pub payload_type_ids: Vec<String>,
    pub submission_phase: String,
}

/// Scoring formula parameters.
#[derive(Debug, Clone, Serialize)]
pub struct ScoringConfig {
    pub score_card_id: u64,
    pub score_decimals: u32,
    /// Weight of the remaining-time ratio in the default formula.
    pub time_weight: f64,
    /// Tags marking a challenge as an RDM contest.
    pub rdm_tags: Vec<String>,
    /// RDM difficulty tiers, lowest first; the first tier is the fallback
    /// when no tier tag matches.
    pub rdm_tiers: Vec<RdmTierConfig>,
    /// F2F tiers in classification priority order.
    pub f2f_tiers: Vec<F2fTierConfig>,
}

/// One RDM difficulty tier.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RdmTierConfig {
    pub name: String,
    pub tags: Vec<String>,
    pub total_time_hours: f64,
    pub max_points: f64,
}

/// One F2F difficulty tier: a marker tag and its rank-ordered score array.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct F2fTierConfig {
    pub name: String,
    pub tag: String,
    pub scores: Vec<u32>,
}

impl AppConfig {
    /// Returns a redacted JSON representation (credentials are masked).
    pub fn redacted_json(&self) -> serde_json::Result<String> {
        let mut config = self.clone();
        config.auth.client_id = "[REDACTED]".to_string();
        config.auth.client_secret = "[REDACTED]".to_string();
        if config.kafka.client_cert.is_some() {
            config.kafka.client_cert = Some("[REDACTED]".to_string());
        }
        if config.kafka.client_key.is_some() {
            config.kafka.client_key = Some("[REDACTED]".to_string());
        }
        serde_json::to_string_pretty(&config)
    }

    /// Validates the configuration, returning an error if required settings
    /// are missing or out of bounds.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.kafka.topics.is_empty() {
            return Err(ConfigError::MissingTopics);
        }
        if self.kafka.group_id.is_empty() {
            return Err(ConfigError::MissingGroupId);
        }
        if self.filter.payload_type_ids.is_empty() {
            return Err(ConfigError::MissingPayloadTypeIds);
        }

        // Credentials are only enforced outside local/test profiles.
        if !matches!(self.profile.as_str(), "local" | "test") {
            if self.auth.client_id.is_empty() {
                return Err(ConfigError::MissingAuthClientId);
            }
            if self.auth.client_secret.is_empty() {
                return Err(ConfigError::MissingAuthClientSecret);
            }
        }

        self.scoring.validate()
    }
}

impl ScoringConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.score_decimals > 6 {
            return Err(ConfigError::InvalidScoreDecimals {
                value: self.score_decimals,
            });
        }
        if self.time_weight < 0.0 {
            return Err(ConfigError::InvalidTimeWeight {
                value: self.time_weight,
            });
        }
        if self.rdm_tiers.is_empty() {
            return Err(ConfigError::MissingRdmTiers);
        }
        for tier in &self.rdm_tiers {
            if tier.total_time_hours <= 0.0 || tier.max_points <= 0.0 {
                return Err(ConfigError::InvalidRdmTier {
                    tier: tier.name.clone(),
                });
            }
        }
        for tier in &self.f2f_tiers {
            if tier.scores.is_empty() {
                return Err(ConfigError::EmptyScoreArray {
                    tier: tier.name.clone(),
                });
            }
        }
        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            profile: default_profile(),
            api_bind_addr: default_api_bind_addr(),
            log_level: default_log_level(),
            log_format: default_log_format(),
            kafka: KafkaConfig::default(),
            auth: AuthConfig::default(),
            api: UpstreamApiConfig::default(),
            filter: EventFilterConfig::default(),
            scoring: ScoringConfig::default(),
        }
    }
}

impl Default for KafkaConfig {
    fn default() -> Self {
        Self {
            url: "localhost:9092".to_string(),
            group_id: "aggregate-scorer-processor".to_string(),
            topics: default_topics(),
            client_cert: None,
            client_key: None,
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_url: String::new(),
            audience: "https://m2m.topcoder-dev.com/".to_string(),
            client_id: String::new(),
            client_secret: String::new(),
            token_cache_secs: 86_400,
        }
    }
}

impl Default for UpstreamApiConfig {
    fn default() -> Self {
        Self {
            submission_url: "https://api.topcoder-dev.com/v5/submissions/{submissionId}"
                .to_string(),
            challenge_url: "https://api.topcoder-dev.com/v5/challenges?legacyId={challengeId}"
                .to_string(),
            challenge_submissions_url:
                "https://api.topcoder-dev.com/v5/submissions?challengeId={challengeId}".to_string(),
            review_url: "https://api.topcoder-dev.com/v5/reviews/{reviewId}".to_string(),
            review_summation_query_url:
                "https://api.topcoder-dev.com/v5/reviewSummations?submissionId={submissionId}"
                    .to_string(),
            review_summation_create_url: "https://api.topcoder-dev.com/v5/reviewSummations"
                .to_string(),
            review_summation_update_url:
                "https://api.topcoder-dev.com/v5/reviewSummations/{reviewSummationId}".to_string(),
        }
    }
}

impl Default for EventFilterConfig {
    fn default() -> Self {
        Self {
            payload_resource: "review".to_string(),
            payload_type_ids: vec!["e6ca06fe-bec5-41bb-afac-636860fb39a7".to_string()],
            submission_phase: "Submission".to_string(),
        }
    }
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            score_card_id: 30_001_850,
            score_decimals: 2,
            time_weight: 30.0,
            rdm_tags: vec!["Other".to_string()],
            rdm_tiers: vec![
                rdm_tier("Easy", 48.0, 250.0),
                rdm_tier("Medium", 48.0, 500.0),
                rdm_tier("Hard", 48.0, 800.0),
            ],
            f2f_tiers: vec![
                f2f_tier("Easy", "EASY", &[10, 5, 2]),
                f2f_tier("Medium", "MEDIUM", &[20, 10, 5]),
                f2f_tier("Hard", "HARD", &[30, 15, 10]),
            ],
        }
    }
}

fn rdm_tier(name: &str, total_time_hours: f64, max_points: f64) -> RdmTierConfig {
    RdmTierConfig {
        name: name.to_string(),
        tags: vec![name.to_string()],
        total_time_hours,
        max_points,
    }
}

fn f2f_tier(name: &str, tag: &str, scores: &[u32]) -> F2fTierConfig {
    F2fTierConfig {
        name: name.to_string(),
        tag: tag.to_string(),
        scores: scores.to_vec(),
    }
}

fn default_profile() -> String {
    "local".to_string()
}

fn default_api_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

fn default_topics() -> Vec<String> {
    vec![
        "submission.notification.create".to_string(),
        "submission.notification.update".to_string(),
    ]
}

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load environment file {path}: {source}")]
    EnvFile {
        path: PathBuf,
        source: dotenvy::Error,
    },
    #[error("no Kafka topics configured; set SCORER_TOPICS")]
    MissingTopics,
    #[error("Kafka group id is empty; set SCORER_KAFKA_GROUP_ID")]
    MissingGroupId,
    #[error("no payload type ids configured; set SCORER_PAYLOAD_TYPE_IDS")]
    MissingPayloadTypeIds,
    #[error("auth client id is missing; set SCORER_AUTH0_CLIENT_ID")]
    MissingAuthClientId,
    #[error("auth client secret is missing; set SCORER_AUTH0_CLIENT_SECRET")]
    MissingAuthClientSecret,
    #[error("score decimals must be between 0 and 6, got {value}")]
    InvalidScoreDecimals { value: u32 },
    #[error("time weight must be non-negative, got {value}")]
    InvalidTimeWeight { value: f64 },
    #[error("at least one RDM tier must be configured")]
    MissingRdmTiers,
    #[error("RDM tier {tier} must have positive total time and max points")]
    InvalidRdmTier { tier: String },
    #[error("F2F tier {tier} has an empty score array")]
    EmptyScoreArray { tier: String },
}

/// Loads configuration using layered `.env` files and `SCORER_*` env vars.
pub struct ConfigLoader {
    base_dir: PathBuf,
}

impl ConfigLoader {
    /// Creates a new loader rooted at the current working directory.
    pub fn new() -> Self {
        Self {
            base_dir: env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        }
    }

    /// Creates a loader rooted at the provided directory (useful for tests).
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Loads, merges, and validates configuration.
    pub fn load(&self) -> Result<AppConfig, ConfigError> {
        let (mut layered, profile_hint) = self.collect_layered_env()?;

        // Overlay process environment last so it wins.
        for (key, value) in env::vars() {
            if let Some(stripped) = key.strip_prefix("SCORER_") {
                layered.insert(stripped.to_string(), value);
            }
        }

        let mut config = AppConfig {
            profile: take(&mut layered, "PROFILE").unwrap_or(profile_hint),
            ..AppConfig::default()
        };

        if let Some(value) = take(&mut layered, "API_BIND_ADDR") {
            config.api_bind_addr = value;
        }
        if let Some(value) = take(&mut layered, "LOG_LEVEL") {
            config.log_level = value;
        }
        if let Some(value) = take(&mut layered, "LOG_FORMAT") {
            config.log_format = value;
        }

        if let Some(value) = take(&mut layered, "KAFKA_URL") {
            config.kafka.url = value;
        }
        if let Some(value) = take(&mut layered, "KAFKA_GROUP_ID") {
            config.kafka.group_id = value;
        }
        if let Some(value) = take(&mut layered, "TOPICS") {
            config.kafka.topics = split_list(&value);
        }
        config.kafka.client_cert = take(&mut layered, "KAFKA_CLIENT_CERT");
        config.kafka.client_key = take(&mut layered, "KAFKA_CLIENT_CERT_KEY");

        if let Some(value) = take(&mut layered, "AUTH0_URL") {
            config.auth.token_url = value;
        }
        if let Some(value) = take(&mut layered, "AUTH0_AUDIENCE") {
            config.auth.audience = value;
        }
        if let Some(value) = take(&mut layered, "AUTH0_CLIENT_ID") {
            config.auth.client_id = value;
        }
        if let Some(value) = take(&mut layered, "AUTH0_CLIENT_SECRET") {
            config.auth.client_secret = value;
        }
        if let Some(value) = take_parsed(&mut layered, "TOKEN_CACHE_SECS") {
            config.auth.token_cache_secs = value;
        }

        let api = &mut config.api;
        for (key, slot) in [
            ("SUBMISSION_DETAILS_URL", &mut api.submission_url),
            ("CHALLENGE_DETAILS_URL", &mut api.challenge_url),
            (
                "CHALLENGE_SUBMISSIONS_URL",
                &mut api.challenge_submissions_url,
            ),
            ("REVIEW_DETAILS_URL", &mut api.review_url),
            (
                "REVIEW_SUMMATION_QUERY_URL",
                &mut api.review_summation_query_url,
            ),
            (
                "REVIEW_SUMMATION_CREATE_URL",
                &mut api.review_summation_create_url,
            ),
            (
                "REVIEW_SUMMATION_UPDATE_URL",
                &mut api.review_summation_update_url,
            ),
        ] {
            if let Some(value) = take(&mut layered, key) {
                *slot = value;
            }
        }

        if let Some(value) = take(&mut layered, "PAYLOAD_RESOURCE") {
            config.filter.payload_resource = value;
        }
        if let Some(value) = take(&mut layered, "PAYLOAD_TYPE_IDS") {
            config.filter.payload_type_ids = split_list(&value);
        }
        if let Some(value) = take(&mut layered, "SUBMISSION_PHASE") {
            config.filter.submission_phase = value;
        }

        if let Some(value) = take_parsed(&mut layered, "SCORE_CARD_ID") {
            config.scoring.score_card_id = value;
        }
        if let Some(value) = take_parsed(&mut layered, "SCORE_DECIMALS") {
            config.scoring.score_decimals = value;
        }
        if let Some(value) = take_parsed(&mut layered, "TIME_WEIGHT") {
            config.scoring.time_weight = value;
        }
        if let Some(value) = take(&mut layered, "RDM_TAGS") {
            config.scoring.rdm_tags = split_list(&value);
        }

        for tier in &mut config.scoring.rdm_tiers {
            let prefix = format!("RDM_{}", tier.name.to_uppercase());
            if let Some(value) = take(&mut layered, &format!("{prefix}_TAGS")) {
                tier.tags = split_list(&value);
            }
            if let Some(value) = take_parsed(&mut layered, &format!("{prefix}_TOTAL_TIME_HOURS")) {
                tier.total_time_hours = value;
            }
            if let Some(value) = take_parsed(&mut layered, &format!("{prefix}_MAX_POINTS")) {
                tier.max_points = value;
            }
        }

        for tier in &mut config.scoring.f2f_tiers {
            let name = tier.name.to_uppercase();
            if let Some(value) = take(&mut layered, &format!("TAG_{name}")) {
                tier.tag = value;
            }
            if let Some(value) = take(&mut layered, &format!("{name}_SCORE_ARRAY")) {
                tier.scores = split_list(&value)
                    .iter()
                    .filter_map(|entry| entry.parse().ok())
                    .collect();
            }
        }

        config.validate()?;
        Ok(config)
    }

    fn collect_layered_env(&self) -> Result<(BTreeMap<String, String>, String), ConfigError> {
        let mut values = BTreeMap::new();

        self.merge_dotenv(self.base_dir.join(".env"), &mut values)?;
        self.merge_dotenv(self.base_dir.join(".env.local"), &mut values)?;

        let profile = env::var("SCORER_PROFILE")
            .ok()
            .or_else(|| values.get("PROFILE").cloned())
            .unwrap_or_else(default_profile);

        self.merge_dotenv(
            self.base_dir.join(format!(".env.{}", &profile)),
            &mut values,
        )?;
        self.merge_dotenv(
            self.base_dir.join(format!(".env.{}.local", &profile)),
            &mut values,
        )?;

        Ok((values, profile))
    }

    fn merge_dotenv(
        &self,
        path: PathBuf,
        values: &mut BTreeMap<String, String>,
    ) -> Result<(), ConfigError> {
        match dotenvy::from_path_iter(&path) {
            Ok(iter) => {
                for item in iter {
                    let (key, value) = item.map_err(|source| ConfigError::EnvFile {
                        path: path.clone(),
                        source,
                    })?;
                    if let Some(stripped) = key.strip_prefix("SCORER_") {
                        values.insert(stripped.to_string(), value);
                    }
                }
                Ok(())
            }
            Err(dotenvy::Error::Io(ref io_err))
                if io_err.kind() == std::io::ErrorKind::NotFound =>
            {
                Ok(())
            }
            Err(err) => Err(ConfigError::EnvFile { path, source: err }),
        }
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn take(layered: &mut BTreeMap<String, String>, key: &str) -> Option<String> {
    layered.remove(key).filter(|value| !value.is_empty())
}

fn take_parsed<T: std::str::FromStr>(
    layered: &mut BTreeMap<String, String>,
    key: &str,
) -> Option<T> {
    take(layered, key).and_then(|value| value.parse().ok())
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|entry| entry.trim().to_string())
        .filter(|entry| !entry.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_mirror_the_reference_deployment() {
        let config = AppConfig::default();
        assert_eq!(config.kafka.group_id, "aggregate-scorer-processor");
        assert_eq!(config.kafka.topics.len(), 2);
        assert_eq!(config.filter.payload_resource, "review");
        assert_eq!(config.scoring.score_decimals, 2);
        assert_eq!(config.scoring.rdm_tiers[0].max_points, 250.0);
        assert_eq!(config.scoring.f2f_tiers[2].scores, vec![30, 15, 10]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn empty_score_array_is_rejected() {
        let mut config = AppConfig::default();
        config.scoring.f2f_tiers[0].scores.clear();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::EmptyScoreArray { .. })
        ));
    }

    #[test]
    fn production_profile_requires_credentials() {
        let mut config = AppConfig::default();
        config.profile = "prod".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingAuthClientId)
        ));
    }

    #[test]
    fn redacted_json_masks_credentials() {
        let mut config = AppConfig::default();
        config.auth.client_id = "real-client".to_string();
        config.auth.client_secret = "real-secret".to_string();
        let json = config.redacted_json().unwrap();
        assert!(!json.contains("real-client"));
        assert!(!json.contains("real-secret"));
        assert!(json.contains("[REDACTED]"));
    }

    #[test]
    fn split_list_trims_and_drops_empty_entries() {
        assert_eq!(
            split_list("a, b ,,c"),
            vec!["a".to_string(), "b".to_string(), "c".to_string()]
        );
    }
}
