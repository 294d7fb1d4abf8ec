//! # Aggregate Scorer
//!
//! Kafka processor that consumes submission-review notification events,
//! fetches submission/challenge/review details from the upstream REST API,
//! computes an aggregate score under the formula matching the contest
//! classification, and persists the resulting review summation.

pub mod auth;
pub mod config;
pub mod consumer;
pub mod error;
pub mod gateway;
pub mod models;
pub mod processor;
pub mod scoring;
pub mod server;
pub mod telemetry;
