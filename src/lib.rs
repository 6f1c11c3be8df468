//! # presage
//!
//! Speculative pre-generation pipeline: watches user activity for
//! patterns, queues prediction jobs with admission control, generates
//! content ahead of need, and reconciles a time-windowed page cache.
//!
//! Postgres holds all state; LLM calls go through rig-core; telemetry
//! flows through OpenTelemetry.

pub mod admission;
pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod fingerprint;
pub mod llm;
pub mod model;
pub mod telemetry;
pub mod worker;
