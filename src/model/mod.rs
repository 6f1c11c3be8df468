//! Core data model.
//!
//! Queue jobs, cache entries, pattern candidates, activity folding, and
//! ambient events. Storage-facing row types live in `db`, not here.

pub mod activity;
pub mod cache;
pub mod event;
pub mod job;
pub mod pattern;
