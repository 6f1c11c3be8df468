//! One-shot worker passes.
//!
//! Each worker runs a single stateless pass and exits; an external
//! scheduler owns the cadence. Overlapping passes are safe because
//! every claim is a conditional update, and a pass never assumes it is
//! the only one running.

pub mod ambient;
pub mod generator;
pub mod predictor;

use std::time::Duration;

/// Upper bound on any single model call inside a pass.
pub(crate) const CAPABILITY_TIMEOUT: Duration = Duration::from_secs(30);
