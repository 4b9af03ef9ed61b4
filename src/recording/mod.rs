//! Recording of live exchanges

mod engine;

use std::time::Duration;

pub use engine::{fetch_error_output, RecordResolver};

/// Upper bound on a live call when none is configured
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
