use crate::types::{AttemptError, RequestInfo};
use std::time::Duration;

/// Consumer of per-attempt outcomes. A runner fans every attempt out to
/// all of its listeners; implementations must not block on I/O.
pub trait Listener: Send + Sync {
    fn track_failed(&self, info: &RequestInfo, error: &AttemptError);

    fn track_response(&self, info: &RequestInfo, success: bool, latency: Duration);
}
