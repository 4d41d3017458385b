use std::time::{Duration, Instant};

use crate::error::{RetrievalError, RetrievalResult};

/// Wall-clock backstop for one retrieval call.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    started: Instant,
    limit: Duration,
}

impl Deadline {
    /// Starts the clock now.
    pub fn after(limit: Duration) -> Self {
        Self {
            started: Instant::now(),
            limit,
        }
    }

    /// Fails with [`RetrievalError::Timeout`] once the limit has passed.
    pub fn check(&self) -> RetrievalResult<()> {
        if self.started.elapsed() >= self.limit {
            return Err(RetrievalError::Timeout(self.limit));
        }
        Ok(())
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_deadline_passes() {
        assert!(Deadline::after(Duration::from_secs(60)).check().is_ok());
    }

    #[test]
    fn zero_limit_expires_immediately() {
        let err = Deadline::after(Duration::ZERO).check().unwrap_err();
        assert!(matches!(err, RetrievalError::Timeout(limit) if limit.is_zero()));
    }
}
