use crate::modules::error::HarvestError;

/// Reconnect-and-replay budget for a single command. Only transport-level
/// failures qualify; protocol errors (NO/BAD, parse failures) surface
/// immediately because replaying them would fail the same way.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_retries: 1 }
    }
}

impl RetryPolicy {
    pub fn should_retry(&self, error: &HarvestError, attempts_made: u32) -> bool {
        attempts_made < self.max_retries && error.is_transport()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::error::code::ErrorCode;
    use crate::raise_error;

    #[test]
    fn retries_transport_errors_once() {
        let policy = RetryPolicy::default();
        let err = raise_error!("connection reset".into(), ErrorCode::NetworkError);
        assert!(policy.should_retry(&err, 0));
        assert!(!policy.should_retry(&err, 1));
    }

    #[test]
    fn never_retries_protocol_errors() {
        let policy = RetryPolicy::default();
        let err = raise_error!("NO invalid command".into(), ErrorCode::ImapCommandFailed);
        assert!(!policy.should_retry(&err, 0));
    }
}
