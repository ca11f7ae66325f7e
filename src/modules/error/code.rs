#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u32)]
pub enum ErrorCode {
    // Client-side errors (10000–10999)
    InvalidParameter = 10000,
    MissingConfiguration = 10020,
    RulesFileInvalid = 10030,

    // Network connection errors (40000–40999)
    NetworkError = 40000,
    ConnectionTimeout = 40010,
    ConnectionPoolClosed = 40020,

    // Mail service errors (50000–50999)
    ImapCommandFailed = 50000,
    ImapAuthenticationFailed = 50010,
    ImapUnexpectedResult = 50020,
    MessageParseFailed = 50030,

    // Storage errors (60000–60999)
    StoreWriteFailed = 60000,
    AttachmentWriteFailed = 60010,

    // Internal system errors (70000–70999)
    InternalError = 70000,
}

impl ErrorCode {
    /// Transport-level failures are the only class the reconnect-and-replay
    /// policy is allowed to retry.
    pub fn is_transport(&self) -> bool {
        matches!(self, ErrorCode::NetworkError | ErrorCode::ConnectionTimeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_classification() {
        assert!(ErrorCode::NetworkError.is_transport());
        assert!(ErrorCode::ConnectionTimeout.is_transport());
        assert!(!ErrorCode::ImapCommandFailed.is_transport());
        assert!(!ErrorCode::ImapAuthenticationFailed.is_transport());
        assert!(!ErrorCode::InternalError.is_transport());
    }
}
