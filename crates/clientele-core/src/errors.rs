/// Failures of the registry itself or of the registration lifecycle.
#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("registry unavailable: {0}")]
    RegistryUnavailable(String),

    #[error("registry rejected request with HTTP {status}: {body}")]
    RegistryRejected { status: u16, body: String },

    #[error("malformed registry response: {0}")]
    MalformedResponse(String),

    #[error("registration failed after {attempts} attempts")]
    RegistrationExhausted { attempts: u32 },

    #[error("lifecycle cannot move from {from} to {to}")]
    InvalidTransition { from: String, to: String },
}

/// Outcome of a failed outbound call. Every variant is recoverable by the caller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CallError {
    #[error("service {0} has no passing instance")]
    ServiceUnavailable(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("HTTP {status}: {body}")]
    Remote { status: u16, body: String },

    #[error("call cancelled")]
    Cancelled,
}

impl CallError {
    pub fn is_client_error(&self) -> bool {
        matches!(self, CallError::Remote { status, .. } if (400..500).contains(status))
    }

    pub fn is_server_error(&self) -> bool {
        matches!(self, CallError::Remote { status, .. } if *status >= 500)
    }

    /// Short label for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            CallError::ServiceUnavailable(_) => "unavailable",
            CallError::Transport(_) => "transport",
            CallError::Remote { .. } => "remote",
            CallError::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Field '{0}' is required")]
    Required(&'static str),

    #[error("Field '{field}' exceeds {max} characters")]
    TooLong { field: &'static str, max: usize },

    #[error("Phone number too short")]
    PhoneTooShort,

    #[error("Invalid email address: {0}")]
    InvalidEmail(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_status_classes() {
        let not_found = CallError::Remote { status: 404, body: String::new() };
        let bad_gateway = CallError::Remote { status: 502, body: String::new() };

        assert!(not_found.is_client_error());
        assert!(!not_found.is_server_error());
        assert!(bad_gateway.is_server_error());
        assert!(!CallError::Transport("refused".into()).is_client_error());
    }
}
