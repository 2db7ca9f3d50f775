use super::retry::IsRetryable;

/// Classified delivery failure.
///
/// `Retriable` is only seen by callers once the retry budget is spent, at
/// which point it is as terminal as `Fatal`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    Fatal(String),
    Retriable(String),
}

impl DeliveryError {
    pub fn message(&self) -> &str {
        match self {
            DeliveryError::Fatal(msg) | DeliveryError::Retriable(msg) => msg,
        }
    }
}

impl std::fmt::Display for DeliveryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeliveryError::Fatal(msg) => write!(f, "fatal delivery error: {}", msg),
            DeliveryError::Retriable(msg) => write!(f, "retriable delivery error: {}", msg),
        }
    }
}

impl std::error::Error for DeliveryError {}

impl IsRetryable for DeliveryError {
    fn is_retryable(&self) -> bool {
        matches!(self, DeliveryError::Retriable(_))
    }
}

impl From<crate::record::EncodeError> for DeliveryError {
    fn from(e: crate::record::EncodeError) -> Self {
        DeliveryError::Fatal(e.to_string())
    }
}

/// Map a reqwest transport failure onto the retriable kind.
pub(crate) fn from_transport(e: reqwest::Error) -> DeliveryError {
    let kind = if e.is_timeout() {
        "timeout"
    } else if e.is_connect() {
        "connection error"
    } else {
        "network error"
    };
    // Strip the URL so query-string secrets never reach the message
    DeliveryError::Retriable(format!("{}: {}", kind, e.without_url()))
}
