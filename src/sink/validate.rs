use reqwest::StatusCode;
use reqwest::Url;

use super::transport::ResponseInfo;
use super::DeliveryError;

/// Classifies responses into success, retriable or fatal.
#[derive(Clone, Debug)]
pub struct ResponseValidator {
    extra_retry_statuses: Vec<u16>,
}

impl Default for ResponseValidator {
    fn default() -> Self {
        Self::new(vec![StatusCode::TOO_MANY_REQUESTS.as_u16()])
    }
}

impl ResponseValidator {
    pub fn new(extra_retry_statuses: Vec<u16>) -> Self {
        Self {
            extra_retry_statuses,
        }
    }

    pub fn validate(&self, response: &ResponseInfo) -> Result<(), DeliveryError> {
        self.classify(response.status, &response.url)
    }

    pub fn classify(&self, status: StatusCode, url: &Url) -> Result<(), DeliveryError> {
        let code = status.as_u16();
        if self.extra_retry_statuses.contains(&code) || status.is_server_error() || code >= 600 {
            return Err(DeliveryError::Retriable(error_message(status, url)));
        }
        if status.is_client_error() {
            return Err(DeliveryError::Fatal(error_message(status, url)));
        }
        Ok(())
    }
}

/// `"{status} {Client|Server} Error: {reason} for path: {path}"`.
///
/// Only the URL path is included; host and query string are left out.
pub fn error_message(status: StatusCode, url: &Url) -> String {
    let kind = if status.is_client_error() {
        "Client"
    } else {
        "Server"
    };
    format!(
        "{} {} Error: {} for path: {}",
        status.as_u16(),
        kind,
        status.canonical_reason().unwrap_or("Unknown"),
        url.path()
    )
}
