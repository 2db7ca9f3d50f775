use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, Url};
use std::sync::Arc;

use super::{BatchContext, Delivery};
use crate::sink::DeliveryError;

/// A fully built request. Immutable once constructed; the retry loop resends
/// the same value.
#[derive(Clone, Debug)]
pub struct PreparedRequest {
    method: Method,
    url: Url,
    headers: HeaderMap,
    body: Bytes,
}

impl PreparedRequest {
    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }
}

/// Builds requests for one delivery variant against one base URL.
#[derive(Clone, Debug)]
pub struct RequestBuilder {
    base_url: String,
    auth: HeaderValue,
    delivery: Arc<dyn Delivery>,
}

impl RequestBuilder {
    pub fn new(
        base_url: &str,
        api_token: &str,
        delivery: Arc<dyn Delivery>,
    ) -> Result<Self, DeliveryError> {
        let mut auth = HeaderValue::from_str(&format!("Token {}", api_token))
            .map_err(|_| DeliveryError::Fatal("api_token contains invalid header characters".into()))?;
        auth.set_sensitive(true);

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            auth,
            delivery,
        })
    }

    pub fn delivery(&self) -> &dyn Delivery {
        self.delivery.as_ref()
    }

    /// Build the PUT request for a context. Encoding and URL problems are fatal.
    pub fn build(&self, context: &BatchContext) -> Result<PreparedRequest, DeliveryError> {
        let endpoint = self.delivery.endpoint(&self.base_url, &context.stream);
        let mut url = Url::parse(&endpoint)
            .map_err(|e| DeliveryError::Fatal(format!("invalid endpoint URL: {}", e)))?;

        let params = self.delivery.url_params(&context.stream);
        if !params.is_empty() {
            url.query_pairs_mut().extend_pairs(params);
        }

        let body = self.delivery.body(context)?;

        Ok(PreparedRequest {
            method: Method::PUT,
            url,
            headers: self.headers(&context.stream)?,
            body,
        })
    }

    /// Extra headers first, then the base headers on top so they are always
    /// present exactly once.
    fn headers(&self, stream: &str) -> Result<HeaderMap, DeliveryError> {
        let mut headers = HeaderMap::new();
        for (name, value) in self.delivery.extra_headers(stream) {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| DeliveryError::Fatal(format!("invalid header name '{}': {}", name, e)))?;
            let value = HeaderValue::from_str(&value)
                .map_err(|e| DeliveryError::Fatal(format!("invalid value for header '{}': {}", name, e)))?;
            headers.append(name, value);
        }
        headers.insert(AUTHORIZATION, self.auth.clone());
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }
}
