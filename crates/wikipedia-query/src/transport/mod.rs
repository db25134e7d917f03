use http::{HeaderMap, Method, StatusCode};
use std::time::Duration;
use thiserror::Error;
use url::Url;

#[cfg(feature = "client")]
mod native;
#[cfg(feature = "client")]
pub use native::*;

/// Failures below HTTP, the engine treats all of them as transient
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Request timed out")]
    TimedOut,
    #[error("Connection failed: {0}")]
    Connection(String),
}

/// A fully built API request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiRequest {
    pub method: Method,
    /// The endpoint, without query parameters
    pub url: Url,
    pub params: Vec<(String, String)>,
    pub headers: HeaderMap,
}

impl ApiRequest {
    /// The endpoint with `params` as its query string, what a GET sends
    pub fn url_with_query(&self) -> Url {
        let mut url = self.url.clone();

        url.query_pairs_mut().extend_pairs(&self.params);

        url
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

/// What came back over the wire for one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
    pub elapsed: Duration,
}

impl RawResponse {
    /// A 200 response with a body and no headers
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self::with_status(StatusCode::OK, body)
    }

    pub fn with_status(status: StatusCode, body: impl Into<Vec<u8>>) -> Self {
        RawResponse {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
            elapsed: Duration::ZERO,
        }
    }
}

/// Sends requests to the provider
///
/// The engine never opens sockets itself, everything goes through one of these.
pub trait Transport: Send + Sync {
    /// # Errors
    ///
    /// Only failures below HTTP; any status code, 5xx included, is a response.
    fn send(&self, request: &ApiRequest) -> Result<RawResponse, TransportError>;
}

impl<T: Transport + ?Sized> Transport for std::sync::Arc<T> {
    fn send(&self, request: &ApiRequest) -> Result<RawResponse, TransportError> {
        (**self).send(request)
    }
}

#[cfg(test)]
mod test {
    use super::ApiRequest;
    use http::{HeaderMap, Method};
    use url::Url;

    #[test]
    fn query_string_is_encoded() {
        let request = ApiRequest {
            method: Method::GET,
            url: Url::parse("https://en.wikipedia.org/w/api.php").expect("URL is valid"),
            params: vec![
                ("action".to_string(), "query".to_string()),
                ("titles".to_string(), "AT&T".to_string()),
            ],
            headers: HeaderMap::new(),
        };

        assert_eq!(
            request.url_with_query().as_str(),
            "https://en.wikipedia.org/w/api.php?action=query&titles=AT%26T"
        );
        assert_eq!(request.param("titles"), Some("AT&T"));
        assert_eq!(request.param("list"), None);
    }
}
