use super::{ApiRequest, RawResponse, Transport, TransportError};
use crate::config::EngineConfig;
use http::Method;
use std::time::Instant;
use thiserror::Error;
use ureq::Agent;

const CLIENT_REDIRECTS: u32 = 2;

type InnerClient = ureq::Agent;

type HttpErrorInner = ureq::Error;

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("Error with HTTP backend: {0}")]
    Backend(#[from] HttpErrorInner),
}

/// A blocking [`Transport`] backed by ureq
pub struct UreqTransport {
    client: InnerClient,
}

impl UreqTransport {
    /// Build a transport with the timeout and proxy of `config`
    ///
    /// # Errors
    ///
    /// This method fails if the proxy URI is invalid
    pub fn from_config(config: &EngineConfig) -> Result<Self, HttpError> {
        let proxy = config.proxy_uri().map(ureq::Proxy::new).transpose()?;

        let builder = ureq::config::Config::builder()
            .max_redirects(CLIENT_REDIRECTS)
            .timeout_global(config.request_timeout())
            // Status codes are classified by the response parser
            .http_status_as_error(false)
            .proxy(proxy);

        Ok(UreqTransport {
            client: Agent::new_with_config(builder.build()),
        })
    }
}

impl Transport for UreqTransport {
    fn send(&self, request: &ApiRequest) -> Result<RawResponse, TransportError> {
        let started = Instant::now();

        let response = if request.method == Method::POST {
            log::info!("Posting to url '{}'", &request.url);

            let mut builder = self.client.post(request.url.as_str());

            for (name, value) in &request.headers {
                builder = builder.header(name.clone(), value.clone());
            }

            builder.send_form(request.params.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        } else {
            let url = request.url_with_query();

            log::info!("Loading page from url '{}'", &url);

            let mut builder = self.client.get(url.as_str());

            for (name, value) in &request.headers {
                builder = builder.header(name.clone(), value.clone());
            }

            builder.call()
        };

        let mut response = response.map_err(classify)?;

        let body = response.body_mut().read_to_vec().map_err(classify)?;

        Ok(RawResponse {
            status: response.status(),
            headers: response.headers().clone(),
            body,
            elapsed: started.elapsed(),
        })
    }
}

fn classify(error: HttpErrorInner) -> TransportError {
    match error {
        ureq::Error::Timeout(_) => TransportError::TimedOut,
        other => TransportError::Connection(other.to_string()),
    }
}

#[cfg(test)]
mod test {
    use super::UreqTransport;
    use crate::EngineConfig;

    #[test]
    fn default_transport_config_is_valid() {
        let config = EngineConfig::default();

        UreqTransport::from_config(&config).expect("Default configuration is invalid");
    }

    #[test]
    fn invalid_proxy_is_rejected() {
        let config = EngineConfig::default().proxy(Some("::not a proxy::".to_string()));

        assert!(UreqTransport::from_config(&config).is_err());
    }
}
