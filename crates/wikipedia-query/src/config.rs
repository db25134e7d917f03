use crate::intent::OperationKind;
use http::{HeaderMap, HeaderName, HeaderValue};
use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Replaced by the resolved language code in [`EngineConfig::endpoint`]
pub const LANGUAGE_PLACEHOLDER: &str = "{lang}";

const DEFAULT_ENDPOINT: &str = "https://{lang}.wikipedia.org/w/api.php";

const USER_AGENT: &str = concat!(
    std::env!("CARGO_PKG_NAME"),
    "/",
    std::env!("CARGO_PKG_VERSION")
);

#[derive(Error, Debug)]
pub enum HeaderError {
    #[error("{0}")]
    InvalidHeaderName(#[from] http::header::InvalidHeaderName),
    #[error("{0}")]
    InvalidHeaderValue(#[from] http::header::InvalidHeaderValue),
    #[error("{0}")]
    HeaderMapMaxSizeReached(#[from] http::header::MaxSizeReached),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid header: {0}")]
    Header(#[from] HeaderError),
    #[error("Endpoint '{0}' is not a valid URL template")]
    Endpoint(String),
    #[error("Environment variable {name} has an invalid value '{value}'")]
    Environment { name: &'static str, value: String },
}

/// Everything the request engine needs, fixed once the engine is built
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub(crate) endpoint: String,
    pub(crate) language: isolang::Language,
    pub(crate) default_limit: u32,
    pub(crate) ttl_overrides: HashMap<OperationKind, Duration>,
    pub(crate) cache_capacity: usize,
    pub(crate) retry_attempts: u32,
    pub(crate) retry_base_delay: Duration,
    pub(crate) retry_max_delay: Duration,
    pub(crate) call_timeout: Option<Duration>,
    pub(crate) request_timeout: Option<Duration>,
    pub(crate) max_pages: u32,
    // Only non defaults
    pub(crate) headers: HeaderMap<HeaderValue>,
    pub(crate) proxy: Option<String>,
    pub(crate) extra_params: BTreeMap<String, String>,
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overridden by `WIKIPEDIA_*` environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// [`EngineConfig::from_env`] over any variable source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(endpoint) = lookup("WIKIPEDIA_API_URL") {
            config = config.endpoint(endpoint)?;
        }

        if let Some(code) = lookup("WIKIPEDIA_LANGUAGE") {
            config.language = isolang::Language::from_639_1(code.trim()).ok_or(
                ConfigError::Environment {
                    name: "WIKIPEDIA_LANGUAGE",
                    value: code,
                },
            )?;
        }

        if let Some(user_agent) = lookup("WIKIPEDIA_USER_AGENT") {
            config = config.user_agent(user_agent)?;
        }

        if let Some(seconds) = lookup("WIKIPEDIA_TIMEOUT") {
            let seconds = parse_env::<u64>("WIKIPEDIA_TIMEOUT", seconds)?;
            config.request_timeout = Some(Duration::from_secs(seconds));
        }

        if let Some(attempts) = lookup("WIKIPEDIA_RETRIES") {
            config = config.retry_attempts(parse_env("WIKIPEDIA_RETRIES", attempts)?);
        }

        if let Some(proxies) = lookup("WIKIPEDIA_PROXIES") {
            config.proxy = proxy_from_map(&proxies)
                .ok_or(ConfigError::Environment {
                    name: "WIKIPEDIA_PROXIES",
                    value: proxies,
                })?
                .or(config.proxy);
        }

        // A single URI wins over the scheme map
        if let Some(proxy) = lookup("WIKIPEDIA_PROXY") {
            config.proxy = Some(proxy);
        }

        Ok(config)
    }

    /// The API URL, `{lang}` is replaced by the language of each call
    pub fn endpoint(self, endpoint: impl Into<String>) -> Result<Self, ConfigError> {
        let endpoint = endpoint.into();

        Url::parse(&endpoint.replace(LANGUAGE_PLACEHOLDER, "en"))
            .map_err(|_| ConfigError::Endpoint(endpoint.clone()))?;

        Ok(Self { endpoint, ..self })
    }

    pub fn language(self, language: isolang::Language) -> Self {
        Self { language, ..self }
    }

    pub fn default_limit(self, default_limit: u32) -> Self {
        Self {
            default_limit,
            ..self
        }
    }

    pub fn ttl(mut self, operation: OperationKind, ttl: Duration) -> Self {
        self.ttl_overrides.insert(operation, ttl);
        self
    }

    pub fn cache_capacity(self, cache_capacity: usize) -> Self {
        Self {
            cache_capacity,
            ..self
        }
    }

    /// Total attempts per request, the first one included
    pub fn retry_attempts(self, retry_attempts: u32) -> Self {
        Self {
            retry_attempts: retry_attempts.max(1),
            ..self
        }
    }

    pub fn retry_delays(self, base: Duration, max: Duration) -> Self {
        Self {
            retry_base_delay: base,
            retry_max_delay: max.max(base),
            ..self
        }
    }

    pub fn call_timeout(self, call_timeout: Option<Duration>) -> Self {
        Self {
            call_timeout,
            ..self
        }
    }

    pub fn timeout(self, request_timeout: Option<Duration>) -> Self {
        Self {
            request_timeout,
            ..self
        }
    }

    pub fn max_pages(self, max_pages: u32) -> Self {
        Self {
            max_pages: max_pages.max(1),
            ..self
        }
    }

    pub fn proxy(self, proxy: Option<String>) -> Self {
        Self { proxy, ..self }
    }

    pub fn extra_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_params.insert(name.into(), value.into());
        self
    }

    pub fn user_agent(mut self, user_agent: impl std::fmt::Display) -> Result<Self, HeaderError> {
        self.headers.remove(http::header::USER_AGENT);
        self.add_header(http::header::USER_AGENT, user_agent)
    }

    pub fn add_header(
        mut self,
        name: impl std::fmt::Display,
        value: impl std::fmt::Display,
    ) -> Result<Self, HeaderError> {
        self.headers.try_insert(
            HeaderName::from_str(name.to_string().as_str())?,
            HeaderValue::from_str(value.to_string().as_str())?,
        )?;

        Ok(self)
    }

    /// The cache lifetime for results of `operation`
    pub fn ttl_for(&self, operation: OperationKind) -> Duration {
        self.ttl_overrides
            .get(&operation)
            .copied()
            .unwrap_or_else(|| operation.default_ttl())
    }

    /// The API URL for one language
    pub fn endpoint_for(&self, language_code: &str) -> Result<Url, url::ParseError> {
        Url::parse(&self.endpoint.replace(LANGUAGE_PLACEHOLDER, language_code))
    }

    pub fn headers(&self) -> &HeaderMap<HeaderValue> {
        &self.headers
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout
    }

    pub fn proxy_uri(&self) -> Option<&str> {
        self.proxy.as_deref()
    }
}

/// The proxy out of a JSON scheme map like `{"https": "http://proxy:3128"}`, the
/// https entry first. `None` if the map is not valid JSON.
fn proxy_from_map(proxies: &str) -> Option<Option<String>> {
    let proxies = serde_json::from_str::<serde_json::Map<String, serde_json::Value>>(proxies).ok()?;

    Some(
        ["https", "http"]
            .into_iter()
            .find_map(|scheme| proxies.get(scheme)?.as_str())
            .map(str::to_string),
    )
}

fn parse_env<T: FromStr>(name: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Environment { name, value })
}

impl Default for EngineConfig {
    fn default() -> Self {
        let mut headers = HeaderMap::new();

        headers.insert(
            http::header::USER_AGENT,
            HeaderValue::from_static(USER_AGENT),
        );

        EngineConfig {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            language: isolang::Language::Eng,
            default_limit: 10,
            ttl_overrides: HashMap::new(),
            cache_capacity: 256,
            retry_attempts: 3,
            retry_base_delay: Duration::from_millis(500),
            retry_max_delay: Duration::from_secs(30),
            call_timeout: Some(Duration::from_secs(30)),
            request_timeout: Some(Duration::from_secs(10)),
            max_pages: 50,
            headers,
            proxy: None,
            extra_params: BTreeMap::new(),
        }
    }
}
