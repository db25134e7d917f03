use std::time::Duration;
use thiserror::Error;

/// The classified outcome of a failed logical call
///
/// Every engine call that does not produce a page ends in exactly one of these,
/// transport failures included, so callers can branch on [`Error::kind`] instead of messages.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    /// The intent could not be turned into a request (caller error, never retried)
    #[error("Malformed intent: {0}")]
    MalformedIntent(String),
    /// The subject does not exist on the wiki
    #[error("Page not found: '{subject}'")]
    NotFound { subject: String },
    /// The title names a disambiguation page, resubmit with one of the candidates
    #[error("'{title}' may refer to {} pages", candidates.len())]
    Disambiguation {
        title: String,
        candidates: Vec<String>,
    },
    /// Any API error the engine has no dedicated classification for
    #[error("API error '{code}': {info}")]
    ProviderError { code: String, info: String },
    /// The provider asked us to slow down
    #[error("Rate limited by the provider")]
    RateLimited { retry_after: Option<Duration> },
    /// A server side (5xx) or connection level failure
    #[error("Transient failure: {reason}")]
    Transient { status: Option<u16>, reason: String },
    /// A retryable failure kept happening until the attempt budget ran out
    #[error("Gave up after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: Box<Error> },
    /// The continuation chain was longer than the configured page cap
    #[error("Continuation exceeded {limit} pages")]
    TooManyPages { limit: u32 },
    /// The call deadline passed
    #[error("Failed to complete the call before the deadline")]
    Timeout,
    /// The response body was not the JSON the provider promises
    #[error("Failed to deserialise response: {0}")]
    Decode(String), // serde_json::Error doesn't implement Clone
}

/// The kind of an [`Error`], without its payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    MalformedIntent,
    NotFound,
    Disambiguation,
    ProviderError,
    RateLimited,
    Transient,
    Exhausted,
    TooManyPages,
    Timeout,
    Decode,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MalformedIntent(_) => ErrorKind::MalformedIntent,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Disambiguation { .. } => ErrorKind::Disambiguation,
            Self::ProviderError { .. } => ErrorKind::ProviderError,
            Self::RateLimited { .. } => ErrorKind::RateLimited,
            Self::Transient { .. } => ErrorKind::Transient,
            Self::Exhausted { .. } => ErrorKind::Exhausted,
            Self::TooManyPages { .. } => ErrorKind::TooManyPages,
            Self::Timeout => ErrorKind::Timeout,
            Self::Decode(_) => ErrorKind::Decode,
        }
    }

    /// Only transient failures and rate limiting are worth another attempt
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient { .. } | Self::RateLimited { .. })
    }

    /// The provider supplied wait, if this is a rate limit that carried one
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }

    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedIntent(reason.into())
    }
}

#[cfg(test)]
mod test {
    use super::{Error, ErrorKind};
    use std::time::Duration;

    #[test]
    fn only_transient_and_rate_limited_are_retryable() {
        assert!(
            Error::Transient {
                status: Some(503),
                reason: "Service Unavailable".to_string()
            }
            .is_retryable()
        );
        assert!(Error::RateLimited { retry_after: None }.is_retryable());

        assert!(!Error::Timeout.is_retryable());
        assert!(
            !Error::NotFound {
                subject: "Waffle".to_string()
            }
            .is_retryable()
        );
        assert!(
            !Error::Exhausted {
                attempts: 3,
                last: Box::new(Error::RateLimited { retry_after: None })
            }
            .is_retryable()
        );
    }

    #[test]
    fn kind_and_retry_after() {
        let error = Error::RateLimited {
            retry_after: Some(Duration::from_secs(4)),
        };

        assert_eq!(error.kind(), ErrorKind::RateLimited);
        assert_eq!(error.retry_after(), Some(Duration::from_secs(4)));
        assert_eq!(Error::Timeout.retry_after(), None);
    }

    #[test]
    fn disambiguation_message_counts_candidates() {
        let error = Error::Disambiguation {
            title: "Mercury".to_string(),
            candidates: vec!["Mercury (planet)".to_string(), "Mercury (element)".to_string()],
        };

        assert_eq!(error.to_string(), "'Mercury' may refer to 2 pages");
    }
}
