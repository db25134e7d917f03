#![forbid(unsafe_code)]

cfg_if::cfg_if! {
    if #[cfg(feature = "client")] {
        pub use transport::UreqTransport;

        pub use transport::HttpError;
    }
}

mod cache;

pub use cache::{Cache, CacheStats};

mod config;

pub use config::{ConfigError, EngineConfig, HeaderError};

mod engine;

pub use engine::RequestEngine;

mod error;

pub use error::{Error, ErrorKind};

mod intent;

pub use intent::{MAX_PAGE_SIZE, NormalizedIntent, OperationKind, QueryIntent, QueryOptions, Subject};

mod page;

pub use page::{
    Continuation, LanguageInvalidError, ParsedPage, SearchHit, file_url, wikipedia_base,
    wikipedia_base_with_language,
};

mod parse;

pub use parse::parse_response;

mod query;

pub use query::build_request;

mod retry;

pub use retry::{RetryController, RetryPolicy, Sleeper, ThreadSleeper};

mod transport;

pub use transport::{ApiRequest, RawResponse, Transport, TransportError};

pub mod wikitext;

pub use url::Url;

pub use isolang::Language;
