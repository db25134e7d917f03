use crate::cache::{Cache, CacheStats};
use crate::config::EngineConfig;
use crate::error::Error;
use crate::intent::{NormalizedIntent, OperationKind, QueryIntent, Subject};
use crate::page::{Continuation, ParsedPage};
use crate::parse::parse_response;
use crate::query::build_request;
use crate::retry::{RetryController, RetryPolicy, Sleeper, ThreadSleeper};
use crate::transport::{ApiRequest, Transport};
use std::time::Instant;

/// One multi-page fetch in progress
///
/// Lives for a single call; if any page fails everything in it is dropped.
#[derive(Default)]
struct ContinuationState {
    token: Option<Continuation>,
    accumulated: Option<ParsedPage>,
    pages: u32,
}

impl ContinuationState {
    fn absorb(&mut self, page: ParsedPage) {
        self.pages += 1;
        self.token.clone_from(&page.continuation);

        match &mut self.accumulated {
            Some(accumulated) => accumulated.absorb(page),
            None => self.accumulated = Some(page),
        }
    }

    /// Whether another page should be requested
    fn wants_more(&self, intent: &NormalizedIntent) -> bool {
        if self.token.is_none() {
            return false;
        }

        match (intent.operation(), &self.accumulated, intent.options().limit) {
            (OperationKind::Search, Some(page), Some(limit)) => {
                page.search_hits.len() < limit as usize
            }
            _ => true,
        }
    }

    fn finish(self, intent: &NormalizedIntent) -> ParsedPage {
        let mut page = self.accumulated.unwrap_or_default();

        if intent.operation() == OperationKind::Search {
            if let Some(limit) = intent.options().limit {
                page.search_hits.truncate(limit as usize);
            }
        } else {
            // The chain ran to its end
            page.continuation = None;
        }

        page
    }
}

/// Turns intents into pages: cache, query building, retries, parsing and continuation
///
/// Safe to share between threads; the cache is the only state calls have in common.
pub struct RequestEngine {
    config: EngineConfig,
    transport: Box<dyn Transport>,
    retry: RetryController,
    cache: Cache<NormalizedIntent, ParsedPage>,
}

impl RequestEngine {
    pub fn new(config: EngineConfig, transport: impl Transport + 'static) -> Self {
        RequestEngine {
            retry: RetryController::new(RetryPolicy::from_config(&config), Box::new(ThreadSleeper)),
            cache: Cache::new(config.cache_capacity),
            transport: Box::new(transport),
            config,
        }
    }

    /// Replace how the engine waits between retries
    pub fn with_sleeper(self, sleeper: impl Sleeper + 'static) -> Self {
        Self {
            retry: RetryController::new(*self.retry.policy(), Box::new(sleeper)),
            ..self
        }
    }

    /// Create a [`RequestEngine`] talking to the provider over ureq
    ///
    /// # Errors
    ///
    /// This method fails if the configured proxy is invalid
    #[cfg(feature = "client")]
    pub fn from_config(config: EngineConfig) -> Result<Self, crate::transport::HttpError> {
        let transport = crate::transport::UreqTransport::from_config(&config)?;

        Ok(Self::new(config, transport))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run one logical call within the configured call timeout
    pub fn execute(&self, intent: &QueryIntent) -> Result<ParsedPage, Error> {
        let deadline = self
            .config
            .call_timeout
            .and_then(|timeout| Instant::now().checked_add(timeout));

        self.execute_until(intent, deadline)
    }

    /// Run one logical call, giving up with [`Error::Timeout`] at `deadline`
    pub fn execute_until(
        &self,
        intent: &QueryIntent,
        deadline: Option<Instant>,
    ) -> Result<ParsedPage, Error> {
        let key = intent.normalize(&self.config)?;

        let result = match self.cached_or_fetch(&key, deadline) {
            Err(Error::Disambiguation { title, candidates }) if candidates.is_empty() => {
                Err(self.resolve_candidates(&key, title, deadline))
            }
            other => other,
        };

        if let Err(error) = &result {
            log::info!("Call '{key}' failed: {error}");
        }

        result
    }

    /// Forget the cached result of `intent`, returns whether there was one
    pub fn invalidate(&self, intent: &QueryIntent) -> Result<bool, Error> {
        Ok(self.cache.invalidate(&intent.normalize(&self.config)?))
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    fn cached_or_fetch(
        &self,
        key: &NormalizedIntent,
        deadline: Option<Instant>,
    ) -> Result<ParsedPage, Error> {
        if let Some(page) = self.cache.lookup(key) {
            return Ok(page);
        }

        let page = self.fetch_all(key, deadline)?;

        self.cache
            .store(key.clone(), page.clone(), self.config.ttl_for(key.operation()));

        Ok(page)
    }

    fn fetch_all(
        &self,
        key: &NormalizedIntent,
        deadline: Option<Instant>,
    ) -> Result<ParsedPage, Error> {
        let mut state = ContinuationState::default();

        loop {
            if state.pages >= self.config.max_pages {
                log::warn!(
                    "'{key}' is still continuing after {} pages",
                    self.config.max_pages
                );

                return Err(Error::TooManyPages {
                    limit: self.config.max_pages,
                });
            }

            let request = build_request(key, &self.config, state.token.as_ref())?;

            let page = self.retry.run(deadline, || self.send(&request, key))?;

            state.absorb(page);

            if !state.wants_more(key) {
                return Ok(state.finish(key));
            }

            log::debug!("'{key}' continues after page {}", state.pages);
        }
    }

    fn send(&self, request: &ApiRequest, key: &NormalizedIntent) -> Result<ParsedPage, Error> {
        let response = self
            .transport
            .send(request)
            .map_err(|err| Error::Transient {
                status: None,
                reason: err.to_string(),
            })?;

        log::debug!(
            "'{key}' answered {} in {:?}",
            response.status,
            response.elapsed
        );

        parse_response(&response, key)
    }

    // The disambiguation page only flagged itself, its links are the candidates
    fn resolve_candidates(
        &self,
        key: &NormalizedIntent,
        title: String,
        deadline: Option<Instant>,
    ) -> Error {
        let links = key.with_operation(OperationKind::Links, Subject::Title(title.clone()));

        match self.cached_or_fetch(&links, deadline) {
            Ok(page) => Error::Disambiguation {
                title,
                candidates: page.links.into_iter().collect(),
            },
            Err(error) => error,
        }
    }
}

#[cfg(feature = "client")]
impl Default for RequestEngine {
    fn default() -> Self {
        Self::from_config(EngineConfig::default()).expect("Default ureq transport is not valid")
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::transport::{RawResponse, TransportError};
    use std::sync::Mutex;

    struct Scripted(Mutex<Vec<Result<RawResponse, TransportError>>>);

    impl Transport for Scripted {
        fn send(&self, _: &ApiRequest) -> Result<RawResponse, TransportError> {
            let mut responses = self.0.lock().expect("Transport lock poisoned");

            if responses.is_empty() {
                Err(TransportError::Connection("script ran out".to_string()))
            } else {
                responses.remove(0)
            }
        }
    }

    struct NoSleep;

    impl Sleeper for NoSleep {
        fn sleep(&self, _: std::time::Duration) {}
    }

    fn engine(responses: Vec<Result<RawResponse, TransportError>>) -> RequestEngine {
        RequestEngine::new(EngineConfig::default(), Scripted(Mutex::new(responses)))
            .with_sleeper(NoSleep)
    }

    #[test]
    fn transport_failures_become_transient() {
        let engine = engine(vec![
            Err(TransportError::TimedOut),
            Err(TransportError::TimedOut),
            Err(TransportError::TimedOut),
        ]);

        let error = engine
            .execute(&QueryIntent::summary("Waffle"))
            .expect_err("Timed out transport produced a page");

        let Error::Exhausted { attempts, last } = error else {
            panic!("Expected exhausted retries, got {error:?}");
        };

        assert_eq!(attempts, 3);
        assert_eq!(last.kind(), crate::ErrorKind::Transient);
    }

    #[test]
    fn malformed_intents_never_reach_the_transport() {
        let engine = engine(Vec::new());

        let error = engine
            .execute(&QueryIntent::summary("   "))
            .expect_err("Empty subject produced a page");

        assert_eq!(error.kind(), crate::ErrorKind::MalformedIntent);
        assert_eq!(engine.cache_stats().misses, 0);
    }

    #[test]
    fn search_stops_at_the_limit() {
        let engine = engine(vec![Ok(RawResponse::ok(
            r#"{"continue":{"sroffset":2,"continue":"-||"},"query":{"search":[
                {"title":"Waffle","pageid":1,"snippet":""},{"title":"Waffle iron","pageid":2,"snippet":""}]}}"#,
        ))]);

        let page = engine
            .execute(&QueryIntent::search("waffle").limit(2))
            .expect("Search failed");

        assert_eq!(page.search_hits.len(), 2);
        assert!(page.continuation.is_some());
    }
}
