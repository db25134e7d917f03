use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use wikipedia_query::{
    ApiRequest, EngineConfig, RawResponse, RequestEngine, Sleeper, Transport, TransportError,
};

type Scripted = Result<RawResponse, TransportError>;

/// Serves scripted responses in order and remembers what was asked
///
/// Once the script runs out the fallback is served forever, or a connection error if
/// there is none.
#[derive(Default)]
pub struct FixtureTransport {
    script: Mutex<VecDeque<Scripted>>,
    fallback: Option<Scripted>,
    requests: Mutex<Vec<ApiRequest>>,
}

impl FixtureTransport {
    pub fn new(script: impl IntoIterator<Item = Scripted>) -> Arc<Self> {
        Arc::new(FixtureTransport {
            script: Mutex::new(script.into_iter().collect()),
            ..Default::default()
        })
    }

    pub fn repeating(response: Scripted) -> Arc<Self> {
        Arc::new(FixtureTransport {
            fallback: Some(response),
            ..Default::default()
        })
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().expect("Request log poisoned").len()
    }

    pub fn requests(&self) -> Vec<ApiRequest> {
        self.requests.lock().expect("Request log poisoned").clone()
    }
}

impl Transport for FixtureTransport {
    fn send(&self, request: &ApiRequest) -> Result<RawResponse, TransportError> {
        self.requests
            .lock()
            .expect("Request log poisoned")
            .push(request.clone());

        let next = self.script.lock().expect("Script poisoned").pop_front();

        next.or_else(|| self.fallback.clone())
            .unwrap_or_else(|| Err(TransportError::Connection("Script ran out".to_string())))
    }
}

/// Records the waits it is asked for instead of sleeping
#[derive(Default, Clone)]
pub struct RecordingSleeper(Arc<Mutex<Vec<Duration>>>);

impl RecordingSleeper {
    pub fn slept(&self) -> Vec<Duration> {
        self.0.lock().expect("Sleeper lock poisoned").clone()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        self.0.lock().expect("Sleeper lock poisoned").push(duration);
    }
}

pub fn init_logging() {
    // Several tests in one binary race to install it
    let _ = pretty_env_logger::try_init();
}

pub fn engine_with(
    config: EngineConfig,
    transport: &Arc<FixtureTransport>,
) -> (RequestEngine, RecordingSleeper) {
    init_logging();

    let sleeper = RecordingSleeper::default();

    let engine = RequestEngine::new(config, Arc::clone(transport)).with_sleeper(sleeper.clone());

    (engine, sleeper)
}

pub fn engine(transport: &Arc<FixtureTransport>) -> (RequestEngine, RecordingSleeper) {
    engine_with(EngineConfig::default(), transport)
}

pub fn ok(body: impl Into<Vec<u8>>) -> Scripted {
    Ok(RawResponse::ok(body))
}

pub const PYTHON_SUMMARY: &str = r#"{
    "batchcomplete": true,
    "query": {
        "normalized": [{"fromencoded": false, "from": "python (programming language)", "to": "Python (programming language)"}],
        "pages": [{
            "pageid": 23862,
            "ns": 0,
            "title": "Python (programming language)",
            "extract": "Python is a high-level, general-purpose programming language. Its design philosophy emphasizes code readability with the use of significant indentation.\n"
        }]
    }
}"#;

pub const MULTEKREM_MISSING: &str = r#"{
    "batchcomplete": true,
    "query": {"pages": [{"ns": 0, "title": "Multekrem (dessert)", "missing": true}]}
}"#;

/// One page of an images continuation chain
pub fn images_page(files: &[&str], next: Option<&str>) -> String {
    let images = files
        .iter()
        .map(|file| serde_json::json!({"ns": 6, "title": format!("File:{file}")}))
        .collect::<Vec<_>>();

    let mut body = serde_json::json!({
        "query": {"pages": [{"pageid": 736, "ns": 0, "title": "Multekrem", "images": images}]}
    });

    if let Some(next) = next {
        body["continue"] = serde_json::json!({"imcontinue": next, "continue": "||"});
    }

    body.to_string()
}

/// A disambiguation page, optionally listing its links
pub fn disambiguation_page(title: &str, links: Option<&[&str]>) -> String {
    let mut page = serde_json::json!({
        "pageid": 19694,
        "ns": 0,
        "title": title,
        "pageprops": {"disambiguation": ""}
    });

    if let Some(links) = links {
        page["links"] = links
            .iter()
            .map(|link| serde_json::json!({"ns": 0, "title": link}))
            .collect::<serde_json::Value>();
    }

    serde_json::json!({"query": {"pages": [page]}}).to_string()
}

pub fn links_page(title: &str, links: &[&str]) -> String {
    let links = links
        .iter()
        .map(|link| serde_json::json!({"ns": 0, "title": link}))
        .collect::<Vec<_>>();

    serde_json::json!({
        "batchcomplete": true,
        "query": {"pages": [{"pageid": 19694, "ns": 0, "title": title, "links": links}]}
    })
    .to_string()
}
