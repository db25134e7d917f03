//! Classifies raw responses and extracts the fields an intent asked for.
//!
//! Parsing is pure: the same bytes and the same intent always give the same result.

use crate::error::Error;
use crate::intent::{NormalizedIntent, OperationKind};
use crate::page::{Continuation, ParsedPage, SearchHit, file_url};
use crate::transport::RawResponse;
use crate::wikitext::{Section, clean_wikitext, parse_infobox, parse_sections};
use http::StatusCode;
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;

const NOT_FOUND_CODES: [&str; 3] = ["missingtitle", "nosuchpageid", "pagecannotexist"];

const RATE_LIMIT_CODES: [&str; 2] = ["ratelimited", "maxlag"];

/// Turn one response into a page, or the classified reason it isn't one
pub fn parse_response(
    response: &RawResponse,
    intent: &NormalizedIntent,
) -> Result<ParsedPage, Error> {
    let status = response.status;

    if status.is_server_error() {
        return Err(Error::Transient {
            status: Some(status.as_u16()),
            reason: status
                .canonical_reason()
                .unwrap_or("Server error")
                .to_string(),
        });
    }

    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(Error::RateLimited {
            retry_after: retry_after_header(response),
        });
    }

    let payload = match serde_json::from_slice::<Value>(&response.body) {
        Ok(payload) => payload,
        Err(_) if !status.is_success() => return Err(http_error(status)),
        Err(err) => return Err(Error::Decode(err.to_string())),
    };

    if let Some(error) = payload.get("error") {
        return Err(classify_api_error(error, response, intent));
    }

    if !status.is_success() {
        return Err(http_error(status));
    }

    let continuation = parse_continuation(&payload);

    if intent.operation() == OperationKind::Search {
        return Ok(parse_search(&payload, intent, continuation));
    }

    parse_page(&payload, intent, continuation)
}

fn http_error(status: StatusCode) -> Error {
    Error::ProviderError {
        code: format!("http-{}", status.as_u16()),
        info: status.canonical_reason().unwrap_or_default().to_string(),
    }
}

// Only the delta-seconds form, an HTTP date is ignored
fn retry_after_header(response: &RawResponse) -> Option<Duration> {
    response
        .headers
        .get(http::header::RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

fn classify_api_error(error: &Value, response: &RawResponse, intent: &NormalizedIntent) -> Error {
    let code = error
        .get("code")
        .and_then(Value::as_str)
        .unwrap_or("unknown_error");

    let info = error
        .get("info")
        .and_then(Value::as_str)
        .unwrap_or_default();

    if NOT_FOUND_CODES.contains(&code) {
        return Error::NotFound {
            subject: intent.subject().to_string(),
        };
    }

    if RATE_LIMIT_CODES.contains(&code) {
        // maxlag reports how far behind the replicas are
        let lag = error
            .get("lag")
            .and_then(Value::as_f64)
            .filter(|lag| lag.is_finite() && *lag >= 0.0)
            .map(Duration::from_secs_f64);

        return Error::RateLimited {
            retry_after: retry_after_header(response).or(lag),
        };
    }

    Error::ProviderError {
        code: code.to_string(),
        info: info.to_string(),
    }
}

fn parse_continuation(payload: &Value) -> Option<Continuation> {
    let params = payload
        .get("continue")?
        .as_object()?
        .iter()
        .filter_map(|(name, value)| {
            let value = match value {
                Value::String(value) => value.clone(),
                Value::Number(value) => value.to_string(),
                _ => return None,
            };

            Some((name.clone(), value))
        })
        .collect::<BTreeMap<_, _>>();

    (!params.is_empty()).then(|| Continuation::new(params))
}

fn parse_search(
    payload: &Value,
    intent: &NormalizedIntent,
    continuation: Option<Continuation>,
) -> ParsedPage {
    let search_hits = payload
        .pointer("/query/search")
        .and_then(Value::as_array)
        .map(|hits| {
            hits.iter()
                .filter_map(|hit| {
                    Some(SearchHit {
                        title: hit.get("title")?.as_str()?.to_string(),
                        page_id: hit.get("pageid").and_then(Value::as_u64),
                        snippet: hit
                            .get("snippet")
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .to_string(),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    ParsedPage {
        title: intent.subject().to_string(),
        language: intent.language().to_string(),
        search_hits,
        continuation,
        ..Default::default()
    }
}

fn parse_page(
    payload: &Value,
    intent: &NormalizedIntent,
    continuation: Option<Continuation>,
) -> Result<ParsedPage, Error> {
    let not_found = || Error::NotFound {
        subject: intent.subject().to_string(),
    };

    let page = payload
        .pointer("/query/pages/0")
        .ok_or_else(not_found)?;

    if is_flag_set(page, "invalid") {
        return Err(Error::ProviderError {
            code: "invalidtitle".to_string(),
            info: page
                .get("invalidreason")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        });
    }

    if is_flag_set(page, "missing") {
        return Err(not_found());
    }

    let title = page
        .get("title")
        .and_then(Value::as_str)
        .map_or_else(|| intent.subject().to_string(), str::to_string);

    let operation = intent.operation();

    if operation != OperationKind::Links && page.pointer("/pageprops/disambiguation").is_some() {
        return Err(Error::Disambiguation {
            candidates: titles(page, "links").collect(),
            title,
        });
    }

    let mut parsed = ParsedPage {
        id: page.get("pageid").and_then(Value::as_u64),
        title,
        language: intent.language().to_string(),
        continuation,
        ..Default::default()
    };

    match operation {
        OperationKind::Summary => parsed.summary = extract(page),
        OperationKind::Content => match &intent.options().section {
            None => parsed.content = extract(page),
            Some(section) => {
                let sections = parse_sections(wikitext(page));

                let found = Section::find(&sections, section).ok_or_else(|| Error::NotFound {
                    subject: format!("{}#{section}", parsed.title),
                })?;

                parsed.content = Some(clean_wikitext(&found.text()));
            }
        },
        OperationKind::Sections => parsed.sections = parse_sections(wikitext(page)),
        OperationKind::Infobox => parsed.infobox = parse_infobox(wikitext(page)),
        OperationKind::Images => {
            parsed.images = titles(page, "images")
                .map(|file| {
                    file_url(intent.language(), &file)
                        .map_err(|err| Error::malformed(format!("{err}: '{}'", intent.language())))
                })
                .collect::<Result<_, _>>()?;
        }
        OperationKind::Links => parsed.links = titles(page, "links").collect(),
        OperationKind::Categories => {
            parsed.categories = titles(page, "categories")
                .map(|category| match category.split_once(':') {
                    Some((_, name)) => name.to_string(),
                    None => category,
                })
                .collect();
        }
        OperationKind::References => {
            parsed.references = page
                .get("extlinks")
                .and_then(Value::as_array)
                .map(|links| {
                    links
                        .iter()
                        // formatversion=1 keys the URL as "*"
                        .filter_map(|link| link.get("url").or_else(|| link.get("*")))
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default();
        }
        OperationKind::Search => {}
    }

    Ok(parsed)
}

// formatversion=2 uses `true`, formatversion=1 an empty string
fn is_flag_set(page: &Value, flag: &str) -> bool {
    page.get(flag)
        .is_some_and(|value| value.as_bool() != Some(false))
}

fn extract(page: &Value) -> Option<String> {
    page.get("extract")
        .and_then(Value::as_str)
        .map(|extract| extract.trim().to_string())
}

fn wikitext(page: &Value) -> &str {
    page.pointer("/revisions/0/slots/main/content")
        .or_else(|| page.pointer("/revisions/0/content"))
        .and_then(Value::as_str)
        .unwrap_or_default()
}

fn titles<'a>(page: &'a Value, field: &'static str) -> impl Iterator<Item = String> + 'a {
    page.get(field)
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|entry| entry.get("title").and_then(Value::as_str))
        .map(str::to_string)
}
