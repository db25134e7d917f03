//! Translates a normalized intent into the provider's query vocabulary.

use crate::config::EngineConfig;
use crate::error::Error;
use crate::intent::{NormalizedIntent, OperationKind, Subject};
use crate::page::Continuation;
use crate::transport::ApiRequest;
use http::Method;
use std::collections::BTreeMap;

/// Queries longer than this go out as POST forms
const MAX_GET_QUERY_LEN: usize = 2000;

/// Build the request for one page of `intent`
///
/// `continuation` is the marker from the previous page of the same call, its parameters
/// are echoed back verbatim and win over anything computed here.
///
/// # Errors
///
/// [`Error::MalformedIntent`] if the configured endpoint does not form a valid URL
/// for the intent's language.
pub fn build_request(
    intent: &NormalizedIntent,
    config: &EngineConfig,
    continuation: Option<&Continuation>,
) -> Result<ApiRequest, Error> {
    let url = config.endpoint_for(intent.language()).map_err(|err| {
        Error::malformed(format!(
            "No valid endpoint for language '{}': {err}",
            intent.language()
        ))
    })?;

    let mut params = BTreeMap::new();

    for (name, value) in &config.extra_params {
        params.insert(name.clone(), value.clone());
    }

    params.extend(operation_params(intent));

    if let Some(continuation) = continuation {
        for (name, value) in continuation.params() {
            params.insert(name.to_string(), value.to_string());
        }
    }

    let params = params.into_iter().collect::<Vec<_>>();

    let query_len = params
        .iter()
        .map(|(name, value)| name.len() + value.len() + 2)
        .sum::<usize>();

    Ok(ApiRequest {
        method: if query_len > MAX_GET_QUERY_LEN {
            Method::POST
        } else {
            Method::GET
        },
        url,
        params,
        headers: config.headers().clone(),
    })
}

fn operation_params(intent: &NormalizedIntent) -> Vec<(String, String)> {
    let mut params = vec![
        ("action", "query".to_string()),
        ("format", "json".to_string()),
        ("formatversion", "2".to_string()),
    ];

    let limit = intent.options().limit.map(|limit| limit.to_string());

    match intent.operation() {
        OperationKind::Search => {
            params.push(("list", "search".to_string()));
            params.push(("srsearch", intent.subject().to_string()));
            params.push(("srprop", "snippet".to_string()));
            params.extend(limit.map(|limit| ("srlimit", limit)));
            params.extend(
                intent
                    .options()
                    .offset
                    .map(|offset| ("sroffset", offset.to_string())),
            );

            return into_owned(params);
        }
        OperationKind::Summary => {
            params.push(("prop", "extracts|pageprops".to_string()));
            params.push(("exintro", "1".to_string()));
            params.push(("explaintext", "1".to_string()));
        }
        OperationKind::Content if intent.options().section.is_none() => {
            params.push(("prop", "extracts|pageprops".to_string()));
            params.push(("explaintext", "1".to_string()));
        }
        OperationKind::Content | OperationKind::Sections | OperationKind::Infobox => {
            params.push(("prop", "revisions|pageprops".to_string()));
            params.push(("rvprop", "content".to_string()));
            params.push(("rvslots", "main".to_string()));
        }
        OperationKind::Images => {
            params.push(("prop", "images|pageprops".to_string()));
            params.extend(limit.map(|limit| ("imlimit", limit)));
        }
        OperationKind::Links => {
            params.push(("prop", "links".to_string()));
            params.push(("plnamespace", "0".to_string()));
            params.extend(limit.map(|limit| ("pllimit", limit)));
        }
        OperationKind::Categories => {
            params.push(("prop", "categories|pageprops".to_string()));
            params.extend(limit.map(|limit| ("cllimit", limit)));
        }
        OperationKind::References => {
            params.push(("prop", "extlinks|pageprops".to_string()));
            params.extend(limit.map(|limit| ("ellimit", limit)));
        }
    }

    // Everything below is a page operation
    params.push(("redirects", "1".to_string()));

    if intent.operation() != OperationKind::Links {
        params.push(("ppprop", "disambiguation".to_string()));
    }

    match intent.subject() {
        Subject::Title(title) => params.push(("titles", title.clone())),
        Subject::PageId(id) => params.push(("pageids", id.to_string())),
    }

    into_owned(params)
}

fn into_owned(params: Vec<(&'static str, String)>) -> Vec<(String, String)> {
    params
        .into_iter()
        .map(|(name, value)| (name.to_string(), value))
        .collect()
}
