use crate::wikitext::Section;
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;
use url::Url;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Language has no valid iso 639-1 code")]
pub struct LanguageInvalidError;

/// The opaque marker the provider hands out when more results exist
///
/// Its parameters are echoed back unchanged on the next request of the same call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Continuation(BTreeMap<String, String>);

impl Continuation {
    pub fn new(params: BTreeMap<String, String>) -> Self {
        Continuation(params)
    }

    pub fn params(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(name, value)| (name.as_str(), value.as_str()))
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// One search result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchHit {
    pub title: String,
    pub page_id: Option<u64>,
    /// Provider highlighted excerpt, may contain markup
    pub snippet: String,
}

/// The typed result of a logical call
///
/// Only the fields belonging to the requested operation are filled in, everything
/// else stays empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedPage {
    pub id: Option<u64>,
    /// The canonical title, or the normalized query for searches
    pub title: String,
    /// ISO 639-1 code of the wiki the page came from
    pub language: String,
    pub summary: Option<String>,
    pub content: Option<String>,
    pub images: Vec<Url>,
    pub links: BTreeSet<String>,
    pub categories: BTreeSet<String>,
    pub references: Vec<String>,
    pub sections: Vec<Section>,
    pub infobox: BTreeMap<String, String>,
    pub search_hits: Vec<SearchHit>,
    pub continuation: Option<Continuation>,
}

impl ParsedPage {
    // This is called 'pathinfo' it's the part of the url after /wiki/
    pub fn pathinfo(&self) -> String {
        self.title.replace(' ', "_")
    }

    /// The article URL on the page's own wiki
    pub fn url(&self) -> Result<Url, LanguageInvalidError> {
        wiki_url(&self.language, &[&self.pathinfo()])
    }

    /// Fold a continuation page into this one
    ///
    /// Ordered fields are appended in arrival order, set fields are de-duplicated by title.
    pub(crate) fn absorb(&mut self, next: ParsedPage) {
        if self.id.is_none() {
            self.id = next.id;
        }

        if self.title.is_empty() {
            self.title = next.title;
        }

        if self.summary.is_none() {
            self.summary = next.summary;
        }

        if self.content.is_none() {
            self.content = next.content;
        }

        self.images.extend(next.images);
        self.links.extend(next.links);
        self.categories.extend(next.categories);
        self.references.extend(next.references);
        self.search_hits.extend(next.search_hits);

        if self.sections.is_empty() {
            self.sections = next.sections;
        }

        for (key, value) in next.infobox {
            self.infobox.entry(key).or_insert(value);
        }

        self.continuation = next.continuation;
    }
}

/// `https://<code>.wikipedia.org/wiki/`
pub fn wikipedia_base(language_code: &str) -> Result<Url, LanguageInvalidError> {
    if language_code.is_empty()
        || !language_code
            .chars()
            .all(|c| c.is_ascii_lowercase() || c == '-')
    {
        return Err(LanguageInvalidError);
    }

    Url::parse(format!("https://{language_code}.wikipedia.org/wiki/").as_str())
        .map_err(|_| LanguageInvalidError)
}

// Some langs don't have an iso 639-1
pub fn wikipedia_base_with_language(
    language: isolang::Language,
) -> Result<Url, LanguageInvalidError> {
    wikipedia_base(language.to_639_1().ok_or(LanguageInvalidError)?)
}

/// The URL that serves the raw bytes of a file, e.g. `File:Multekrem.jpg`
pub fn file_url(language_code: &str, file_title: &str) -> Result<Url, LanguageInvalidError> {
    // Drop the localized namespace ("File:", "Datei:", ...)
    let name = file_title
        .split_once(':')
        .map_or(file_title, |(_, name)| name)
        .replace(' ', "_");

    wiki_url(language_code, &["Special:FilePath", &name])
}

// Pushing segments instead of joining keeps titles like "Category:X" from parsing as a scheme
fn wiki_url(language_code: &str, segments: &[&str]) -> Result<Url, LanguageInvalidError> {
    let mut url = wikipedia_base(language_code)?;

    url.path_segments_mut()
        .map_err(|()| LanguageInvalidError)?
        .pop_if_empty()
        .extend(segments);

    Ok(url)
}
