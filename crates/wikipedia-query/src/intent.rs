use crate::config::EngineConfig;
use crate::error::Error;
use crate::wikitext::normalize_title;
use isolang::Language;
use itertools::Itertools;
use std::fmt;
use std::time::Duration;

/// The largest page the provider serves to anonymous clients
pub const MAX_PAGE_SIZE: u32 = 500;

/// What a logical call asks the provider for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OperationKind {
    Search,
    Summary,
    Content,
    Images,
    Links,
    Categories,
    References,
    Sections,
    Infobox,
}

impl OperationKind {
    pub const ALL: [OperationKind; 9] = [
        Self::Search,
        Self::Summary,
        Self::Content,
        Self::Images,
        Self::Links,
        Self::Categories,
        Self::References,
        Self::Sections,
        Self::Infobox,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Search => "search",
            Self::Summary => "summary",
            Self::Content => "content",
            Self::Images => "images",
            Self::Links => "links",
            Self::Categories => "categories",
            Self::References => "references",
            Self::Sections => "sections",
            Self::Infobox => "infobox",
        }
    }

    /// Search rankings move around, article bodies rarely do
    pub fn default_ttl(self) -> Duration {
        match self {
            Self::Search => Duration::from_secs(5 * 60),
            Self::Summary => Duration::from_secs(60 * 60),
            _ => Duration::from_secs(6 * 60 * 60),
        }
    }

    /// Operations that return a list and accept a `limit`
    fn is_listing(self) -> bool {
        matches!(
            self,
            Self::Search | Self::Images | Self::Links | Self::Categories | Self::References
        )
    }

    fn allows(self, option: &'static str) -> bool {
        match option {
            "limit" => self.is_listing(),
            "offset" => self == Self::Search,
            "section" => self == Self::Content,
            _ => false,
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OperationKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| Error::malformed(format!("Unknown operation '{s}'")))
    }
}

/// What the call is about
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Subject {
    /// A page title, or the query text for searches
    Title(String),
    PageId(u64),
}

impl From<&str> for Subject {
    fn from(title: &str) -> Self {
        Subject::Title(title.to_string())
    }
}

impl From<String> for Subject {
    fn from(title: String) -> Self {
        Subject::Title(title)
    }
}

impl From<u64> for Subject {
    fn from(id: u64) -> Self {
        Subject::PageId(id)
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Subject::Title(title) => f.write_str(title),
            Subject::PageId(id) => write!(f, "#{id}"),
        }
    }
}

/// Optional knobs, each operation accepts only some of them
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct QueryOptions {
    /// Results per page (listings) or total results (search)
    pub limit: Option<u32>,
    /// Search result offset
    pub offset: Option<u32>,
    /// Restrict content to one section, matched by title
    pub section: Option<String>,
}

/// One logical request, as an accessor would phrase it
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryIntent {
    pub operation: OperationKind,
    pub subject: Subject,
    /// Falls back to the engine's configured language
    pub language: Option<Language>,
    pub options: QueryOptions,
}

impl QueryIntent {
    pub fn new(operation: OperationKind, subject: impl Into<Subject>) -> Self {
        QueryIntent {
            operation,
            subject: subject.into(),
            language: None,
            options: QueryOptions::default(),
        }
    }

    pub fn search(query: impl Into<String>) -> Self {
        Self::new(OperationKind::Search, Subject::Title(query.into()))
    }

    pub fn summary(subject: impl Into<Subject>) -> Self {
        Self::new(OperationKind::Summary, subject)
    }

    pub fn content(subject: impl Into<Subject>) -> Self {
        Self::new(OperationKind::Content, subject)
    }

    pub fn images(subject: impl Into<Subject>) -> Self {
        Self::new(OperationKind::Images, subject)
    }

    pub fn links(subject: impl Into<Subject>) -> Self {
        Self::new(OperationKind::Links, subject)
    }

    pub fn categories(subject: impl Into<Subject>) -> Self {
        Self::new(OperationKind::Categories, subject)
    }

    pub fn references(subject: impl Into<Subject>) -> Self {
        Self::new(OperationKind::References, subject)
    }

    pub fn sections(subject: impl Into<Subject>) -> Self {
        Self::new(OperationKind::Sections, subject)
    }

    pub fn infobox(subject: impl Into<Subject>) -> Self {
        Self::new(OperationKind::Infobox, subject)
    }

    pub fn language(self, language: Language) -> Self {
        Self {
            language: Some(language),
            ..self
        }
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.options.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u32) -> Self {
        self.options.offset = Some(offset);
        self
    }

    pub fn section(mut self, section: impl Into<String>) -> Self {
        self.options.section = Some(section.into());
        self
    }

    /// Canonicalize into the form used as a cache key
    ///
    /// # Errors
    ///
    /// [`Error::MalformedIntent`] when the subject is empty, the language has no
    /// ISO 639-1 code, or an option is set that the operation does not accept.
    pub fn normalize(&self, config: &EngineConfig) -> Result<NormalizedIntent, Error> {
        let operation = self.operation;

        let subject = match &self.subject {
            Subject::Title(text) => {
                let normalized = if operation == OperationKind::Search {
                    text.split_whitespace().join(" ")
                } else {
                    normalize_title(text)
                };

                if normalized.is_empty() {
                    return Err(Error::malformed("Subject is empty"));
                }

                Subject::Title(normalized)
            }
            Subject::PageId(_) if operation == OperationKind::Search => {
                return Err(Error::malformed("Search needs query text, not a page id"));
            }
            Subject::PageId(id) => Subject::PageId(*id),
        };

        let language = self.language.unwrap_or(config.language);

        let language = language
            .to_639_1()
            .ok_or_else(|| {
                Error::malformed(format!("Language '{}' has no iso 639-1 code", language.to_name()))
            })?
            .to_string();

        let QueryOptions {
            limit,
            offset,
            section,
        } = &self.options;

        for (name, is_set) in [
            ("limit", limit.is_some()),
            ("offset", offset.is_some()),
            ("section", section.is_some()),
        ] {
            if is_set && !operation.allows(name) {
                return Err(Error::malformed(format!(
                    "Option '{name}' is not accepted by '{operation}'"
                )));
            }
        }

        let limit = match (limit, operation) {
            (Some(0), _) => return Err(Error::malformed("Limit must be positive")),
            (Some(limit), _) => Some((*limit).min(MAX_PAGE_SIZE)),
            (None, OperationKind::Search) => Some(config.default_limit.clamp(1, MAX_PAGE_SIZE)),
            (None, _) if operation.is_listing() => Some(MAX_PAGE_SIZE),
            (None, _) => None,
        };

        let section = match section.as_deref().map(str::trim) {
            Some("") => return Err(Error::malformed("Section filter is empty")),
            // Section titles match case-insensitively
            Some(section) => Some(section.split_whitespace().join(" ").to_lowercase()),
            None => None,
        };

        Ok(NormalizedIntent {
            operation,
            subject,
            language,
            options: QueryOptions {
                limit,
                offset: *offset,
                section,
            },
        })
    }
}

/// A [`QueryIntent`] after canonicalization, two logically identical intents
/// always normalize to equal values
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NormalizedIntent {
    operation: OperationKind,
    subject: Subject,
    language: String,
    options: QueryOptions,
}

impl NormalizedIntent {
    pub fn operation(&self) -> OperationKind {
        self.operation
    }

    pub fn subject(&self) -> &Subject {
        &self.subject
    }

    /// ISO 639-1 code
    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn options(&self) -> &QueryOptions {
        &self.options
    }

    /// The same page and language, asking for a different operation with default options
    pub(crate) fn with_operation(&self, operation: OperationKind, subject: Subject) -> Self {
        NormalizedIntent {
            operation,
            subject,
            language: self.language.clone(),
            options: QueryOptions {
                limit: operation.is_listing().then_some(MAX_PAGE_SIZE),
                ..QueryOptions::default()
            },
        }
    }
}

impl fmt::Display for NormalizedIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.language, self.operation, self.subject)?;

        if let Some(limit) = self.options.limit {
            write!(f, ":limit={limit}")?;
        }

        if let Some(offset) = self.options.offset {
            write!(f, ":offset={offset}")?;
        }

        if let Some(section) = &self.options.section {
            write!(f, ":section={section}")?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn config() -> EngineConfig {
        EngineConfig::default()
    }

    #[test]
    fn titles_normalize_to_the_same_key() {
        let a = QueryIntent::summary("python_(programming   language)")
            .normalize(&config())
            .expect("Intent is valid");
        let b = QueryIntent::summary("  Python (programming language) ")
            .language(Language::from_639_1("en").expect("'en' exists"))
            .normalize(&config())
            .expect("Intent is valid");

        assert_eq!(a, b);
        assert_eq!(a.to_string(), "en:summary:Python (programming language)");
    }

    #[test]
    fn search_keeps_query_case() {
        let intent = QueryIntent::search("  rust   lang ")
            .normalize(&config())
            .expect("Intent is valid");

        assert_eq!(intent.subject(), &Subject::Title("rust lang".to_string()));
        assert_eq!(intent.options().limit, Some(10));
    }

    #[test]
    fn empty_subject_is_malformed() {
        let error = QueryIntent::links(" _ ")
            .normalize(&config())
            .expect_err("Empty subject accepted");

        assert_eq!(error.kind(), crate::ErrorKind::MalformedIntent);
    }

    #[test]
    fn limits_are_clamped_not_rejected() {
        let intent = QueryIntent::links("Multekrem")
            .limit(10_000)
            .normalize(&config())
            .expect("Intent is valid");

        assert_eq!(intent.options().limit, Some(MAX_PAGE_SIZE));

        assert!(QueryIntent::links("Multekrem").limit(0).normalize(&config()).is_err());
    }

    #[test]
    fn options_outside_the_allow_list_are_rejected() {
        assert!(QueryIntent::summary("Multekrem").limit(3).normalize(&config()).is_err());
        assert!(QueryIntent::links("Multekrem").section("History").normalize(&config()).is_err());
        assert!(QueryIntent::content("Multekrem").section("  ").normalize(&config()).is_err());
        assert!(QueryIntent::search("waffle").offset(20).normalize(&config()).is_ok());
    }

    #[test]
    fn section_filters_ignore_case_and_spacing() {
        let a = QueryIntent::content("Multekrem")
            .section("History")
            .normalize(&config())
            .expect("Intent is valid");
        let b = QueryIntent::content("Multekrem")
            .section("  hiSTORY ")
            .normalize(&config())
            .expect("Intent is valid");

        assert_eq!(a, b);
        assert_eq!(a.to_string(), "en:content:Multekrem:section=history");
    }

    #[test]
    fn page_ids_cannot_be_searched() {
        assert!(QueryIntent::new(OperationKind::Search, 42u64).normalize(&config()).is_err());
        assert!(QueryIntent::summary(42u64).normalize(&config()).is_ok());
    }

    #[test]
    fn unknown_operations_are_malformed() {
        assert_eq!("Images".parse::<OperationKind>(), Ok(OperationKind::Images));
        assert!("thumbnails".parse::<OperationKind>().is_err());
    }
}
