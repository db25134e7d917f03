//! Helpers for raw wikitext, used by the operations that fetch page source
//! (sections, infoboxes, section-filtered content).

use itertools::Itertools;
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::LazyLock;

/// The title given to text that appears before the first heading
pub const INTRODUCTION: &str = "Introduction";

// `regex` has no backreferences, the closing run is checked against the opening one by hand
static HEADING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^(={2,6})[ \t]*(.+?)[ \t]*(={2,6})[ \t]*$")
        .expect("Failed to compile regex to find section headings")
});

static INFOBOX_START: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\{\{\s*infobox").expect("Failed to compile regex to find infoboxes")
});

static LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[\[([^\]|]+)(?:\|[^\]]+)?\]\]").expect("Failed to compile regex to find links")
});

static REFERENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<ref(?:\s[^>]*[^/])?>(.*?)</ref>")
        .expect("Failed to compile regex to find references")
});

static EMPTY_REFERENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)<ref[^>]*/>").expect("Failed to compile regex to find named references")
});

static TEMPLATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)\{\{(.*?)\}\}").expect("Failed to compile regex to find templates")
});

static INNERMOST_TEMPLATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{[^{}]*\}\}").expect("Failed to compile regex to find nested templates")
});

static FILE_LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\[\[(?:File|Image):[^\]]+\]\]")
        .expect("Failed to compile regex to find file links")
});

static PIPED_LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[\[(?:[^\]|]+\|)?([^\]]+)\]\]").expect("Failed to compile regex to unwrap links")
});

static BOLD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"'''(.*?)'''").expect("Failed to compile bold regex"));

static ITALIC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"''(.*?)''").expect("Failed to compile italic regex"));

/// One section of an article, with the text between its heading and the next heading
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub title: String,
    /// Heading depth, 2 for `== A ==` up to 6; the introduction is level 1
    pub level: u8,
    pub content: String,
    pub subsections: Vec<Section>,
}

impl Section {
    fn new(title: impl Into<String>, level: u8, content: impl Into<String>) -> Self {
        Section {
            title: title.into(),
            level,
            content: content.into(),
            subsections: Vec::new(),
        }
    }

    /// The section's own text followed by the text of every subsection
    pub fn text(&self) -> String {
        std::iter::once(self.content.clone())
            .chain(self.subsections.iter().map(Section::text))
            .filter(|part| !part.is_empty())
            .join("\n\n")
    }

    /// Depth-first search for a section title, ignoring case
    pub fn find<'a>(sections: &'a [Section], title: &str) -> Option<&'a Section> {
        let wanted = title.trim().to_lowercase();

        sections.iter().find_map(|section| {
            if section.title.to_lowercase() == wanted {
                Some(section)
            } else {
                Section::find(&section.subsections, title)
            }
        })
    }
}

/// Canonicalize a page title: underscores become spaces, runs of whitespace collapse
/// and the first letter is upper-cased.
pub fn normalize_title(title: &str) -> String {
    let collapsed = title.replace('_', " ").split_whitespace().join(" ");

    let mut chars = collapsed.chars();

    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => collapsed,
    }
}

/// Split wikitext into a tree of sections by its `==` headings
pub fn parse_sections(wikitext: &str) -> Vec<Section> {
    let headings = HEADING
        .captures_iter(wikitext)
        .filter_map(|capture| {
            let whole = capture.get(0)?;
            let opening = capture.get(1)?.as_str();
            let closing = capture.get(3)?.as_str();

            (opening.len() == closing.len()).then(|| {
                (
                    u8::try_from(opening.len()).unwrap_or(6),
                    capture[2].to_string(),
                    whole.start(),
                    whole.end(),
                )
            })
        })
        .collect::<Vec<_>>();

    let mut sections = Vec::new();

    let introduction = wikitext[..headings.first().map_or(wikitext.len(), |h| h.2)].trim();

    if !introduction.is_empty() || headings.is_empty() {
        sections.push(Section::new(INTRODUCTION, 1, introduction));
    }

    let mut open: Vec<Section> = Vec::new();

    for (index, (level, title, _, body_start)) in headings.iter().enumerate() {
        let body_end = headings
            .get(index + 1)
            .map_or(wikitext.len(), |next| next.2);

        let section = Section::new(title.clone(), *level, wikitext[*body_start..body_end].trim());

        while open.last().is_some_and(|last| last.level >= section.level) {
            close_section(&mut open, &mut sections);
        }

        open.push(section);
    }

    while !open.is_empty() {
        close_section(&mut open, &mut sections);
    }

    sections
}

fn close_section(open: &mut Vec<Section>, sections: &mut Vec<Section>) {
    if let Some(done) = open.pop() {
        match open.last_mut() {
            Some(parent) => parent.subsections.push(done),
            None => sections.push(done),
        }
    }
}

/// Key/value pairs of the first `{{Infobox ...}}` template, empty when there is none
pub fn parse_infobox(wikitext: &str) -> BTreeMap<String, String> {
    let Some(start) = INFOBOX_START.find(wikitext) else {
        return BTreeMap::new();
    };

    split_fields(template_body(&wikitext[start.start()..]))
        .into_iter()
        // The first field is the template name
        .skip(1)
        .filter_map(|field| {
            let (key, value) = field.split_once('=')?;
            let key = key.trim();

            (!key.is_empty()).then(|| (key.to_string(), value.trim().to_string()))
        })
        .collect()
}

// Text between the outer `{{` and its matching `}}`, `text` must start with `{{`
fn template_body(text: &str) -> &str {
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut index = 0;

    while index + 1 < bytes.len() {
        match &bytes[index..index + 2] {
            b"{{" => {
                depth += 1;
                index += 2;
            }
            b"}}" => {
                depth = depth.saturating_sub(1);
                index += 2;

                if depth == 0 {
                    return &text[2..index - 2];
                }
            }
            _ => index += 1,
        }
    }

    // Unclosed, take everything
    text.get(2..).unwrap_or_default()
}

// Split on `|` outside of nested templates and links
fn split_fields(body: &str) -> Vec<&str> {
    let bytes = body.as_bytes();
    let mut fields = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    let mut index = 0;

    while index < bytes.len() {
        let doubled = bytes.get(index + 1) == Some(&bytes[index]);

        match bytes[index] {
            b'{' | b'[' if doubled => {
                depth += 1;
                index += 2;
                continue;
            }
            b'}' | b']' if doubled => {
                depth = depth.saturating_sub(1);
                index += 2;
                continue;
            }
            b'|' if depth == 0 => {
                fields.push(&body[start..index]);
                start = index + 1;
            }
            _ => {}
        }

        index += 1;
    }

    fields.push(&body[start..]);

    fields
}

/// Targets of every internal `[[link]]`, in document order
pub fn parse_links(wikitext: &str) -> Vec<String> {
    LINK.captures_iter(wikitext)
        .map(|capture| capture[1].trim().to_string())
        .collect()
}

/// The contents of every `<ref>...</ref>` tag, in document order
pub fn parse_references(wikitext: &str) -> Vec<String> {
    REFERENCE
        .captures_iter(wikitext)
        .map(|capture| capture[1].trim().to_string())
        .collect()
}

/// The contents of every `{{template}}`, outermost nesting is not tracked
pub fn parse_templates(wikitext: &str) -> Vec<String> {
    TEMPLATE
        .captures_iter(wikitext)
        .map(|capture| capture[1].trim().to_string())
        .collect()
}

/// A rough plain text rendition of wikitext
pub fn clean_wikitext(wikitext: &str) -> String {
    let mut text = REFERENCE.replace_all(wikitext, "").into_owned();
    text = EMPTY_REFERENCE.replace_all(&text, "").into_owned();

    // Innermost first, so nested templates go too
    while INNERMOST_TEMPLATE.is_match(&text) {
        text = INNERMOST_TEMPLATE.replace_all(&text, "").into_owned();
    }

    text = FILE_LINK.replace_all(&text, "").into_owned();
    text = PIPED_LINK.replace_all(&text, "$1").into_owned();
    text = BOLD.replace_all(&text, "$1").into_owned();
    text = ITALIC.replace_all(&text, "$1").into_owned();

    text.trim().to_string()
}

#[cfg(test)]
mod test {
    use super::*;

    const ARTICLE: &str = "'''Multekrem''' is a Norwegian [[dessert]].<ref>Cookbook, p. 4</ref>

== History ==
Made with [[Rubus chamaemorus|cloudberries]].

=== Origins ===
From [[Norway]].{{citation needed|date=2020}}

== Serving ==
Served at [[Christmas]].<ref name=\"xmas\">Holiday guide</ref>";

    #[test]
    fn title_normalization() {
        assert_eq!(normalize_title("python_(programming language)"), "Python (programming language)");
        assert_eq!(normalize_title("  new   york  "), "New york");
        assert_eq!(normalize_title("new_york_city"), "New york city");
        assert_eq!(normalize_title("eBay"), "EBay");
        assert_eq!(normalize_title("ßtraße"), "SStraße");
        assert_eq!(normalize_title("   "), "");
    }

    #[test]
    fn sections_are_nested_by_level() {
        let sections = parse_sections(ARTICLE);

        let titles = sections.iter().map(|s| s.title.as_str()).collect::<Vec<_>>();
        assert_eq!(titles, [INTRODUCTION, "History", "Serving"]);

        let history = &sections[1];
        assert_eq!(history.level, 2);
        assert_eq!(history.content, "Made with [[Rubus chamaemorus|cloudberries]].");
        assert_eq!(history.subsections.len(), 1);
        assert_eq!(history.subsections[0].title, "Origins");
        assert_eq!(history.subsections[0].level, 3);
    }

    #[test]
    fn text_without_headings_is_one_introduction() {
        let sections = parse_sections("Just a stub.");

        assert_eq!(sections, vec![Section::new(INTRODUCTION, 1, "Just a stub.")]);
    }

    #[test]
    fn mismatched_heading_markers_are_not_headings() {
        let sections = parse_sections("Intro\n=== Broken ==\ntext");

        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].title, INTRODUCTION);
    }

    #[test]
    fn find_section_searches_subsections() {
        let sections = parse_sections(ARTICLE);

        let origins = Section::find(&sections, "origins").expect("Origins section is missing");
        assert_eq!(origins.title, "Origins");

        let history = Section::find(&sections, "History").expect("History section is missing");
        assert!(history.text().contains("From [[Norway]]"));

        assert!(Section::find(&sections, "Reception").is_none());
    }

    #[test]
    fn infobox_fields() {
        let wikitext = "{{Infobox food
| name = Multekrem
| country = [[Norway]]
| main_ingredient = {{plainlist|cloudberries|cream}}
}}
'''Multekrem''' is a dessert.";

        let infobox = parse_infobox(wikitext);

        assert_eq!(infobox.len(), 3);
        assert_eq!(infobox["name"], "Multekrem");
        assert_eq!(infobox["country"], "[[Norway]]");
        assert_eq!(infobox["main_ingredient"], "{{plainlist|cloudberries|cream}}");
    }

    #[test]
    fn no_infobox() {
        assert!(parse_infobox(ARTICLE).is_empty());
    }

    #[test]
    fn links_references_and_templates() {
        assert_eq!(
            parse_links(ARTICLE),
            ["dessert", "Rubus chamaemorus", "Norway", "Christmas"]
        );
        assert_eq!(parse_references(ARTICLE), ["Cookbook, p. 4", "Holiday guide"]);
        assert_eq!(parse_templates(ARTICLE), ["citation needed|date=2020"]);
    }

    #[test]
    fn self_closing_references_are_skipped() {
        let wikitext = "A<ref name=\"a\" />B<ref>Real</ref>";

        assert_eq!(parse_references(wikitext), ["Real"]);
    }

    #[test]
    fn cleaning_strips_markup() {
        let wikitext = "[[File:Multekrem.jpg|thumb|A bowl]]'''Multekrem''' is a ''Norwegian'' \
                        [[dessert|sweet]] {{lang|no|{{nested}}}}<ref>Source</ref>";

        assert_eq!(clean_wikitext(wikitext), "Multekrem is a Norwegian sweet");
    }
}
