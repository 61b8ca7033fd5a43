use once_cell::sync::Lazy;
use regex::Regex;

/// In-text citation marker: `[[N]](#refD)`. The bracketed number is the
/// authoritative join key; the anchor token may be stale in the source.
pub static CITATION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[\[(\d+)\]\]\(#(ref\d+)\)").unwrap());

/// Definition start at the beginning of a line: `<a id="refD"></a>[N] `.
/// The definition body runs from here to the next definition start (or end
/// of text), so multi-paragraph definitions are captured whole.
pub static DEFINITION_START_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?m)^<a\s+id="(ref\d+)"\s*></a>\[(\d+)\]\s*"#).unwrap());

/// Separator introducing a cell's local reference block:
/// a `---` line followed by a `**Références :**` line.
pub static SECTION_SEPARATOR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\s*---\s*\n\s*\*\*Références\s*:\*\*\s*\n").unwrap());

/// Manual page-break marker inserted in markdown source.
pub static PAGE_BREAK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<!--\s*PAGE_BREAK\s*-->").unwrap());

static TRAILING_PAREN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s*\([^)]+\)\s*\.?\s*$").unwrap());

static DOT_RUN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\.+").unwrap());

/// A citation occurrence in running prose.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Citation {
    pub local_num: u32,
    pub anchor: String,
}

/// A footnote-style definition declared in one cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Definition {
    pub anchor: String,
    pub local_num: u32,
    pub text: String,
}

/// Extract every citation marker from a cell's markdown text.
pub fn extract_citations(text: &str) -> Vec<Citation> {
    CITATION_RE
        .captures_iter(text)
        .map(|caps| Citation {
            local_num: caps[1].parse().unwrap_or(0),
            anchor: caps[2].to_string(),
        })
        .collect()
}

/// Extract every definition from a cell's markdown text, in order of
/// appearance. Anchor-only or number-only markup fails the pattern and is
/// treated as ordinary prose.
pub fn extract_definitions(text: &str) -> Vec<Definition> {
    let starts: Vec<regex::Captures> = DEFINITION_START_RE.captures_iter(text).collect();
    let mut definitions = Vec::with_capacity(starts.len());
    for (i, caps) in starts.iter().enumerate() {
        let body_start = caps.get(0).unwrap().end();
        let body_end = starts
            .get(i + 1)
            .map(|next| next.get(0).unwrap().start())
            .unwrap_or(text.len());
        definitions.push(Definition {
            anchor: caps[1].to_string(),
            local_num: caps[2].parse().unwrap_or(0),
            text: text[body_start..body_end].trim().to_string(),
        });
    }
    definitions
}

/// Normalize a definition for deduplication: strip page-break markers,
/// collapse a trailing parenthetical note to a single period, collapse dot
/// runs, and collapse all whitespace runs to single spaces.
pub fn normalize_for_dedup(text: &str) -> String {
    let no_breaks = PAGE_BREAK_RE.replace_all(text, "");
    let no_note = TRAILING_PAREN_RE.replace(&no_breaks, ".");
    let single_dots = DOT_RUN_RE.replace_all(&no_note, ".");
    single_dots.split_whitespace().collect::<Vec<_>>().join(" ")
}
