use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};

static ERROR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)error|exception|traceback").unwrap());

/// Drop warning (and optionally error) lines from captured output text.
/// Indented lines following a matched line are treated as the rest of the
/// same warning block and dropped with it.
pub fn filter_output_text(
    text: &str,
    hide_warnings: bool,
    hide_errors: bool,
    warning_patterns: &[String],
) -> String {
    if text.is_empty() || !hide_warnings {
        return text.to_string();
    }

    let patterns: Vec<Regex> = warning_patterns
        .iter()
        .filter_map(|pattern| {
            RegexBuilder::new(pattern)
                .case_insensitive(true)
                .build()
                .ok()
        })
        .collect();

    let mut filtered: Vec<&str> = Vec::new();
    let mut skip_block = false;

    for line in text.split('\n') {
        let mut should_hide = patterns.iter().any(|re| re.is_match(line));
        if hide_errors && ERROR_RE.is_match(line) {
            should_hide = true;
        }
        if should_hide {
            skip_block = true;
            continue;
        }
        if skip_block {
            if line.starts_with(|c: char| c.is_whitespace()) && !line.is_empty() {
                continue;
            }
            skip_block = false;
        }
        filtered.push(line);
    }

    filtered.join("\n")
}
