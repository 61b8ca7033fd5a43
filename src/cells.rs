use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::config::Config;
use crate::notebook::Cell;

/// Python import statement at the start of a line.
static IMPORT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(import\s+\w+|from\s+\w+[\.\w]*\s+import\b)").unwrap());

static FENCE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*```").unwrap());

fn has_any_tag(cell: &Cell, tags: &[String]) -> bool {
    tags.iter().any(|tag| cell.has_tag(tag))
}

pub fn should_remove_cell(cell: &Cell, config: &Config) -> bool {
    has_any_tag(cell, &config.remove_cells_with_tag)
}

/// Partial-code tags take precedence: a partially shown cell is never
/// hidden outright.
pub fn should_hide_code(cell: &Cell, config: &Config) -> bool {
    if !cell.is_code() {
        return false;
    }
    if has_any_tag(cell, &config.partial_code_with_tag) {
        return false;
    }
    if has_any_tag(cell, &config.hide_code_with_tag) {
        return true;
    }
    config.hide_code_by_default && !has_any_tag(cell, &config.show_outputs_with_tag)
}

/// Outputs can be hidden independently of the code being visible.
pub fn should_hide_output(cell: &Cell, config: &Config) -> bool {
    cell.is_code() && has_any_tag(cell, &config.hide_output_with_tag)
}

pub fn should_partial_code(cell: &Cell, config: &Config) -> bool {
    if !cell.is_code() {
        return false;
    }
    if has_any_tag(cell, &config.partial_code_with_tag) {
        return true;
    }
    config.partial_code_by_default && !has_any_tag(cell, &config.show_outputs_with_tag)
}

/// Keep the first and last lines of a code cell, replacing the middle with
/// a separator line carrying the omitted-line count.
pub fn apply_partial_code(cell: &mut Cell, config: &Config) {
    if !cell.is_code() || cell.source().is_empty() {
        return;
    }
    let head_count = config.partial_code_head_lines;
    let tail_count = config.partial_code_tail_lines;

    let source = cell.source().to_string();
    let lines: Vec<&str> = source.lines().collect();
    let total = lines.len();
    if total <= head_count + tail_count {
        return;
    }

    let omitted = total - head_count - tail_count;
    let separator = config
        .partial_code_separator_text
        .replace("{count}", &omitted.to_string());
    let truncated = format!(
        "{}\n{}\n{}",
        lines[..head_count].join("\n"),
        separator,
        lines[total - tail_count..].join("\n")
    );

    cell.set_source(truncated);
    cell.annotate("partial_code", Value::Bool(true));
    cell.annotate("lines_omitted", Value::from(omitted));
}

/// A code cell whose every non-comment line is an import statement.
pub fn is_import_only_cell(cell: &Cell) -> bool {
    if !cell.is_code() {
        return false;
    }
    let lines: Vec<&str> = cell
        .source()
        .lines()
        .filter(|line| !line.trim().is_empty())
        .collect();
    if lines.is_empty() {
        return false;
    }
    for line in lines {
        let stripped = line.trim();
        if stripped.starts_with('#') {
            continue;
        }
        if !IMPORT_RE.is_match(stripped) {
            return false;
        }
    }
    true
}

/// Strip the import block at the top of a code cell, keeping everything
/// from the first non-import statement on.
pub fn hide_leading_imports(cell: &mut Cell) {
    if !cell.is_code() || cell.source().is_empty() {
        return;
    }
    let source = cell.source().to_string();
    let lines: Vec<&str> = source.lines().collect();

    let mut first_non_import = None;
    for (i, line) in lines.iter().enumerate() {
        let stripped = line.trim();
        if stripped.is_empty() || stripped.starts_with('#') {
            continue;
        }
        if !IMPORT_RE.is_match(stripped) {
            first_non_import = Some(i);
            break;
        }
    }

    // All imports, or no leading import block at all.
    let Some(idx) = first_non_import else { return };
    if idx == 0 {
        return;
    }

    let mut remaining = &lines[idx..];
    while let [first, rest @ ..] = remaining {
        if first.trim().is_empty() {
            remaining = rest;
        } else {
            break;
        }
    }

    cell.set_source(remaining.join("\n"));
    cell.annotate("leading_imports_hidden", Value::Bool(true));
}

/// Re-wrap markdown paragraphs to `max_len` columns, breaking only on
/// spaces. Fenced code blocks pass through untouched.
pub fn reflow_markdown(text: &str, max_len: usize) -> String {
    let mut out: Vec<String> = Vec::new();
    let mut paragraph: Vec<&str> = Vec::new();
    let mut in_fence = false;

    let flush = |paragraph: &mut Vec<&str>, out: &mut Vec<String>| {
        if paragraph.is_empty() {
            return;
        }
        let combined = paragraph
            .iter()
            .map(|line| line.trim())
            .collect::<Vec<_>>()
            .join(" ");
        out.extend(wrap_on_spaces(&combined, max_len));
        paragraph.clear();
    };

    for line in text.split('\n') {
        if FENCE_RE.is_match(line) {
            flush(&mut paragraph, &mut out);
            out.push(line.to_string());
            in_fence = !in_fence;
            continue;
        }
        if in_fence {
            out.push(line.to_string());
            continue;
        }
        if line.trim().is_empty() {
            flush(&mut paragraph, &mut out);
            out.push(String::new());
        } else {
            paragraph.push(line);
        }
    }
    flush(&mut paragraph, &mut out);
    out.join("\n")
}

/// Greedy wrap on whitespace; words longer than the limit stay whole.
fn wrap_on_spaces(text: &str, max_len: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    let mut current_width = 0;

    for word in text.split_whitespace() {
        let word_width = word.chars().count();
        if current.is_empty() {
            current.push_str(word);
            current_width = word_width;
        } else if current_width + 1 + word_width <= max_len {
            current.push(' ');
            current.push_str(word);
            current_width += 1 + word_width;
        } else {
            lines.push(std::mem::take(&mut current));
            current.push_str(word);
            current_width = word_width;
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    if lines.is_empty() {
        lines.push(text.to_string());
    }
    lines
}

pub fn has_long_lines(cell: &Cell, config: &Config) -> bool {
    if !cell.is_code() {
        return false;
    }
    cell.source()
        .lines()
        .any(|line| line.chars().count() > config.long_line_threshold)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code_cell(source: &str, tags: &[&str]) -> Cell {
        serde_json::from_value(serde_json::json!({
            "cell_type": "code",
            "metadata": {"tags": tags},
            "execution_count": null,
            "outputs": [],
            "source": source
        }))
        .unwrap()
    }

    #[test]
    fn partial_tag_wins_over_hide_tag() {
        let config = Config::default();
        let cell = code_cell("x = 1", &["hide_code", "partial_code"]);
        assert!(!should_hide_code(&cell, &config));
        assert!(should_partial_code(&cell, &config));
    }

    #[test]
    fn hide_by_default_respects_show_tag() {
        let mut config = Config::default();
        config.hide_code_by_default = true;
        assert!(should_hide_code(&code_cell("x = 1", &[]), &config));
        assert!(!should_hide_code(&code_cell("x = 1", &["show_output"]), &config));
    }

    #[test]
    fn partial_code_keeps_head_and_tail() {
        let config = Config::default();
        let mut cell = code_cell("a\nb\nc\nd\ne\nf\ng", &["partial_code"]);
        apply_partial_code(&mut cell, &config);
        assert_eq!(cell.source(), "a\nb\n# ═══ [3 lignes omises] ═══\nf\ng");
        let meta = &cell.common().metadata.additional;
        assert_eq!(meta["smart_exporter"]["lines_omitted"], 3);
    }

    #[test]
    fn partial_code_skips_short_cells() {
        let config = Config::default();
        let mut cell = code_cell("a\nb\nc\nd", &["partial_code"]);
        apply_partial_code(&mut cell, &config);
        assert_eq!(cell.source(), "a\nb\nc\nd");
    }

    #[test]
    fn import_only_detection() {
        assert!(is_import_only_cell(&code_cell(
            "import numpy as np\n# comment\nfrom pathlib import Path",
            &[]
        )));
        assert!(!is_import_only_cell(&code_cell(
            "import numpy as np\nx = 1",
            &[]
        )));
        assert!(!is_import_only_cell(&code_cell("", &[])));
    }

    #[test]
    fn leading_imports_are_stripped() {
        let mut cell = code_cell(
            "import numpy as np\nimport pandas as pd\n\ndef f():\n    pass",
            &[],
        );
        hide_leading_imports(&mut cell);
        assert_eq!(cell.source(), "def f():\n    pass");
    }

    #[test]
    fn import_only_cell_is_left_for_removal_rule() {
        let mut cell = code_cell("import numpy as np\nimport pandas as pd", &[]);
        hide_leading_imports(&mut cell);
        assert_eq!(cell.source(), "import numpy as np\nimport pandas as pd");
    }

    #[test]
    fn reflow_wraps_paragraphs_without_breaking_words() {
        let text = "one two three four five six seven eight nine ten";
        let wrapped = reflow_markdown(text, 20);
        for line in wrapped.lines() {
            assert!(line.chars().count() <= 20, "line too long: {line:?}");
        }
        assert_eq!(wrapped.replace('\n', " "), text);
    }

    #[test]
    fn reflow_joins_continuation_lines() {
        let text = "first part\nsecond part\n\nnext paragraph";
        assert_eq!(
            reflow_markdown(text, 120),
            "first part second part\n\nnext paragraph"
        );
    }

    #[test]
    fn reflow_leaves_fenced_code_alone() {
        let text = "prose\n\n```python\nx = 'a very very very long line'\ny = 2\n```\nafter";
        let wrapped = reflow_markdown(text, 10);
        assert!(wrapped.contains("x = 'a very very very long line'\ny = 2"));
        assert!(wrapped.starts_with("prose"));
    }

    #[test]
    fn overlong_word_is_not_broken() {
        let word = "a".repeat(50);
        assert_eq!(reflow_markdown(&word, 10), word);
    }

    #[test]
    fn long_line_detection() {
        let mut config = Config::default();
        config.long_line_threshold = 10;
        assert!(has_long_lines(&code_cell("short\n0123456789012", &[]), &config));
        assert!(!has_long_lines(&code_cell("short", &[]), &config));
    }
}
