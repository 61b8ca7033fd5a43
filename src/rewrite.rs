use serde_json::Value;

use crate::markers::{CITATION_RE, DEFINITION_START_RE, SECTION_SEPARATOR_RE};
use crate::notebook::{Cell, Notebook};
use crate::registry::RefRegistry;

/// Rewrite every `[[N]](#refD)` citation to the global numbering. A
/// citation whose local number has no recorded definition is left
/// byte-for-byte unchanged; malformed documents must not abort the run.
pub fn rewrite_citations(registry: &RefRegistry, cell_index: usize, text: &str) -> String {
    CITATION_RE
        .replace_all(text, |caps: &regex::Captures| {
            let local_num: u32 = caps[1].parse().unwrap_or(0);
            match registry.global_for(cell_index, local_num) {
                Some(global) => format!("[[{global}]](#global_ref{global})"),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

/// Remove the trailing local reference block from a cell, trying strategies
/// in order and keeping a page-break marker that precedes the cut point:
/// 1. explicit `---` / `**Références :**` separator;
/// 2. a `---` line followed within the next 4 lines by a definition start;
/// 3. the first definition start anywhere in the text.
/// With no definition pattern at all the text is returned unchanged.
pub fn remove_local_section(text: &str) -> String {
    if let Some(sep) = SECTION_SEPARATOR_RE.find(text) {
        return text[..sep.start()].trim_end().to_string();
    }

    let lines: Vec<&str> = text.split('\n').collect();
    for (i, line) in lines.iter().enumerate() {
        if line.trim() == "---" {
            let window = lines[i..(i + 5).min(lines.len())].join("\n");
            if DEFINITION_START_RE.is_match(&window) {
                return lines[..i].join("\n").trim_end().to_string();
            }
        }
    }

    if let Some(def) = DEFINITION_START_RE.find(text) {
        return text[..def.start()].trim_end().to_string();
    }
    text.to_string()
}

/// Render the consolidated reference section, or `None` when the document
/// defines no references at all.
pub fn render_reference_section(registry: &RefRegistry) -> Option<String> {
    if registry.is_empty() {
        return None;
    }
    let mut out = String::from("\n\n---\n\n### Références\n\n");
    for reference in registry.references() {
        let global = reference.global_num.unwrap_or(0);
        out.push_str(&format!(
            "<a id=\"global_ref{global}\"></a>**[{global}]** {}\n\n",
            reference.text
        ));
    }
    Some(out)
}

/// Consolidate the document's references: one full scan builds the registry,
/// and only then is any cell mutated — a definition first seen in a late
/// cell establishes the canonical form earlier citations resolve against.
/// Appends one markdown cell holding the numbered section (none when the
/// document has no references).
pub fn centralize_references(notebook: &mut Notebook) {
    let registry = RefRegistry::build(notebook);

    for (cell_index, cell) in notebook.cells.iter_mut().enumerate() {
        if !cell.is_markdown() {
            continue;
        }
        let rewritten = rewrite_citations(&registry, cell_index, cell.source());
        cell.set_source(remove_local_section(&rewritten));
    }

    if let Some(section) = render_reference_section(&registry) {
        let mut cell = Cell::markdown(section);
        cell.annotate("references_section", Value::Bool(true));
        cell.add_tag("references_section");
        notebook.cells.push(cell);
    }
}
