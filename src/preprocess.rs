use anyhow::Result;
use serde_json::Value;
use tracing::debug;

use crate::cells;
use crate::config::Config;
use crate::filter::filter_output_text;
use crate::notebook::{Cell, Notebook};
use crate::rewrite;

/// Tag consumed by the HTML renderer to suppress a cell's input while
/// keeping its outputs.
pub const REMOVE_INPUT_TAG: &str = "remove_input";

fn mark_hidden(cell: &mut Cell, reason: &str) {
    cell.annotate("hidden_reason", Value::String(reason.to_string()));
    cell.add_tag("hidden");
    cell.add_tag(REMOVE_INPUT_TAG);
}

/// Apply reference consolidation and the presentation rules, returning the
/// processed notebook. Notebook-level `smart_exporter` metadata overrides
/// the configuration for this run.
pub fn preprocess(mut notebook: Notebook, config: &Config) -> Result<Notebook> {
    let config = match notebook.exporter_metadata() {
        Some(overrides) => config.merged_with(&overrides.clone())?,
        None => config.clone(),
    };

    if config.centralize_references {
        rewrite::centralize_references(&mut notebook);
    }

    let cells = std::mem::take(&mut notebook.cells);
    let mut kept = Vec::with_capacity(cells.len());

    for mut cell in cells {
        if cells::should_remove_cell(&cell, &config) {
            debug!("removing tagged cell");
            continue;
        }

        if config.hide_import_only_cells && cells::is_import_only_cell(&cell) {
            // Hide the input rather than leaving an empty grey block.
            mark_hidden(&mut cell, "import_only");
        }

        // Leading-import stripping runs before partial truncation so the
        // kept head lines are real code.
        if cell.is_code() && config.hide_leading_imports {
            cells::hide_leading_imports(&mut cell);
        }

        if cells::should_partial_code(&cell, &config) {
            cells::apply_partial_code(&mut cell, &config);
        }

        if cells::should_hide_code(&cell, &config) {
            mark_hidden(&mut cell, "hide_code_rule");
        }

        if cells::should_hide_output(&cell, &config) {
            if let Cell::Code { outputs, .. } = &mut cell {
                outputs.clear();
            }
            cell.annotate("output_hidden", Value::Bool(true));
        }

        if config.hide_warnings {
            if let Cell::Code { outputs, .. } = &mut cell {
                for output in outputs.iter_mut() {
                    if output.output_type == "stream" && output.name.as_deref() == Some("stderr") {
                        if let Some(text) = &output.text {
                            output.text = Some(filter_output_text(
                                text,
                                config.hide_warnings,
                                config.hide_errors,
                                &config.warning_patterns,
                            ));
                        }
                    } else if output.output_type == "error" && config.hide_errors {
                        output.traceback = Some(Vec::new());
                    }
                }
            }
        }

        if cell.is_markdown()
            && config.reflow_markdown
            && !cell.has_tag("references_section")
        {
            let reflowed = cells::reflow_markdown(cell.source(), config.max_line_length);
            cell.set_source(reflowed);
        }

        if cell.is_markdown() && cell.source().contains(&config.page_break_marker) {
            let replaced = cell.source().replace(
                &config.page_break_marker,
                "<div style=\"page-break-after: always;\"></div>",
            );
            cell.set_source(replaced);
        }

        if cell.is_code() && config.detect_long_code_lines && cells::has_long_lines(&cell, &config)
        {
            cell.annotate("long_lines", Value::Bool(true));
        }

        kept.push(cell);
    }

    notebook.cells = kept;
    Ok(notebook)
}
