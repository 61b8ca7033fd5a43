use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use pulldown_cmark::{Options, Parser, html as md_html};
use regex::Regex;
use serde_json::Value;
use std::path::Path;

use crate::config::Config;
use crate::notebook::{Cell, CellOutput, Notebook};
use crate::preprocess::REMOVE_INPUT_TAG;
use crate::structure;

const BASE_TEMPLATE: &str = include_str!("../templates/base.html");
const BASE_CSS: &str = include_str!("../css/base.css");
const CODE_CSS: &str = include_str!("../css/code_formatting.css");
const STRUCTURE_CSS: &str = include_str!("../css/document_structure.css");

/// Partial-code separator comments get their own class for styling.
static OMISSION_SEPARATOR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)#.*(?:lignes omises|lines omitted|═══)").unwrap());

static ANSI_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\x1b\[[0-9;]*[A-Za-z]").unwrap());

/// Render the whole processed notebook to a standalone HTML document.
pub fn render_html(notebook: &Notebook, config: &Config) -> Result<String> {
    let mut body = String::new();
    for cell in &notebook.cells {
        render_cell(&mut body, cell, config);
    }
    let body = structure::add_heading_ids(&body);

    let cover = if config.generate_cover {
        structure::generate_cover_html(config)
    } else {
        String::new()
    };
    let toc = if config.generate_toc {
        let headings = structure::extract_headings(&body, config.toc_depth);
        structure::generate_toc_html(&headings, config)
    } else {
        String::new()
    };
    let full_body = format!("{cover}{toc}{body}");

    let template_text = match &config.template {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Template file not found: {path}"))?,
        None => BASE_TEMPLATE.to_string(),
    };

    let body_class = if config.hide_execution_count {
        " class=\"hide-execution-count\""
    } else {
        ""
    };

    let mut context = tera::Context::new();
    context.insert("body", &full_body);
    context.insert("body_class", body_class);
    context.insert("head_css", &assemble_css(config)?);
    tera::Tera::one_off(&template_text, &context, false).context("template rendering failed")
}

fn render_cell(out: &mut String, cell: &Cell, config: &Config) {
    match cell {
        Cell::Markdown { common } => {
            out.push_str("<div class=\"cell markdown-cell\">\n");
            let parser = Parser::new_ext(&common.source, Options::all());
            md_html::push_html(out, parser);
            out.push_str("</div>\n");
        }
        Cell::Code {
            common,
            execution_count,
            outputs,
        } => {
            out.push_str("<div class=\"cell code-cell\">\n");
            if !cell.has_tag(REMOVE_INPUT_TAG) {
                render_code_input(out, &common.source, *execution_count, config);
            }
            for output in outputs {
                render_output(out, output);
            }
            out.push_str("</div>\n");
        }
        // Raw cells carry format-specific payloads; they are not rendered.
        Cell::Raw { .. } => {}
    }
}

fn render_code_input(out: &mut String, source: &str, execution_count: Option<i64>, config: &Config) {
    out.push_str("<div class=\"cell-input\">\n");
    if !config.hide_execution_count {
        let label = execution_count
            .map(|n| format!("In&nbsp;[{n}]:"))
            .unwrap_or_else(|| "In&nbsp;[&nbsp;]:".to_string());
        out.push_str(&format!("<div class=\"execution-count\">{label}</div>\n"));
    }
    out.push_str("<pre><code class=\"language-python\">");
    for (i, line) in source.split('\n').enumerate() {
        if i > 0 {
            out.push('\n');
        }
        if OMISSION_SEPARATOR_RE.is_match(line) {
            out.push_str("<span class=\"code-omission-separator\">");
            out.push_str(&escape_html(line));
            out.push_str("</span>");
        } else {
            out.push_str(&escape_html(line));
        }
    }
    out.push_str("</code></pre>\n</div>\n");
}

fn render_output(out: &mut String, output: &CellOutput) {
    match output.output_type.as_str() {
        "stream" => {
            let name = output.name.as_deref().unwrap_or("stdout");
            let text = output.text.as_deref().unwrap_or("");
            if text.is_empty() {
                return;
            }
            out.push_str(&format!(
                "<div class=\"cell-output output-stream output-{name}\"><pre>{}</pre></div>\n",
                escape_html(text)
            ));
        }
        "error" => {
            let traceback = output
                .traceback
                .as_deref()
                .unwrap_or(&[])
                .join("\n");
            if traceback.is_empty() {
                return;
            }
            let clean = ANSI_RE.replace_all(&traceback, "");
            out.push_str(&format!(
                "<div class=\"cell-output output-error\"><pre>{}</pre></div>\n",
                escape_html(&clean)
            ));
        }
        "execute_result" | "display_data" => {
            let Some(data) = &output.data else { return };
            if let Some(html) = data.get("text/html") {
                out.push_str("<div class=\"cell-output output-html\">\n");
                out.push_str(&mime_text(html));
                out.push_str("\n</div>\n");
            } else if let Some(png) = data.get("image/png") {
                let b64 = mime_text(png);
                out.push_str(&format!(
                    "<div class=\"cell-output output-image\">\
                     <img src=\"data:image/png;base64,{}\" /></div>\n",
                    b64.trim()
                ));
            } else if let Some(plain) = data.get("text/plain") {
                out.push_str(&format!(
                    "<div class=\"cell-output output-text\"><pre>{}</pre></div>\n",
                    escape_html(&mime_text(plain))
                ));
            }
        }
        _ => {}
    }
}

/// Mime-bundle values are a string or a list of line strings.
fn mime_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .collect::<Vec<_>>()
            .concat(),
        _ => String::new(),
    }
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

fn assemble_css(config: &Config) -> Result<String> {
    let mut blocks = vec![
        root_variables_css(config),
        BASE_CSS.to_string(),
        CODE_CSS.to_string(),
        STRUCTURE_CSS.to_string(),
    ];
    for path in &config.css_files {
        if Path::new(path).exists() {
            blocks.push(
                std::fs::read_to_string(path)
                    .with_context(|| format!("Could not read stylesheet: {path}"))?,
            );
        }
    }
    Ok(blocks
        .iter()
        .map(|block| format!("<style>\n{block}\n</style>"))
        .collect::<Vec<_>>()
        .join("\n"))
}

/// CSS custom properties driving margins, typography, the running page
/// header and page numbering.
fn root_variables_css(config: &Config) -> String {
    let header = config.effective_page_header().replace('"', "\\\"");
    let mut css = format!(
        ":root {{\n\
         \t--pdf-margin-top: {top};\n\
         \t--pdf-margin-right: {right};\n\
         \t--pdf-margin-bottom: {bottom};\n\
         \t--pdf-margin-left: {left};\n\
         \t--page-header-text: \"{header}\";\n\
         \t--text-font-family: {text_family};\n\
         \t--text-font-size: {text_size};\n\
         \t--text-line-height: {line_height};\n\
         \t--code-font-family: {code_family};\n\
         \t--code-font-size: {code_size};\n\
         }}\n",
        top = config.pdf_margin_top,
        right = config.pdf_margin_right,
        bottom = config.pdf_margin_bottom,
        left = config.pdf_margin_left,
        text_family = config.text_font_family,
        text_size = config.text_font_size,
        line_height = config.text_line_height,
        code_family = config.code_font_family,
        code_size = config.code_font_size,
    );
    css.push_str(&format!(
        "@page {{\n\tmargin: {} {} {} {};\n",
        config.pdf_margin_top,
        config.pdf_margin_right,
        config.pdf_margin_bottom,
        config.pdf_margin_left
    ));
    if !header.is_empty() {
        css.push_str("\t@top-center { content: var(--page-header-text); font-size: 9pt; color: #666; }\n");
    }
    if config.page_numbering {
        let content = format!("\"{}\"", config.page_number_format)
            .replace("{page}", "\" counter(page) \"")
            .replace("{total}", "\" counter(pages) \"");
        css.push_str(&format!(
            "\t@bottom-right {{ content: {content}; font-size: 9pt; color: #666; }}\n"
        ));
    }
    css.push_str("}\n");
    css
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notebook(json: serde_json::Value) -> Notebook {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn markdown_cells_render_to_html() {
        let nb = notebook(serde_json::json!({
            "nbformat": 4, "nbformat_minor": 5, "metadata": {},
            "cells": [{"cell_type": "markdown", "metadata": {}, "source": "# Title\n\n*em*"}]
        }));
        let html = render_html(&nb, &Config::default()).unwrap();
        assert!(html.contains("Title</h1>"));
        assert!(html.contains("<em>em</em>"));
        assert!(html.contains("<!DOCTYPE html>"));
    }

    #[test]
    fn heading_ids_are_injected() {
        let nb = notebook(serde_json::json!({
            "nbformat": 4, "nbformat_minor": 5, "metadata": {},
            "cells": [{"cell_type": "markdown", "metadata": {}, "source": "# Mon Titre"}]
        }));
        let html = render_html(&nb, &Config::default()).unwrap();
        assert!(html.contains("id=\"mon-titre\""));
    }

    #[test]
    fn hidden_input_keeps_outputs() {
        let nb = notebook(serde_json::json!({
            "nbformat": 4, "nbformat_minor": 5, "metadata": {},
            "cells": [{
                "cell_type": "code",
                "metadata": {"tags": ["remove_input"]},
                "execution_count": 3,
                "outputs": [{"output_type": "stream", "name": "stdout", "text": "result!"}],
                "source": "secret()"
            }]
        }));
        let html = render_html(&nb, &Config::default()).unwrap();
        assert!(!html.contains("secret()"));
        assert!(html.contains("result!"));
    }

    #[test]
    fn code_is_escaped() {
        let nb = notebook(serde_json::json!({
            "nbformat": 4, "nbformat_minor": 5, "metadata": {},
            "cells": [{
                "cell_type": "code", "metadata": {}, "execution_count": 1,
                "outputs": [], "source": "if a < b: print('&')"
            }]
        }));
        let html = render_html(&nb, &Config::default()).unwrap();
        assert!(html.contains("if a &lt; b: print('&amp;')"));
    }

    #[test]
    fn omission_separator_is_wrapped() {
        let nb = notebook(serde_json::json!({
            "nbformat": 4, "nbformat_minor": 5, "metadata": {},
            "cells": [{
                "cell_type": "code", "metadata": {}, "execution_count": 1,
                "outputs": [],
                "source": "a\n# ═══ [3 lignes omises] ═══\nb"
            }]
        }));
        let html = render_html(&nb, &Config::default()).unwrap();
        assert!(html.contains("<span class=\"code-omission-separator\">"));
    }

    #[test]
    fn image_output_renders_img_tag() {
        let nb = notebook(serde_json::json!({
            "nbformat": 4, "nbformat_minor": 5, "metadata": {},
            "cells": [{
                "cell_type": "code", "metadata": {}, "execution_count": 1,
                "outputs": [{
                    "output_type": "display_data",
                    "data": {"image/png": "iVBORw0KGgo=\n"}
                }],
                "source": "plot()"
            }]
        }));
        let html = render_html(&nb, &Config::default()).unwrap();
        assert!(html.contains("data:image/png;base64,iVBORw0KGgo="));
    }

    #[test]
    fn execution_count_class_toggles() {
        let mut config = Config::default();
        let nb = notebook(serde_json::json!({
            "nbformat": 4, "nbformat_minor": 5, "metadata": {},
            "cells": [{
                "cell_type": "code", "metadata": {}, "execution_count": 7,
                "outputs": [], "source": "x"
            }]
        }));
        let html = render_html(&nb, &config).unwrap();
        assert!(html.contains("In&nbsp;[7]:"));
        assert!(!html.contains("hide-execution-count"));

        config.hide_execution_count = true;
        let html = render_html(&nb, &config).unwrap();
        assert!(html.contains("<body class=\"hide-execution-count\">"));
        assert!(!html.contains("In&nbsp;[7]:"));
    }

    #[test]
    fn css_variables_reflect_config() {
        let mut config = Config::default();
        config.pdf_margin_top = "3cm".into();
        config.page_header = "My \"Doc\"".into();
        let css = root_variables_css(&config);
        assert!(css.contains("--pdf-margin-top: 3cm;"));
        assert!(css.contains("--page-header-text: \"My \\\"Doc\\\"\";"));
        assert!(css.contains("counter(page)"));
    }
}
