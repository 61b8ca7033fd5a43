use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::notebook::Dict;

/// Exporter configuration. Defaults mirror the tool's built-in rules;
/// a YAML file and the notebook's `smart_exporter` metadata block can
/// override any subset of keys.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    // Cell visibility rules
    pub hide_code_by_default: bool,
    pub partial_code_by_default: bool,
    pub remove_cells_with_tag: Vec<String>,
    pub hide_code_with_tag: Vec<String>,
    pub hide_output_with_tag: Vec<String>,
    pub show_outputs_with_tag: Vec<String>,
    pub partial_code_with_tag: Vec<String>,

    // Code presentation
    pub hide_import_only_cells: bool,
    pub hide_leading_imports: bool,
    pub partial_code_head_lines: usize,
    pub partial_code_tail_lines: usize,
    pub partial_code_separator_text: String,
    pub detect_long_code_lines: bool,
    pub long_line_threshold: usize,
    pub hide_execution_count: bool,

    // Markdown handling
    pub reflow_markdown: bool,
    pub max_line_length: usize,
    pub page_break_marker: String,
    pub centralize_references: bool,

    // Output filtering
    pub hide_warnings: bool,
    pub hide_errors: bool,
    pub warning_patterns: Vec<String>,

    // Typography
    pub text_font_family: String,
    pub text_font_size: String,
    pub text_line_height: String,
    pub code_font_family: String,
    pub code_font_size: String,

    // Page setup
    pub pdf_margin_top: String,
    pub pdf_margin_right: String,
    pub pdf_margin_bottom: String,
    pub pdf_margin_left: String,
    pub page_numbering: bool,
    pub page_number_format: String,
    pub page_header: String,

    // Table of contents
    pub generate_toc: bool,
    pub toc_depth: usize,
    pub toc_title: String,

    // Cover page
    pub generate_cover: bool,
    pub cover_title: String,
    pub cover_subtitle: String,
    /// Legacy single author, superseded by `cover_authors`.
    pub cover_author: String,
    pub cover_authors: Vec<String>,
    pub cover_institution: String,
    pub cover_subject: String,
    pub cover_date: String,
    pub cover_logo: String,
    pub cover_quote: String,

    // Resources
    pub css_files: Vec<String>,
    pub template: Option<String>,
    pub pdf_engine: Option<String>,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            hide_code_by_default: false,
            partial_code_by_default: false,
            remove_cells_with_tag: vec!["remove".into()],
            hide_code_with_tag: vec!["hide_code".into()],
            hide_output_with_tag: vec!["hide_output".into()],
            show_outputs_with_tag: vec!["show_output".into()],
            partial_code_with_tag: vec!["partial_code".into()],
            hide_import_only_cells: true,
            hide_leading_imports: true,
            partial_code_head_lines: 2,
            partial_code_tail_lines: 2,
            partial_code_separator_text: "# ═══ [{count} lignes omises] ═══".into(),
            detect_long_code_lines: true,
            long_line_threshold: 100,
            hide_execution_count: false,
            reflow_markdown: true,
            max_line_length: 120,
            page_break_marker: "<!-- PAGE_BREAK -->".into(),
            centralize_references: true,
            hide_warnings: true,
            hide_errors: false,
            warning_patterns: vec![
                "Warning".into(),
                "DeprecationWarning".into(),
                "FutureWarning".into(),
                "UserWarning".into(),
            ],
            text_font_family: "-apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, \
                               'Helvetica Neue', Arial, sans-serif"
                .into(),
            text_font_size: "11pt".into(),
            text_line_height: "1.6".into(),
            code_font_family: "'Menlo', 'Consolas', 'DejaVu Sans Mono', monospace".into(),
            code_font_size: "9pt".into(),
            pdf_margin_top: "2cm".into(),
            pdf_margin_right: "2cm".into(),
            pdf_margin_bottom: "2cm".into(),
            pdf_margin_left: "2cm".into(),
            page_numbering: true,
            page_number_format: "Page {page} / {total}".into(),
            page_header: String::new(),
            generate_toc: false,
            toc_depth: 3,
            toc_title: "Table des matières".into(),
            generate_cover: false,
            cover_title: String::new(),
            cover_subtitle: String::new(),
            cover_author: String::new(),
            cover_authors: Vec::new(),
            cover_institution: String::new(),
            cover_subject: String::new(),
            cover_date: "auto".into(),
            cover_logo: String::new(),
            cover_quote: String::new(),
            css_files: Vec::new(),
            template: None,
            pdf_engine: None,
        }
    }
}

impl Config {
    /// Load defaults, overlaid by an optional YAML file. Relative resource
    /// paths in the file are resolved against its directory.
    pub fn load(path: Option<&Path>) -> Result<Config> {
        let Some(path) = path else {
            return Ok(Config::default());
        };
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Config file not found: {}", path.display()))?;
        let mut config: Config = serde_yaml::from_str(&raw)
            .with_context(|| format!("Invalid config YAML: {}", path.display()))?;
        if let Some(base) = path.parent() {
            config.resolve_resource_paths(base);
        }
        Ok(config)
    }

    fn resolve_resource_paths(&mut self, base: &Path) {
        for css in &mut self.css_files {
            *css = resolve_path(base, css);
        }
        if let Some(template) = &mut self.template {
            *template = resolve_path(base, template);
        }
    }

    /// Overlay the notebook's `smart_exporter` metadata block on top of
    /// this configuration. Unknown keys are ignored.
    pub fn merged_with(&self, overrides: &Dict) -> Result<Config> {
        let mut value = serde_json::to_value(self)?;
        if let Value::Object(map) = &mut value {
            for (key, val) in overrides {
                map.insert(key.clone(), val.clone());
            }
        }
        serde_json::from_value(value).context("invalid smart_exporter metadata override")
    }

    /// Header text shown on every page: explicit `page_header`, falling
    /// back to the cover title.
    pub fn effective_page_header(&self) -> &str {
        if self.page_header.is_empty() {
            &self.cover_title
        } else {
            &self.page_header
        }
    }

    /// Cover authors, honoring the legacy single-author field.
    pub fn effective_cover_authors(&self) -> Vec<&str> {
        if self.cover_authors.is_empty() {
            if self.cover_author.is_empty() {
                Vec::new()
            } else {
                vec![self.cover_author.as_str()]
            }
        } else {
            self.cover_authors.iter().map(String::as_str).collect()
        }
    }
}

fn resolve_path(base: &Path, raw: &str) -> String {
    let path = Path::new(raw);
    if path.is_absolute() {
        return raw.to_string();
    }
    let candidate = base.join(path);
    if candidate.exists() {
        candidate.to_string_lossy().into_owned()
    } else {
        raw.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = Config::default();
        assert!(cfg.centralize_references);
        assert!(cfg.hide_warnings);
        assert!(!cfg.hide_code_by_default);
        assert_eq!(cfg.remove_cells_with_tag, vec!["remove".to_string()]);
        assert_eq!(cfg.max_line_length, 120);
        assert_eq!(cfg.page_break_marker, "<!-- PAGE_BREAK -->");
    }

    #[test]
    fn yaml_overlay_keeps_unset_defaults() {
        let cfg: Config =
            serde_yaml::from_str("hide_code_by_default: true\nmax_line_length: 80\n").unwrap();
        assert!(cfg.hide_code_by_default);
        assert_eq!(cfg.max_line_length, 80);
        assert!(cfg.centralize_references);
        assert_eq!(cfg.toc_depth, 3);
    }

    #[test]
    fn notebook_metadata_overlay() {
        let overrides: Dict = serde_json::from_str(
            r#"{"centralize_references": false, "toc_title": "Contents", "unknown_key": 1}"#,
        )
        .unwrap();
        let merged = Config::default().merged_with(&overrides).unwrap();
        assert!(!merged.centralize_references);
        assert_eq!(merged.toc_title, "Contents");
        assert!(merged.hide_warnings);
    }

    #[test]
    fn page_header_falls_back_to_cover_title() {
        let mut cfg = Config::default();
        cfg.cover_title = "Report".into();
        assert_eq!(cfg.effective_page_header(), "Report");
        cfg.page_header = "Custom".into();
        assert_eq!(cfg.effective_page_header(), "Custom");
    }

    #[test]
    fn legacy_single_author() {
        let mut cfg = Config::default();
        cfg.cover_author = "A. Martin".into();
        assert_eq!(cfg.effective_cover_authors(), vec!["A. Martin"]);
        cfg.cover_authors = vec!["B".into(), "C".into()];
        assert_eq!(cfg.effective_cover_authors(), vec!["B", "C"]);
    }
}
