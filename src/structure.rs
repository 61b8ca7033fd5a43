use chrono::Local;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::config::Config;

// The closing tag level is re-checked in code; the regex crate has no
// backreferences.
static HEADING_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<h([1-6])([^>]*)>(.*?)</h([1-6])>").unwrap());

static ID_ATTR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"id="([^"]*)""#).unwrap());

static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").unwrap());

/// One document heading, for TOC generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Heading {
    pub level: usize,
    pub text: String,
    pub id: String,
}

/// Give every heading without an `id` attribute one derived from its text,
/// so TOC links have a target.
pub fn add_heading_ids(html: &str) -> String {
    HEADING_RE
        .replace_all(html, |caps: &Captures| {
            if caps[1] != caps[4] {
                return caps[0].to_string();
            }
            let level = &caps[1];
            let attrs = caps[2].trim();
            let content = &caps[3];
            if attrs.contains("id=") {
                return caps[0].to_string();
            }
            let id = slugify(content);
            if attrs.is_empty() {
                format!("<h{level} id=\"{id}\">{content}</h{level}>")
            } else {
                format!("<h{level} {attrs} id=\"{id}\">{content}</h{level}>")
            }
        })
        .into_owned()
}

fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut last_dash = false;
    for c in text.to_lowercase().chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c);
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
    }
    slug.trim_matches('-').to_string()
}

/// Collect headings up to `max_depth`, cleaning nested tags and anchor
/// pilcrows out of the visible text.
pub fn extract_headings(html: &str, max_depth: usize) -> Vec<Heading> {
    let mut headings = Vec::new();
    for caps in HEADING_RE.captures_iter(html) {
        if caps[1] != caps[4] {
            continue;
        }
        let level: usize = caps[1].parse().unwrap_or(0);
        if level > max_depth {
            continue;
        }
        let id = ID_ATTR_RE
            .captures(&caps[2])
            .map(|id| id[1].to_string())
            .unwrap_or_else(|| format!("heading-{}", headings.len()));
        let text = TAG_RE
            .replace_all(&caps[3], "")
            .replace('¶', "")
            .trim()
            .to_string();
        headings.push(Heading { level, text, id });
    }
    headings
}

/// Render the table-of-contents page as nested ordered lists.
pub fn generate_toc_html(headings: &[Heading], config: &Config) -> String {
    if headings.is_empty() {
        return String::new();
    }

    let mut html = format!(
        "\n<div class=\"toc-page\">\n    <h1 class=\"toc-title\">{}</h1>\n    <nav class=\"toc\">\n",
        config.toc_title
    );

    let mut current_level = 0;
    for heading in headings {
        while current_level < heading.level {
            html.push_str("        <ol class=\"toc-list\">\n");
            current_level += 1;
        }
        while current_level > heading.level {
            html.push_str("        </ol>\n");
            current_level -= 1;
        }
        html.push_str(&format!(
            "            <li class=\"toc-item toc-level-{}\"><a href=\"#{}\" class=\"toc-link\">{}</a></li>\n",
            heading.level, heading.id, heading.text
        ));
    }
    while current_level > 0 {
        html.push_str("        </ol>\n");
        current_level -= 1;
    }

    html.push_str("    </nav>\n</div>\n");
    html
}

/// Render the cover page from the cover_* configuration fields.
pub fn generate_cover_html(config: &Config) -> String {
    let authors = config.effective_cover_authors();
    let date = if config.cover_date == "auto" {
        Local::now().format("%d %B %Y").to_string()
    } else {
        config.cover_date.clone()
    };

    let mut html = String::from("<div class=\"cover-page\">\n");

    if !config.cover_institution.is_empty() || !config.cover_subject.is_empty() {
        html.push_str("    <div class=\"cover-header\">\n");
        if !config.cover_institution.is_empty() {
            html.push_str(&format!(
                "        <div class=\"cover-institution-top\">{}</div>\n",
                config.cover_institution
            ));
        }
        if !config.cover_subject.is_empty() {
            html.push_str(&format!(
                "        <div class=\"cover-subject\">{}</div>\n",
                config.cover_subject
            ));
        }
        html.push_str("    </div>\n");
    }

    html.push_str("    <div class=\"cover-main\">\n");
    if !config.cover_logo.is_empty() {
        html.push_str(&format!(
            "        <div class=\"cover-logo\"><img src=\"{}\" alt=\"Logo\" /></div>\n",
            config.cover_logo
        ));
    }
    if !config.cover_title.is_empty() {
        html.push_str(&format!(
            "        <h1 class=\"cover-title\">{}</h1>\n",
            config.cover_title
        ));
    }
    if !config.cover_subtitle.is_empty() {
        html.push_str(&format!(
            "        <h2 class=\"cover-subtitle\">{}</h2>\n",
            config.cover_subtitle
        ));
    }
    html.push_str("    </div>\n");

    if !authors.is_empty() || !date.is_empty() || !config.cover_quote.is_empty() {
        html.push_str("    <div class=\"cover-footer\">\n");
        match authors.as_slice() {
            [] => {}
            [single] => {
                html.push_str(&format!(
                    "        <div class=\"cover-author-single\">par {single}</div>\n"
                ));
            }
            many => {
                html.push_str("        <div class=\"cover-authors-box\">\n");
                html.push_str("            <div class=\"cover-authors-title\">Auteurs</div>\n");
                html.push_str("            <ul class=\"cover-authors-list\">\n");
                for author in many {
                    html.push_str(&format!("                <li>{author}</li>\n"));
                }
                html.push_str("            </ul>\n");
                html.push_str("        </div>\n");
            }
        }
        if !date.is_empty() {
            html.push_str(&format!("        <div class=\"cover-date\">{date}</div>\n"));
        }
        if !config.cover_quote.is_empty() {
            html.push_str(&format!(
                "        <div class=\"cover-quote\">{}</div>\n",
                config.cover_quote
            ));
        }
        html.push_str("    </div>\n");
    }

    html.push_str("</div>\n");
    html
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heading_ids_are_added_from_text() {
        let html = "<h1>Mon Titre</h1><p>x</p><h2 class=\"sub\">Deux: Parts</h2>";
        let out = add_heading_ids(html);
        assert!(out.contains("<h1 id=\"mon-titre\">Mon Titre</h1>"));
        assert!(out.contains("<h2 class=\"sub\" id=\"deux-parts\">Deux: Parts</h2>"));
    }

    #[test]
    fn existing_ids_are_kept() {
        let html = "<h1 id=\"custom\">Title</h1>";
        assert_eq!(add_heading_ids(html), html);
    }

    #[test]
    fn headings_respect_depth_and_strip_tags() {
        let html = "<h1 id=\"a\">One</h1><h2 id=\"b\"><em>Two</em> ¶</h2><h4 id=\"d\">Deep</h4>";
        let headings = extract_headings(html, 3);
        assert_eq!(headings.len(), 2);
        assert_eq!(headings[0].text, "One");
        assert_eq!(headings[1].text, "Two");
        assert_eq!(headings[1].id, "b");
    }

    #[test]
    fn heading_without_id_gets_placeholder() {
        let headings = extract_headings("<h1>Untitled</h1>", 3);
        assert_eq!(headings[0].id, "heading-0");
    }

    #[test]
    fn toc_nests_levels() {
        let headings = vec![
            Heading { level: 1, text: "A".into(), id: "a".into() },
            Heading { level: 2, text: "B".into(), id: "b".into() },
            Heading { level: 1, text: "C".into(), id: "c".into() },
        ];
        let toc = generate_toc_html(&headings, &Config::default());
        assert_eq!(toc.matches("<ol class=\"toc-list\">").count(), 2);
        assert_eq!(toc.matches("</ol>").count(), 2);
        assert!(toc.contains("href=\"#b\""));
        assert!(toc.contains("Table des matières"));
    }

    #[test]
    fn empty_toc_for_no_headings() {
        assert!(generate_toc_html(&[], &Config::default()).is_empty());
    }

    #[test]
    fn cover_lists_multiple_authors() {
        let mut config = Config::default();
        config.cover_title = "Rapport".into();
        config.cover_authors = vec!["A".into(), "B".into()];
        config.cover_date = "1 juin 2024".into();
        let cover = generate_cover_html(&config);
        assert!(cover.contains("<h1 class=\"cover-title\">Rapport</h1>"));
        assert!(cover.contains("cover-authors-list"));
        assert!(cover.contains("<li>A</li>"));
        assert!(cover.contains("1 juin 2024"));
    }

    #[test]
    fn cover_single_author_inline() {
        let mut config = Config::default();
        config.cover_author = "Solo".into();
        config.cover_date = "x".into();
        let cover = generate_cover_html(&config);
        assert!(cover.contains("par Solo"));
        assert!(!cover.contains("cover-authors-box"));
    }
}
