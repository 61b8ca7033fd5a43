use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result, bail};
use tracing::{info, warn};

use crate::config::Config;

/// Engines tried in order when none is configured.
const ENGINE_CHAIN: &[&str] = &["chromium", "wkhtmltopdf", "weasyprint"];

const CHROMIUM_BINARIES: &[&str] = &["chromium", "chromium-browser", "google-chrome", "chrome"];

/// Render HTML to a PDF file via an external engine. The HTML is staged as
/// `{stem}_temp.html` next to the output so relative resources resolve, and
/// removed afterwards.
pub fn render_pdf(html: &str, output: &Path, config: &Config) -> Result<()> {
    if let Some(parent) = output.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Could not create {}", parent.display()))?;
        }
    }

    let temp_html = temp_html_path(output);
    std::fs::write(&temp_html, html)
        .with_context(|| format!("Could not write {}", temp_html.display()))?;

    let result = run_engines(&temp_html, output, config);
    let _ = std::fs::remove_file(&temp_html);
    result
}

pub(crate) fn temp_html_path(output: &Path) -> PathBuf {
    let stem = output
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("output");
    output.with_file_name(format!("{stem}_temp.html"))
}

fn run_engines(html: &Path, output: &Path, config: &Config) -> Result<()> {
    if let Some(engine) = &config.pdf_engine {
        run_engine(engine, html, output, config)
            .with_context(|| format!("PDF engine failed: {engine}"))?;
        info!(engine, "pdf rendered");
        return Ok(());
    }

    for engine in ENGINE_CHAIN {
        match run_engine(engine, html, output, config) {
            Ok(()) => {
                info!(engine, "pdf rendered");
                return Ok(());
            }
            Err(err) => warn!(engine, error = %err, "pdf engine failed, trying next"),
        }
    }
    bail!(
        "no PDF engine produced output; install chromium, wkhtmltopdf or weasyprint, \
         or set pdf_engine in the configuration"
    )
}

fn run_engine(name: &str, html: &Path, output: &Path, config: &Config) -> Result<()> {
    match name {
        "chromium" | "chrome" => {
            let mut last_err = None;
            for binary in CHROMIUM_BINARIES {
                match run_command(chromium_command(binary, html, output)?, binary, output) {
                    Ok(()) => return Ok(()),
                    Err(err) => last_err = Some(err),
                }
            }
            Err(last_err.unwrap_or_else(|| anyhow::anyhow!("no chromium binary found")))
        }
        "wkhtmltopdf" => run_command(wkhtmltopdf_command(html, output, config), name, output),
        "weasyprint" => {
            let mut command = Command::new("weasyprint");
            command.arg(html).arg(output);
            run_command(command, name, output)
        }
        other => bail!("unknown PDF engine: {other}"),
    }
}

fn run_command(mut command: Command, name: &str, output: &Path) -> Result<()> {
    let result = command
        .output()
        .with_context(|| format!("failed to launch {name}"))?;
    if !result.status.success() {
        bail!(
            "{name} exited with {}: {}",
            result.status,
            String::from_utf8_lossy(&result.stderr).trim()
        );
    }
    if !output.exists() {
        bail!("{name} reported success but wrote no file");
    }
    Ok(())
}

fn chromium_command(binary: &str, html: &Path, output: &Path) -> Result<Command> {
    let absolute = std::fs::canonicalize(html)
        .with_context(|| format!("Could not resolve {}", html.display()))?;
    let mut command = Command::new(binary);
    command
        .arg("--headless")
        .arg("--disable-gpu")
        .arg("--no-pdf-header-footer")
        .arg(format!("--print-to-pdf={}", output.display()))
        .arg(format!("file://{}", absolute.display()));
    Ok(command)
}

fn wkhtmltopdf_command(html: &Path, output: &Path, config: &Config) -> Command {
    let mut command = Command::new("wkhtmltopdf");
    command
        .arg("--enable-local-file-access")
        .args(["--margin-top", &config.pdf_margin_top])
        .args(["--margin-right", &config.pdf_margin_right])
        .args(["--margin-bottom", &config.pdf_margin_bottom])
        .args(["--margin-left", &config.pdf_margin_left])
        .arg(html)
        .arg(output);
    command
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temp_html_sits_next_to_output() {
        let temp = temp_html_path(Path::new("/tmp/out/report.pdf"));
        assert_eq!(temp, Path::new("/tmp/out/report_temp.html"));
    }

    #[test]
    fn temp_html_without_stem_falls_back() {
        let temp = temp_html_path(Path::new(".."));
        assert!(temp.to_string_lossy().ends_with("output_temp.html"));
    }

    #[test]
    fn wkhtmltopdf_receives_margins() {
        let mut config = Config::default();
        config.pdf_margin_top = "3cm".into();
        let command = wkhtmltopdf_command(Path::new("a.html"), Path::new("a.pdf"), &config);
        let args: Vec<String> = command
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert!(args.contains(&"--margin-top".to_string()));
        assert!(args.contains(&"3cm".to_string()));
    }

    #[test]
    fn unknown_engine_is_rejected() {
        let err = run_engine(
            "latexmk",
            Path::new("a.html"),
            Path::new("a.pdf"),
            &Config::default(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("unknown PDF engine"));
    }
}
