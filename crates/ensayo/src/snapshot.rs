//! HTML snapshot regression.
//!
//! Snapshots are compared after whitespace normalization so formatting
//! changes between tags do not count as differences.

use std::path::{Path, PathBuf};

use crate::baseline::{artifact_path, baseline_path, write_artifact, BaselineOutcome};
use crate::config::EngineConfig;
use crate::result::{EngineError, EnsayoResult};

/// Collapse whitespace runs and drop whitespace adjacent to tag boundaries.
///
/// Only space, tab, CR and LF count as whitespace; `&nbsp;` characters and
/// other Unicode spaces are content.
#[must_use]
pub fn normalize_html(html: &str) -> String {
    let mut collapsed = String::with_capacity(html.len());
    let mut in_space = false;
    for c in html.chars() {
        if matches!(c, ' ' | '\t' | '\r' | '\n') {
            if !in_space {
                collapsed.push(' ');
            }
            in_space = true;
        } else {
            collapsed.push(c);
            in_space = false;
        }
    }

    collapsed
        .replace("> <", "><")
        .replace("> ", ">")
        .replace(" <", "<")
        .trim_matches(' ')
        .to_string()
}

/// Whether two documents are equal after normalization
#[must_use]
pub fn snapshots_match(baseline: &str, current: &str) -> bool {
    normalize_html(baseline) == normalize_html(current)
}

/// Escape `& < > " '` for embedding in HTML
#[must_use]
pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}

/// Render a page showing expected and actual documents side by side
#[must_use]
pub fn render_html_diff(baseline: &str, current: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <title>Snapshot Diff</title>
    <style>
        body {{ font-family: monospace; margin: 0; }}
        .columns {{ display: flex; gap: 16px; padding: 16px; }}
        .column {{ flex: 1; min-width: 0; }}
        .header {{ font-weight: bold; margin: 0 0 8px 0; }}
        .content {{ white-space: pre-wrap; word-break: break-all; padding: 8px; }}
        .removed {{ background-color: #FFB6C1; }}
        .added {{ background-color: #90EE90; }}
    </style>
</head>
<body>
    <div class="columns">
        <div class="column">
            <div class="header">Expected:</div>
            <div class="content removed">{expected}</div>
        </div>
        <div class="column">
            <div class="header">Actual:</div>
            <div class="content added">{actual}</div>
        </div>
    </div>
</body>
</html>
"#,
        expected = escape_html(&normalize_html(baseline)),
        actual = escape_html(&normalize_html(current)),
    )
}

/// HTML baselines under one directory
#[derive(Debug, Clone)]
pub struct HtmlSnapshots {
    dir: PathBuf,
    update: bool,
}

impl HtmlSnapshots {
    /// Create a store
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>, update: bool) -> Self {
        Self {
            dir: dir.into(),
            update,
        }
    }

    /// Store configured from the engine config
    #[must_use]
    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(&config.snapshot_dir, config.update_snapshots)
    }

    /// Baseline directory
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Compare `html` against the baseline named `filename`
    pub fn check(&self, filename: &str, html: &str) -> EnsayoResult<BaselineOutcome> {
        let path = baseline_path(&self.dir, filename)?;
        std::fs::create_dir_all(path.parent().unwrap_or(&self.dir))?;

        if !path.exists() {
            std::fs::write(&path, html)?;
            tracing::info!(path = %path.display(), "created snapshot baseline");
            return Ok(BaselineOutcome::Created(path));
        }
        if self.update {
            std::fs::write(&path, html)?;
            tracing::info!(path = %path.display(), "updated snapshot baseline");
            return Ok(BaselineOutcome::Updated(path));
        }

        let baseline = std::fs::read_to_string(&path)?;
        if snapshots_match(&baseline, html) {
            return Ok(BaselineOutcome::Matched {
                path,
                difference: 0.0,
            });
        }

        let diff = render_html_diff(&baseline, html);
        let artifacts = [
            write_artifact(&artifact_path(&path, "actual"), html.as_bytes()),
            write_artifact(&artifact_path(&path, "diff"), diff.as_bytes()),
        ]
        .into_iter()
        .flatten()
        .collect();

        Err(EngineError::VisualDiff {
            message: format!(
                "snapshot differs from baseline. Delete the old snapshot at {} to save the new one",
                path.display()
            ),
            difference: None,
            baseline: path,
            artifacts,
        })
    }
}
