//! Baseline artifact naming.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Mutex;

use crate::result::{EngineError, EnsayoResult};

/// Kind of baseline artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactKind {
    /// Raster screenshot
    Screenshot,
    /// Serialized DOM
    Snapshot,
}

impl ArtifactKind {
    /// File extension without the dot
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Screenshot => "png",
            Self::Snapshot => "html",
        }
    }
}

/// What happened to a baseline during a capture step
#[derive(Debug, Clone, PartialEq)]
pub enum BaselineOutcome {
    /// No baseline existed; the capture became the baseline
    Created(PathBuf),
    /// Updating was enabled; the baseline was overwritten
    Updated(PathBuf),
    /// The capture matched the baseline within tolerance
    Matched {
        /// Baseline compared against
        path: PathBuf,
        /// Fraction of differing pixels (0.0 for HTML)
        difference: f64,
    },
}

impl BaselineOutcome {
    /// Baseline path
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::Created(path) | Self::Updated(path) | Self::Matched { path, .. } => path,
        }
    }
}

/// Write a debugging artifact, logging instead of failing on error
pub(crate) fn write_artifact(path: &Path, contents: &[u8]) -> Option<PathBuf> {
    match std::fs::write(path, contents) {
        Ok(()) => Some(path.to_path_buf()),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "failed to write artifact");
            None
        }
    }
}

/// Location of baseline `filename` inside `dir`.
///
/// A leading root is dropped, so `/tmp/x.png` lands at `<dir>/tmp/x.png`.
/// Names that climb out of `dir` with `..` are rejected.
pub fn baseline_path(dir: &Path, filename: &str) -> EnsayoResult<PathBuf> {
    let mut relative = PathBuf::new();
    for component in Path::new(filename).components() {
        match component {
            Component::Normal(part) => relative.push(part),
            Component::RootDir | Component::Prefix(_) | Component::CurDir => {}
            Component::ParentDir => {
                return Err(EngineError::configuration(format!(
                    "baseline name escapes {}: {filename}",
                    dir.display()
                )))
            }
        }
    }
    if relative.as_os_str().is_empty() {
        return Err(EngineError::configuration(format!(
            "invalid baseline name: {filename:?}"
        )));
    }
    Ok(dir.join(relative))
}

/// Replace path-hostile characters in a test name
#[must_use]
pub fn sanitize_test_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            ' ' | '/' | '\\' => '_',
            other => other,
        })
        .collect()
}

/// Path of a debugging artifact next to `baseline`: `<stem>.<suffix>.<ext>`
#[must_use]
pub fn artifact_path(baseline: &Path, suffix: &str) -> PathBuf {
    let stem = baseline
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match baseline.extension() {
        Some(ext) => format!("{stem}.{suffix}.{}", ext.to_string_lossy()),
        None => format!("{stem}.{suffix}"),
    };
    baseline.with_file_name(name)
}

/// Hands out auto-generated baseline file names.
///
/// Occurrence counters are keyed by exact test name and owned by one engine
/// instance; screenshot and snapshot counters are independent.
#[derive(Debug, Default)]
pub struct ArtifactNamer {
    screenshots: Mutex<HashMap<String, usize>>,
    snapshots: Mutex<HashMap<String, usize>>,
}

impl ArtifactNamer {
    /// Create a namer with empty counters
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve the file name for the next artifact of `kind` in `test_name`.
    ///
    /// An explicit name is used as given. Otherwise the first occurrence is
    /// `<sanitized>.<ext>` and later ones `<sanitized>_<n>.<ext>`.
    pub fn resolve(&self, kind: ArtifactKind, explicit: Option<&str>, test_name: &str) -> String {
        if let Some(name) = explicit.filter(|n| !n.is_empty()) {
            return name.to_string();
        }

        let counters = match kind {
            ArtifactKind::Screenshot => &self.screenshots,
            ArtifactKind::Snapshot => &self.snapshots,
        };
        let occurrence = {
            let mut counters = counters
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            let count = counters.entry(test_name.to_string()).or_insert(0);
            *count += 1;
            *count
        };

        let base = sanitize_test_name(test_name);
        let ext = kind.extension();
        if occurrence == 1 {
            format!("{base}.{ext}")
        } else {
            format!("{base}_{occurrence}.{ext}")
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize_test_name("Login Test"), "Login_Test");
        assert_eq!(sanitize_test_name("a/b\\c d"), "a_b_c_d");
        assert_eq!(sanitize_test_name("plain"), "plain");
    }

    #[test]
    fn test_auto_names_count_per_test() {
        let namer = ArtifactNamer::new();
        let shot = |test| namer.resolve(ArtifactKind::Screenshot, None, test);
        assert_eq!(shot("Login Test"), "Login_Test.png");
        assert_eq!(shot("Login Test"), "Login_Test_2.png");
        assert_eq!(shot("Other"), "Other.png");
        assert_eq!(shot("Login Test"), "Login_Test_3.png");
    }

    #[test]
    fn test_kinds_count_independently() {
        let namer = ArtifactNamer::new();
        assert_eq!(
            namer.resolve(ArtifactKind::Screenshot, None, "t"),
            "t.png"
        );
        assert_eq!(namer.resolve(ArtifactKind::Snapshot, None, "t"), "t.html");
        assert_eq!(
            namer.resolve(ArtifactKind::Snapshot, None, "t"),
            "t_2.html"
        );
    }

    #[test]
    fn test_explicit_name_does_not_advance_counter() {
        let namer = ArtifactNamer::new();
        assert_eq!(
            namer.resolve(ArtifactKind::Screenshot, Some("home.png"), "t"),
            "home.png"
        );
        assert_eq!(namer.resolve(ArtifactKind::Screenshot, None, "t"), "t.png");
    }

    #[test]
    fn test_artifact_path() {
        let baseline = Path::new("shots/Login_Test.png");
        assert_eq!(
            artifact_path(baseline, "actual"),
            PathBuf::from("shots/Login_Test.actual.png")
        );
        assert_eq!(
            artifact_path(Path::new("snaps/page.html"), "diff"),
            PathBuf::from("snaps/page.diff.html")
        );
    }

    #[test]
    fn test_baseline_path_stays_under_dir() {
        let dir = Path::new("shots");
        assert_eq!(
            baseline_path(dir, "home.png").unwrap(),
            PathBuf::from("shots/home.png")
        );
        assert_eq!(
            baseline_path(dir, "/tmp/x.png").unwrap(),
            PathBuf::from("shots/tmp/x.png")
        );
        assert_eq!(
            baseline_path(dir, "./flows/a.png").unwrap(),
            PathBuf::from("shots/flows/a.png")
        );
        assert!(baseline_path(dir, "../outside.png").is_err());
        assert!(baseline_path(dir, "/").is_err());
    }

    #[test]
    fn test_concurrent_resolution_is_unique() {
        let namer = Arc::new(ArtifactNamer::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let namer = Arc::clone(&namer);
                std::thread::spawn(move || namer.resolve(ArtifactKind::Screenshot, None, "same"))
            })
            .collect();
        let mut names: Vec<String> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), 8);
    }
}
