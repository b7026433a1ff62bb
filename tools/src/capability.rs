//! Editor-mode capability negotiation.
//!
//! Editor mode (`--tmp-file`/`--instead-of`) only exists in recent releases of
//! each major line. The negotiator probes `--version`, classifies the result
//! against per-major minimums and caches the answer per
//! (working directory, command). Any probe failure means "unsupported", which
//! is the path every version understands.
//!
//! The cache is never invalidated during a session, so upgrading the binary
//! on disk mid-session is not picked up.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::LazyLock;

use lintel_types::ResolvedRuntime;
use regex::Regex;

use crate::command::build_version_command;
use crate::process::ProcessRunner;

/// Marker in development-snapshot version strings (e.g. `2.1.x-dev@abc123`).
pub const DEV_SNAPSHOT_MARKER: &str = "-dev@";

static VERSION_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d+)\.(\d+)\.(\d+)").expect("version pattern is valid")
});

/// Version following the tool's own name in the `--version` banner.
static BANNER_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:phpstan|analysis tool)[^\d\n]*?(\d+)\.(\d+)\.(\d+)")
        .expect("banner pattern is valid")
});

/// A `major.minor.patch` release number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ToolVersion {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl ToolVersion {
    #[must_use]
    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }
}

impl fmt::Display for ToolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// First release of each supported major line with editor mode.
const EDITOR_MODE_MINIMUMS: &[ToolVersion] = &[ToolVersion::new(1, 12, 27), ToolVersion::new(2, 1, 17)];

/// Extract the tool's `major.minor.patch` from `text`.
///
/// Prefers the last triple following the tool name in the banner; without a
/// banner, the last triple in `text`. Earlier triples usually belong to PHP
/// or to paths in notices.
#[must_use]
pub fn parse_version(text: &str) -> Option<ToolVersion> {
    let caps = BANNER_PATTERN
        .captures_iter(text)
        .last()
        .or_else(|| VERSION_PATTERN.captures_iter(text).last())?;
    Some(ToolVersion::new(
        caps[1].parse().ok()?,
        caps[2].parse().ok()?,
        caps[3].parse().ok()?,
    ))
}

/// Classify a `--version` output as supporting editor mode or not.
#[must_use]
pub fn classify_version(text: &str) -> bool {
    if text.contains(DEV_SNAPSHOT_MARKER) {
        return true;
    }
    let Some(version) = parse_version(text) else {
        return false;
    };
    let newest_known_major = EDITOR_MODE_MINIMUMS.iter().map(|v| v.major).max().unwrap_or(0);
    if version.major > newest_known_major {
        return true;
    }
    EDITOR_MODE_MINIMUMS
        .iter()
        .find(|minimum| minimum.major == version.major)
        .is_some_and(|minimum| version >= *minimum)
}

/// The probe stream to classify: stdout when it names a version, else stderr.
fn probe_text<'a>(stdout: &'a str, stderr: &'a str) -> &'a str {
    if stdout.contains(DEV_SNAPSHOT_MARKER) || parse_version(stdout).is_some() {
        stdout
    } else {
        stderr
    }
}

type CacheKey = (PathBuf, String);

/// Owns the per-session editor-mode capability cache.
#[derive(Debug, Default)]
pub struct CapabilityNegotiator {
    cache: HashMap<CacheKey, bool>,
}

impl CapabilityNegotiator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn key(runtime: &ResolvedRuntime) -> CacheKey {
        (
            runtime.working_directory.clone(),
            runtime.invocation.cache_key(),
        )
    }

    /// Cached answer for `runtime`, if it has been probed.
    #[must_use]
    pub fn cached(&self, runtime: &ResolvedRuntime) -> Option<bool> {
        self.cache.get(&Self::key(runtime)).copied()
    }

    /// Whether `runtime` supports editor mode, probing on first use.
    pub async fn supports_editor_mode<R: ProcessRunner>(
        &mut self,
        runner: &R,
        runtime: &ResolvedRuntime,
    ) -> bool {
        let key = Self::key(runtime);
        if let Some(supported) = self.cache.get(&key) {
            return *supported;
        }

        let probe = build_version_command(runtime);
        let output = runner.run(&probe).await;
        let supported = if output.succeeded() {
            let text = probe_text(&output.stdout, &output.stderr);
            let supported = classify_version(text);
            tracing::info!(
                version = ?parse_version(text).map(|v| v.to_string()),
                supported,
                "Negotiated editor mode"
            );
            supported
        } else {
            tracing::warn!(
                exit_code = output.exit_code,
                command = %probe.display_for_log(),
                "Version probe failed; editor mode disabled"
            );
            false
        };

        self.cache.insert(key, supported);
        supported
    }

    /// Drop every cached answer.
    pub fn clear(&mut self) {
        self.cache.clear();
    }
}
