//! Locating the analysis tool for a file.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use lintel_types::{Invocation, Provenance, ResolvedRuntime};

/// Default command name of the analysis tool.
pub const DEFAULT_PROGRAM: &str = "phpstan";

/// Project-local install location, relative to the workspace root.
const VENDOR_BIN: &str = "vendor/bin/phpstan";

/// Resolves the invocation used to analyze a file.
///
/// Implementations never fail: when nothing is detected they return a
/// [`Provenance::Fallback`] descriptor and let the run report the launch
/// failure as a diagnostic.
pub trait RuntimeResolver: Send + Sync {
    fn resolve(&self, file: &Path) -> ResolvedRuntime;
}

/// Resolver rooted at one workspace.
///
/// Order: user override, `vendor/bin/phpstan`, `phpstan` on `PATH`, bare
/// fallback. Every candidate runs in the workspace root.
#[derive(Debug, Clone)]
pub struct WorkspaceRuntimeResolver {
    workspace_root: PathBuf,
    command_override: Option<Invocation>,
    search_path: Option<OsString>,
}

impl WorkspaceRuntimeResolver {
    #[must_use]
    pub fn new(workspace_root: impl Into<PathBuf>) -> Self {
        Self {
            workspace_root: workspace_root.into(),
            command_override: None,
            search_path: None,
        }
    }

    /// Use `argv` (`[program, leading args...]`) for every file.
    ///
    /// An empty vector leaves detection in place.
    #[must_use]
    pub fn with_command_override(mut self, argv: &[String]) -> Self {
        self.command_override = Invocation::from_argv(argv);
        if self.command_override.is_none() && !argv.is_empty() {
            tracing::warn!("Ignoring blank analysis command override");
        }
        self
    }

    /// Search `path` instead of the process `PATH` for the system install.
    #[must_use]
    pub fn with_search_path(mut self, path: impl Into<OsString>) -> Self {
        self.search_path = Some(path.into());
        self
    }

    #[must_use]
    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    fn runtime(&self, invocation: Invocation, provenance: Provenance) -> ResolvedRuntime {
        ResolvedRuntime {
            invocation,
            provenance,
            working_directory: self.workspace_root.clone(),
        }
    }

    fn find_on_path(&self) -> Option<PathBuf> {
        match &self.search_path {
            Some(paths) => {
                which::which_in(DEFAULT_PROGRAM, Some(paths), &self.workspace_root).ok()
            }
            None => which::which(DEFAULT_PROGRAM).ok(),
        }
    }
}

impl RuntimeResolver for WorkspaceRuntimeResolver {
    fn resolve(&self, file: &Path) -> ResolvedRuntime {
        let resolved = if let Some(invocation) = &self.command_override {
            self.runtime(invocation.clone(), Provenance::UserOverride)
        } else if self.workspace_root.join(VENDOR_BIN).is_file() {
            let program = self.workspace_root.join(VENDOR_BIN);
            self.runtime(
                Invocation::new(program.to_string_lossy(), Vec::new()),
                Provenance::ComposerVendor,
            )
        } else if let Some(program) = self.find_on_path() {
            self.runtime(
                Invocation::new(program.to_string_lossy(), Vec::new()),
                Provenance::SystemPath,
            )
        } else {
            self.runtime(
                Invocation::new(DEFAULT_PROGRAM, Vec::new()),
                Provenance::Fallback,
            )
        };

        tracing::debug!(
            file = %file.display(),
            program = %resolved.invocation.program,
            provenance = resolved.provenance.label(),
            "Resolved analysis runtime"
        );
        resolved
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    use tempfile::TempDir;

    fn empty_search_path(dir: &TempDir) -> OsString {
        let bin = dir.path().join("empty-bin");
        fs::create_dir_all(&bin).unwrap();
        bin.into_os_string()
    }

    #[test]
    fn user_override_wins() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("vendor/bin")).unwrap();
        fs::write(dir.path().join(VENDOR_BIN), "").unwrap();

        let argv = vec!["php".to_string(), "tools/phpstan.phar".to_string()];
        let resolver = WorkspaceRuntimeResolver::new(dir.path()).with_command_override(&argv);
        let rt = resolver.resolve(&dir.path().join("src/Foo.php"));

        assert_eq!(rt.provenance, Provenance::UserOverride);
        assert_eq!(rt.invocation.program, "php");
        assert_eq!(rt.invocation.leading_args, vec!["tools/phpstan.phar"]);
        assert_eq!(rt.working_directory, dir.path());
    }

    #[test]
    fn blank_override_is_ignored() {
        let dir = TempDir::new().unwrap();
        let resolver = WorkspaceRuntimeResolver::new(dir.path())
            .with_command_override(&[String::new()])
            .with_search_path(empty_search_path(&dir));
        let rt = resolver.resolve(Path::new("a.php"));
        assert_eq!(rt.provenance, Provenance::Fallback);
    }

    #[test]
    fn vendor_install_is_detected() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("vendor/bin")).unwrap();
        fs::write(dir.path().join(VENDOR_BIN), "").unwrap();

        let resolver =
            WorkspaceRuntimeResolver::new(dir.path()).with_search_path(empty_search_path(&dir));
        let rt = resolver.resolve(&dir.path().join("src/Foo.php"));

        assert_eq!(rt.provenance, Provenance::ComposerVendor);
        assert_eq!(
            PathBuf::from(&rt.invocation.program),
            dir.path().join(VENDOR_BIN)
        );
        assert!(rt.invocation.leading_args.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn system_path_install_is_detected() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let bin = dir.path().join("bin");
        fs::create_dir_all(&bin).unwrap();
        let exe = bin.join(DEFAULT_PROGRAM);
        fs::write(&exe, "#!/bin/sh\n").unwrap();
        fs::set_permissions(&exe, fs::Permissions::from_mode(0o755)).unwrap();

        let resolver = WorkspaceRuntimeResolver::new(dir.path()).with_search_path(&bin);
        let rt = resolver.resolve(Path::new("a.php"));

        assert_eq!(rt.provenance, Provenance::SystemPath);
        assert_eq!(PathBuf::from(&rt.invocation.program), exe);
    }

    #[test]
    fn nothing_detected_falls_back_to_bare_name() {
        let dir = TempDir::new().unwrap();
        let resolver =
            WorkspaceRuntimeResolver::new(dir.path()).with_search_path(empty_search_path(&dir));
        let rt = resolver.resolve(Path::new("a.php"));

        assert_eq!(rt.provenance, Provenance::Fallback);
        assert_eq!(rt.invocation.program, DEFAULT_PROGRAM);
        assert_eq!(rt.working_directory, dir.path());
    }
}
