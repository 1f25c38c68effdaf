use std::io;
use std::path::Component;
use std::path::Path;
use std::path::PathBuf;

#[derive(thiserror::Error, Debug)]
pub enum SandboxError {
    #[error("path '{requested}' resolves to {} which is outside {}", .resolved.display(), .root.display())]
    Escape {
        requested: String,
        resolved: PathBuf,
        root: PathBuf,
    },
    #[error("path '{requested}' could not be resolved: {source}")]
    Resolve {
        requested: String,
        #[source]
        source: io::Error,
    },
    #[error("empty path")]
    Empty,
}

#[derive(Debug)]
pub enum SandboxDecision {
    Admit(PathBuf),
    Reject(SandboxError),
}

impl SandboxDecision {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Self::Admit(_))
    }
}

/// Confines file writes to the subtree under a fixed root.
///
/// Decisions are a pure function of the root, the requested path and the
/// current filesystem; nothing is cached between calls.
#[derive(Debug, Clone)]
pub struct PathSandbox {
    root: PathBuf,
}

impl PathSandbox {
    pub fn new(root: impl AsRef<Path>) -> io::Result<Self> {
        Ok(Self {
            root: std::fs::canonicalize(root)?,
        })
    }

    pub fn from_current_dir() -> io::Result<Self> {
        Self::new(std::env::current_dir()?)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn resolve(&self, requested: &str) -> SandboxDecision {
        if requested.trim().is_empty() {
            return SandboxDecision::Reject(SandboxError::Empty);
        }

        let candidate = self.root.join(requested);
        let resolved = match resolve_lenient(&candidate) {
            Ok(resolved) => resolved,
            Err(source) => {
                return SandboxDecision::Reject(SandboxError::Resolve {
                    requested: requested.to_string(),
                    source,
                })
            }
        };

        // Component-wise prefix: `/work/app2` is not inside `/work/app`.
        if resolved.starts_with(&self.root) {
            SandboxDecision::Admit(resolved)
        } else {
            tracing::warn!(
                requested,
                resolved = %resolved.display(),
                "path escapes working directory"
            );
            SandboxDecision::Reject(SandboxError::Escape {
                requested: requested.to_string(),
                resolved,
                root: self.root.clone(),
            })
        }
    }
}

/// Canonicalizes a path that may not exist yet.
///
/// Existing symlinks are followed as each component is appended, so `..`
/// always pops a real directory. Components that do not exist are taken
/// literally. A dangling symlink is an error.
fn resolve_lenient(path: &Path) -> io::Result<PathBuf> {
    let mut resolved = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => resolved.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                resolved.pop();
            }
            Component::Normal(name) => {
                resolved.push(name);
                let is_symlink = std::fs::symlink_metadata(&resolved)
                    .map(|meta| meta.file_type().is_symlink())
                    .unwrap_or(false);
                if is_symlink {
                    resolved = std::fs::canonicalize(&resolved)?;
                }
            }
        }
    }
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use pretty_assertions::assert_eq;

    use super::*;

    fn sandbox() -> (tempfile::TempDir, PathSandbox) {
        let dir = tempfile::tempdir().expect("tempdir");
        let project = dir.path().join("project");
        fs::create_dir_all(project.join("src")).expect("mkdir");
        let sandbox = PathSandbox::new(&project).expect("sandbox");
        (dir, sandbox)
    }

    #[test]
    fn admits_paths_inside_root() {
        let (_dir, sandbox) = sandbox();
        for requested in ["notes.txt", "src/main.rs", "new/dir/file.txt", "./a/../b.txt"] {
            match sandbox.resolve(requested) {
                SandboxDecision::Admit(path) => assert!(path.starts_with(sandbox.root())),
                SandboxDecision::Reject(err) => panic!("{requested} rejected: {err}"),
            }
        }
    }

    #[test]
    fn root_itself_is_admitted_and_parent_is_not() {
        let (_dir, sandbox) = sandbox();
        match sandbox.resolve(".") {
            SandboxDecision::Admit(path) => assert_eq!(path, sandbox.root()),
            SandboxDecision::Reject(err) => panic!("root rejected: {err}"),
        }
        assert!(!sandbox.resolve("..").is_admitted());
    }

    #[test]
    fn rejects_traversal_and_foreign_absolute_paths() {
        let (_dir, sandbox) = sandbox();
        for requested in [
            "../outside.txt",
            "../../etc/passwd",
            "src/../../outside.txt",
            "new/../../outside.txt",
            "/etc/passwd",
        ] {
            let decision = sandbox.resolve(requested);
            assert!(
                matches!(decision, SandboxDecision::Reject(SandboxError::Escape { .. })),
                "{requested} => {decision:?}"
            );
        }
    }

    #[test]
    fn absolute_path_inside_root_is_admitted() {
        let (_dir, sandbox) = sandbox();
        let inside = sandbox.root().join("src").join("lib.rs");
        let requested = inside.to_string_lossy().to_string();
        match sandbox.resolve(&requested) {
            SandboxDecision::Admit(path) => assert_eq!(path, inside),
            SandboxDecision::Reject(err) => panic!("rejected: {err}"),
        }
    }

    #[test]
    fn sibling_with_shared_prefix_is_rejected() {
        let (dir, sandbox) = sandbox();
        fs::create_dir_all(dir.path().join("project2")).expect("mkdir");
        assert!(!sandbox.resolve("../project2/file.txt").is_admitted());
    }

    #[test]
    fn empty_path_is_rejected() {
        let (_dir, sandbox) = sandbox();
        assert!(matches!(
            sandbox.resolve("  "),
            SandboxDecision::Reject(SandboxError::Empty)
        ));
    }

    #[test]
    fn decision_is_stable_across_calls() {
        let (_dir, sandbox) = sandbox();
        for requested in ["a.txt", "../b.txt"] {
            let first = sandbox.resolve(requested).is_admitted();
            let second = sandbox.resolve(requested).is_admitted();
            assert_eq!(first, second);
        }
    }

    #[cfg(unix)]
    #[test]
    fn symlink_escape_is_rejected() {
        let (dir, sandbox) = sandbox();
        let outside = dir.path().join("outside");
        fs::create_dir_all(&outside).expect("mkdir");
        std::os::unix::fs::symlink(&outside, sandbox.root().join("link")).expect("symlink");

        assert!(matches!(
            sandbox.resolve("link/secret.txt"),
            SandboxDecision::Reject(SandboxError::Escape { .. })
        ));
    }

    #[cfg(unix)]
    #[test]
    fn symlink_within_root_is_admitted() {
        let (_dir, sandbox) = sandbox();
        std::os::unix::fs::symlink(sandbox.root().join("src"), sandbox.root().join("code"))
            .expect("symlink");

        match sandbox.resolve("code/lib.rs") {
            SandboxDecision::Admit(path) => {
                assert_eq!(path, sandbox.root().join("src").join("lib.rs"))
            }
            SandboxDecision::Reject(err) => panic!("rejected: {err}"),
        }
    }
}
