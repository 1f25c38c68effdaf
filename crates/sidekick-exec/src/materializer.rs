use std::io;
use std::path::Path;
use std::path::PathBuf;

#[derive(thiserror::Error, Debug)]
pub enum MaterializeError {
    #[error("failed to create parent directories for {}: {source}", .path.display())]
    CreateParent {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Writes `content` as the complete contents of `path`, creating missing
/// parent directories and truncating any existing file.
///
/// `path` must already have been admitted by the sandbox.
pub fn write_file(path: &Path, content: &str) -> Result<(), MaterializeError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| MaterializeError::CreateParent {
            path: path.to_path_buf(),
            source,
        })?;
    }
    std::fs::write(path, content).map_err(|source| MaterializeError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    tracing::info!(path = %path.display(), bytes = content.len(), "file written");
    Ok(())
}
