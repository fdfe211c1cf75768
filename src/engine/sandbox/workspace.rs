use std::{
    io::Write,
    path::{Path, PathBuf},
};

use tempfile::TempDir;

use crate::engine::{error::EngineError, sandbox::RuntimeDescriptor};

const WORKSPACE_PREFIX: &str = "ide-execution-";

/// A uniquely named directory owned by exactly one execution.
///
/// The directory is removed by [`Workspace::close`] once the result is known,
/// or by `Drop` on any other path (early return, panic, cancelled task).
#[derive(Debug)]
pub struct Workspace {
    dir: Option<TempDir>,
    path: PathBuf,
    source_path: PathBuf,
}

impl Workspace {
    pub fn provision(
        root: &Path,
        descriptor: &RuntimeDescriptor,
        code: &[u8],
    ) -> Result<Self, EngineError> {
        let dir = tempfile::Builder::new()
            .prefix(WORKSPACE_PREFIX)
            .tempdir_in(root)
            .map_err(EngineError::Provision)?;

        let path = dir.path().to_path_buf();
        let source_path = descriptor.source_path(&path);
        let workspace = Self {
            dir: Some(dir),
            path,
            source_path,
        };
        workspace.write_source(code)?;
        Ok(workspace)
    }

    fn write_source(&self, code: &[u8]) -> Result<(), EngineError> {
        let mut file = std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.source_path)
            .map_err(EngineError::Provision)?;
        file.write_all(code).map_err(EngineError::Provision)?;
        file.flush().map_err(EngineError::Provision)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    /// Removes the directory. Failures are logged, never returned.
    pub fn close(mut self) {
        if let Some(dir) = self.dir.take() {
            remove(dir, &self.path);
        }
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if let Some(dir) = self.dir.take() {
            tracing::debug!(path = %self.path.display(), "removing workspace on early exit");
            remove(dir, &self.path);
        }
    }
}

fn remove(dir: TempDir, path: &Path) {
    if let Err(err) = dir.close() {
        tracing::warn!(path = %path.display(), error = %err, "workspace cleanup failed");
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::Workspace;
    use crate::engine::{error::EngineError, sandbox::RuntimeDescriptor};

    fn descriptor() -> RuntimeDescriptor {
        RuntimeDescriptor::new(".sh", "sh", Duration::from_secs(1))
    }

    #[test]
    fn writes_code_verbatim_into_script_file() {
        let root = tempfile::tempdir().unwrap();
        let code = "echo \"$HOME\" `id`\r\n\u{00e9}\0tail";
        let workspace = Workspace::provision(root.path(), &descriptor(), code.as_bytes()).unwrap();

        assert_eq!(workspace.source_path().file_name().unwrap(), "script.sh");
        assert!(workspace.path().starts_with(root.path()));
        let written = std::fs::read(workspace.source_path()).unwrap();
        assert_eq!(written, code.as_bytes());

        let entries = std::fs::read_dir(workspace.path()).unwrap().count();
        assert_eq!(entries, 1);
    }

    #[test]
    fn concurrent_workspaces_never_share_a_path() {
        let root = tempfile::tempdir().unwrap();
        let a = Workspace::provision(root.path(), &descriptor(), b"true").unwrap();
        let b = Workspace::provision(root.path(), &descriptor(), b"true").unwrap();
        assert_ne!(a.path(), b.path());
    }

    #[test]
    fn close_removes_directory() {
        let root = tempfile::tempdir().unwrap();
        let workspace = Workspace::provision(root.path(), &descriptor(), b"true").unwrap();
        let path = workspace.path().to_path_buf();
        workspace.close();
        assert!(!path.exists());
    }

    #[test]
    fn drop_removes_directory() {
        let root = tempfile::tempdir().unwrap();
        let path = {
            let workspace = Workspace::provision(root.path(), &descriptor(), b"true").unwrap();
            workspace.path().to_path_buf()
        };
        assert!(!path.exists());
    }

    #[test]
    fn close_tolerates_directory_already_gone() {
        let root = tempfile::tempdir().unwrap();
        let workspace = Workspace::provision(root.path(), &descriptor(), b"true").unwrap();
        std::fs::remove_dir_all(workspace.path()).unwrap();
        workspace.close();
    }

    #[test]
    fn missing_root_is_a_provision_error() {
        let root = tempfile::tempdir().unwrap();
        let missing = root.path().join("does-not-exist");
        let err = Workspace::provision(&missing, &descriptor(), b"true").unwrap_err();
        assert!(matches!(err, EngineError::Provision(_)));
    }

    #[test]
    fn failed_write_removes_the_created_directory() {
        let root = tempfile::tempdir().unwrap();
        let descriptor =
            RuntimeDescriptor::new(".sh/no-such-dir/script", "sh", Duration::from_secs(1));
        let err = Workspace::provision(root.path(), &descriptor, b"true").unwrap_err();
        assert!(matches!(err, EngineError::Provision(_)));
        assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
    }
}
