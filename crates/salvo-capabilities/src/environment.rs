use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

/// Result of executing a shell command.
#[derive(Debug, Clone)]
pub struct ExecResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub timed_out: bool,
    pub duration_ms: u64,
}

impl ExecResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0 && !self.timed_out
    }
}

/// Entry returned by directory listing.
#[derive(Debug, Clone)]
pub struct DirEntry {
    pub path: PathBuf,
    pub is_dir: bool,
    pub size: u64,
}

/// Abstraction over the filesystem and process environment that action
/// handlers operate in.
#[async_trait]
pub trait ExecutionEnvironment: Send + Sync {
    async fn read_file(&self, path: &Path) -> salvo_types::Result<String>;
    async fn write_file(&self, path: &Path, content: &str) -> salvo_types::Result<()>;
    async fn append_file(&self, path: &Path, content: &str) -> salvo_types::Result<()>;
    async fn file_exists(&self, path: &Path) -> salvo_types::Result<bool>;
    /// Immediate entries of `path`, sorted by path. When `pattern` is given only
    /// entries whose file name matches the glob are returned.
    async fn list_directory(
        &self,
        path: &Path,
        pattern: Option<&str>,
    ) -> salvo_types::Result<Vec<DirEntry>>;
    async fn exec_command(
        &self,
        command: &str,
        timeout_ms: u64,
        cwd: Option<&Path>,
        env_vars: Option<&HashMap<String, String>>,
    ) -> salvo_types::Result<ExecResult>;
    fn working_directory(&self) -> &Path;

    /// Resolve a path relative to the working directory if it is not absolute.
    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.working_directory().join(path)
        }
    }
}
