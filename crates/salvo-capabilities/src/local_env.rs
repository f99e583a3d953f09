use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use globset::Glob;
use salvo_types::SalvoError;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::environment::{DirEntry, ExecResult, ExecutionEnvironment};

/// Kills a command's whole process group if its wait is abandoned, e.g. when
/// the caller's own deadline drops the future first.
struct GroupGuard {
    #[cfg_attr(not(unix), allow(dead_code))]
    pid: Option<u32>,
}

impl GroupGuard {
    fn disarm(&mut self) {
        self.pid = None;
    }
}

impl Drop for GroupGuard {
    fn drop(&mut self) {
        #[cfg(unix)]
        if let Some(pid) = self.pid.take() {
            // The child is not reaped yet, so the group id is still ours.
            unsafe {
                libc::kill(-(pid as i32), libc::SIGKILL);
            }
        }
    }
}

/// Concrete execution environment that runs on the local filesystem.
pub struct LocalExecutionEnvironment {
    working_dir: PathBuf,
}

impl LocalExecutionEnvironment {
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: working_dir.into(),
        }
    }

    pub fn current_dir() -> std::io::Result<Self> {
        Ok(Self::new(std::env::current_dir()?))
    }
}

#[async_trait]
impl ExecutionEnvironment for LocalExecutionEnvironment {
    async fn read_file(&self, path: &Path) -> salvo_types::Result<String> {
        let resolved = self.resolve(path);
        Ok(tokio::fs::read_to_string(&resolved).await?)
    }

    async fn write_file(&self, path: &Path, content: &str) -> salvo_types::Result<()> {
        let resolved = self.resolve(path);
        if let Some(parent) = resolved.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        Ok(tokio::fs::write(&resolved, content).await?)
    }

    async fn append_file(&self, path: &Path, content: &str) -> salvo_types::Result<()> {
        let resolved = self.resolve(path);
        if let Some(parent) = resolved.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&resolved)
            .await?;
        file.write_all(content.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    async fn file_exists(&self, path: &Path) -> salvo_types::Result<bool> {
        let resolved = self.resolve(path);
        Ok(tokio::fs::try_exists(&resolved).await?)
    }

    async fn list_directory(
        &self,
        path: &Path,
        pattern: Option<&str>,
    ) -> salvo_types::Result<Vec<DirEntry>> {
        let resolved = self.resolve(path);
        let matcher = match pattern {
            Some(p) => Some(
                Glob::new(p)
                    .map_err(|e| SalvoError::capability("list_directory", e.to_string()))?
                    .compile_matcher(),
            ),
            None => None,
        };

        let mut entries = Vec::new();
        let mut read_dir = tokio::fs::read_dir(&resolved).await?;
        while let Some(entry) = read_dir.next_entry().await? {
            if let Some(matcher) = &matcher {
                if !matcher.is_match(entry.file_name()) {
                    continue;
                }
            }
            let meta = entry.metadata().await?;
            entries.push(DirEntry {
                path: entry.path(),
                is_dir: meta.is_dir(),
                size: meta.len(),
            });
        }
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(entries)
    }

    async fn exec_command(
        &self,
        command: &str,
        timeout_ms: u64,
        cwd: Option<&Path>,
        env_vars: Option<&HashMap<String, String>>,
    ) -> salvo_types::Result<ExecResult> {
        let work_dir = cwd
            .map(|p| self.resolve(p))
            .unwrap_or_else(|| self.working_dir.clone());

        let mut cmd = tokio::process::Command::new("sh");
        cmd.args(["-c", command])
            .current_dir(&work_dir)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true);

        // On Unix, use process_group for clean kill
        #[cfg(unix)]
        {
            cmd.process_group(0);
        }

        if let Some(vars) = env_vars {
            cmd.envs(vars);
        }

        let start = tokio::time::Instant::now();
        let mut child = cmd.spawn()?;
        let mut group = GroupGuard { pid: child.id() };

        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| SalvoError::capability("shell", "stdout was not piped"))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| SalvoError::capability("shell", "stderr was not piped"))?;

        // Drain both pipes while waiting so a chatty command cannot block on a full pipe.
        let stdout_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            let _ = stdout.read_to_end(&mut buf).await;
            buf
        });
        let stderr_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            let _ = stderr.read_to_end(&mut buf).await;
            buf
        });

        let timeout_dur = std::time::Duration::from_millis(timeout_ms);

        tokio::select! {
            status = child.wait() => {
                group.disarm();
                let status = status?;
                let stdout_buf = stdout_task.await.unwrap_or_default();
                let stderr_buf = stderr_task.await.unwrap_or_default();

                Ok(ExecResult {
                    stdout: String::from_utf8_lossy(&stdout_buf).to_string(),
                    stderr: String::from_utf8_lossy(&stderr_buf).to_string(),
                    exit_code: status.code().unwrap_or(-1),
                    timed_out: false,
                    duration_ms: start.elapsed().as_millis() as u64,
                })
            }
            _ = tokio::time::sleep(timeout_dur) => {
                #[cfg(unix)]
                {
                    if let Some(pid) = child.id() {
                        // SIGTERM the whole process group
                        unsafe { libc::kill(-(pid as i32), libc::SIGTERM); }
                    }
                    tokio::select! {
                        _ = child.wait() => {}
                        _ = tokio::time::sleep(std::time::Duration::from_secs(2)) => {
                            let _ = child.kill().await;
                        }
                    }
                }
                #[cfg(not(unix))]
                {
                    let _ = child.kill().await;
                }
                group.disarm();
                stdout_task.abort();
                stderr_task.abort();

                Ok(ExecResult {
                    stdout: String::new(),
                    stderr: format!("Command timed out after {}ms", timeout_ms),
                    exit_code: -1,
                    timed_out: true,
                    duration_ms: start.elapsed().as_millis() as u64,
                })
            }
        }
    }

    fn working_directory(&self) -> &Path {
        &self.working_dir
    }
}
