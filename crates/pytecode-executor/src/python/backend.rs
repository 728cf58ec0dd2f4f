//! `ExecutionBackend` over a local CPython subprocess.

use std::{
    path::{Path, PathBuf},
    process::Stdio,
};

use async_trait::async_trait;
use command_group::AsyncCommandGroup;
use pytecode_core::{
    LibrarySet, OutputChunk,
    library::import_name,
    traits::{BackendError, ExecutionBackend, StreamSender},
};
use tempfile::TempDir;
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, BufReader},
    process::Command,
    sync::{Mutex, RwLock},
};
use uuid::Uuid;

use super::{plots, runner};
use crate::{CommandBuilder, CommandParts, PythonConfig, command::CommandBuildError};

/// Resolved interpreter executable.
#[derive(Debug, Clone)]
struct Interpreter {
    program: PathBuf,
}

fn unavailable(e: CommandBuildError) -> BackendError {
    BackendError::RuntimeUnavailable(e.to_string())
}

/// Runs each program in a fresh interpreter process.
///
/// Every run gets its own temporary directory holding the source, the
/// runner script, and any plots. The directory of the last successful
/// run is kept until its plots are collected.
pub struct PythonBackend {
    config: PythonConfig,
    command: CommandBuilder,
    interpreter: RwLock<Option<Interpreter>>,
    last_run: Mutex<Option<TempDir>>,
}

impl PythonBackend {
    /// Create a backend. Nothing is spawned until `load_runtime`.
    #[must_use]
    pub fn new(config: PythonConfig) -> Self {
        let command = CommandBuilder::new(config.interpreter.clone());
        Self {
            config,
            command,
            interpreter: RwLock::new(None),
            last_run: Mutex::new(None),
        }
    }

    #[must_use]
    pub const fn config(&self) -> &PythonConfig {
        &self.config
    }

    async fn interpreter(&self) -> Result<Interpreter, BackendError> {
        self.interpreter.read().await.clone().ok_or_else(|| {
            BackendError::RuntimeUnavailable("runtime has not been loaded".to_string())
        })
    }

    /// `parts` with its program replaced by the resolved interpreter.
    fn base_command(&self, interpreter: &Interpreter, parts: CommandParts) -> Command {
        let mut cmd = Command::new(&interpreter.program);
        cmd.args(parts.args)
            .current_dir(&self.config.working_dir)
            .envs(&self.config.env)
            .env("PYTHONIOENCODING", "utf-8")
            .env("PYTHONUNBUFFERED", "1")
            .stdin(Stdio::null());
        cmd
    }

    /// Run a `-c` snippet to completion, returning stdout or stderr.
    async fn probe(&self, interpreter: &Interpreter, code: &str) -> Result<Result<String, String>, BackendError> {
        let parts = self.command.build_inline(code).map_err(unavailable)?;
        let output = self.base_command(interpreter, parts).output().await?;
        if output.status.success() {
            Ok(Ok(String::from_utf8_lossy(&output.stdout).trim().to_string()))
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stderr = stderr.trim();
            if stderr.is_empty() {
                Ok(Err(format!("interpreter exited with {}", output.status)))
            } else {
                Ok(Err(runner::summarize_traceback(stderr).to_string()))
            }
        }
    }

    async fn prepare_run_dir(source: &str) -> Result<TempDir, BackendError> {
        let dir = tempfile::Builder::new().prefix("pytecode-run-").tempdir()?;
        tokio::fs::write(dir.path().join(runner::SOURCE_FILE), source).await?;
        tokio::fs::write(dir.path().join(runner::RUNNER_FILE), runner::RUNNER_SCRIPT).await?;
        Ok(dir)
    }

    fn run_command(&self, interpreter: &Interpreter, run_dir: &Path) -> Result<Command, BackendError> {
        let parts = self
            .command
            .build_script(&run_dir.join(runner::RUNNER_FILE))
            .map_err(unavailable)?;
        let mut cmd = self.base_command(interpreter, parts);
        cmd.env(runner::RUN_DIR_ENV, run_dir)
            .env("MPLBACKEND", "Agg")
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        Ok(cmd)
    }
}

/// Forward each output line until EOF. Bytes that are not UTF-8 are
/// replaced rather than ending the stream.
async fn forward_lines<R>(reader: R, output: &StreamSender, wrap: fn(String) -> OutputChunk)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                let line = line.strip_suffix('\n').unwrap_or(&*line);
                let line = line.strip_suffix('\r').unwrap_or(line);
                if output.send(wrap(line.to_string())).is_err() {
                    break;
                }
            }
            Err(e) => {
                tracing::warn!("Failed to read interpreter output: {e}");
                break;
            }
        }
    }
}

#[async_trait]
impl ExecutionBackend for PythonBackend {
    async fn load_runtime(&self) -> Result<(), BackendError> {
        let parts = self.command.build_interpreter().map_err(unavailable)?;
        let (program, _) = parts.into_resolved().await.map_err(unavailable)?;
        let interpreter = Interpreter { program };

        let version = self
            .probe(&interpreter, "import sys; print(sys.version.split()[0])")
            .await?
            .map_err(BackendError::RuntimeUnavailable)?;

        tracing::info!(
            interpreter = %interpreter.program.display(),
            %version,
            "Python runtime loaded"
        );
        *self.interpreter.write().await = Some(interpreter);
        Ok(())
    }

    async fn load_libraries(&self, libraries: &LibrarySet) -> Result<(), BackendError> {
        let interpreter = self.interpreter().await?;
        for library in libraries {
            let module = import_name(library);
            tracing::debug!(%library, %module, "Importing library");
            if let Err(message) = self.probe(&interpreter, &format!("import {module}")).await? {
                return Err(BackendError::LibraryLoad {
                    library: library.clone(),
                    message,
                });
            }
        }
        Ok(())
    }

    async fn run_source(&self, source: &str, output: StreamSender) -> Result<(), BackendError> {
        let interpreter = self.interpreter().await?;
        let run_id = Uuid::new_v4();
        let run_dir = Self::prepare_run_dir(source).await?;
        tracing::debug!(%run_id, dir = %run_dir.path().display(), "Starting run");

        let mut child = self.run_command(&interpreter, run_dir.path())?.group_spawn()?;
        let stdout = child
            .inner()
            .stdout
            .take()
            .ok_or_else(|| std::io::Error::other("stdout was not captured"))?;
        let stderr = child
            .inner()
            .stderr
            .take()
            .ok_or_else(|| std::io::Error::other("stderr was not captured"))?;

        let completion = async {
            let (status, (), ()) = tokio::join!(
                child.wait(),
                forward_lines(stdout, &output, OutputChunk::Stdout),
                forward_lines(stderr, &output, OutputChunk::Stderr),
            );
            status
        };

        let status = match self.config.run_timeout {
            None => completion.await?,
            Some(limit) => {
                let outcome = tokio::time::timeout(limit, completion).await;
                if let Ok(status) = outcome {
                    status?
                } else {
                    tracing::warn!(%run_id, "Run timed out, killing process group");
                    if let Err(e) = child.start_kill() {
                        tracing::error!(%run_id, "Failed to kill run: {e}");
                    }
                    let _ = child.wait().await;
                    return Err(BackendError::Runtime(format!(
                        "execution timed out after {}s",
                        limit.as_secs()
                    )));
                }
            }
        };

        if let Some(traceback) = runner::read_error(run_dir.path()).await {
            tracing::debug!(%run_id, "Run raised: {}", runner::summarize_traceback(&traceback));
            return Err(BackendError::Runtime(traceback));
        }
        if !status.success() {
            return Err(BackendError::Runtime(format!("process exited with {status}")));
        }

        tracing::debug!(%run_id, "Run completed");
        *self.last_run.lock().await = Some(run_dir);
        Ok(())
    }

    async fn collect_images(&self) -> Result<Vec<String>, BackendError> {
        let Some(run_dir) = self.last_run.lock().await.take() else {
            return Ok(Vec::new());
        };
        Ok(plots::collect_plots(run_dir.path()).await?)
    }
}
