// src/exec/output.rs

//! Redirecting a child's stdout/stderr into its log files.
//!
//! Every stdout line goes to the out file and the combined file; every
//! stderr line goes to the error file and the combined file. With
//! timestamps enabled each line is prefixed with local time
//! (`2024-05-01T12:00:00: `).

use std::path::Path;
use std::sync::Arc;

use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::{ChildStderr, ChildStdout};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{trace, warn};

use crate::config::LogPaths;
use crate::errors::{ProcwardenError, Result};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

type SharedFile = Arc<Mutex<File>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stream {
    Stdout,
    Stderr,
}

/// Open log files for one running instance.
#[derive(Clone)]
pub struct LogSinks {
    out: SharedFile,
    error: SharedFile,
    combined: SharedFile,
    timestamps: bool,
}

impl LogSinks {
    /// Open (creating parents as needed) all three files for append.
    pub async fn open(paths: &LogPaths, timestamps: bool) -> Result<Self> {
        Ok(Self {
            out: Arc::new(Mutex::new(open_append(&paths.out).await?)),
            error: Arc::new(Mutex::new(open_append(&paths.error).await?)),
            combined: Arc::new(Mutex::new(open_append(&paths.combined).await?)),
            timestamps,
        })
    }

    pub async fn write_stdout(&self, line: &str) -> std::io::Result<()> {
        self.write(Stream::Stdout, line).await
    }

    pub async fn write_stderr(&self, line: &str) -> std::io::Result<()> {
        self.write(Stream::Stderr, line).await
    }

    /// Start copying the child's pipes into the files. The returned handles
    /// finish when the corresponding pipe closes.
    pub fn attach(
        &self,
        stdout: Option<ChildStdout>,
        stderr: Option<ChildStderr>,
    ) -> Vec<JoinHandle<()>> {
        let mut pumps = Vec::with_capacity(2);
        if let Some(stdout) = stdout {
            pumps.push(self.pump(stdout, Stream::Stdout));
        }
        if let Some(stderr) = stderr {
            pumps.push(self.pump(stderr, Stream::Stderr));
        }
        pumps
    }

    fn pump<R>(&self, reader: R, stream: Stream) -> JoinHandle<()>
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let sinks = self.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(reader).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                trace!(?stream, "{}", line);
                if let Err(e) = sinks.write(stream, &line).await {
                    warn!(?stream, error = %e, "failed to write process output to log file");
                }
            }
        })
    }

    async fn write(&self, stream: Stream, line: &str) -> std::io::Result<()> {
        let entry = format_line(line, self.timestamps);
        let primary = match stream {
            Stream::Stdout => &self.out,
            Stream::Stderr => &self.error,
        };

        append(primary, &entry).await?;
        append(&self.combined, &entry).await
    }
}

/// Check that all three paths can be opened for append.
pub async fn check_writable(paths: &LogPaths) -> Result<()> {
    LogSinks::open(paths, false).await.map(|_| ())
}

async fn open_append(path: &Path) -> Result<File> {
    let log_err = |source: std::io::Error| ProcwardenError::LogPath {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await.map_err(log_err)?;
        }
    }

    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .map_err(log_err)
}

async fn append(file: &SharedFile, entry: &str) -> std::io::Result<()> {
    let mut file = file.lock().await;
    file.write_all(entry.as_bytes()).await?;
    file.flush().await
}

fn format_line(line: &str, timestamps: bool) -> String {
    if timestamps {
        let now = chrono::Local::now().format(TIMESTAMP_FORMAT);
        format!("{now}: {line}\n")
    } else {
        format!("{line}\n")
    }
}
