//! `yt-dlp` process adapter

use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{DownloadEngine, EngineError, EngineRequest, ItemLimit};
use crate::credentials::CookiePayload;

/// Cookie jar written into the workspace for one invocation; dot-prefixed so it is
/// never mistaken for engine output
pub const COOKIE_FILE_NAME: &str = ".cookies.txt";

/// Runs the `yt-dlp` binary as a child process
#[derive(Debug, Clone)]
pub struct YtDlpEngine {
    binary: PathBuf,
    extra_args: Vec<String>,
}

impl YtDlpEngine {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            extra_args: Vec::new(),
        }
    }

    pub fn with_extra_args(mut self, args: Vec<String>) -> Self {
        self.extra_args = args;
        self
    }

    /// Command line for a request; `cookie_file` is the jar written for a Netscape payload
    pub fn build_args(&self, request: &EngineRequest, cookie_file: Option<&Path>) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "--newline".into(),
            "--no-progress".into(),
            "--no-overwrites".into(),
            "-o".into(),
            request.output_template.clone().into(),
        ];

        if request.restrict_filenames {
            args.push("--restrict-filenames".into());
        }

        if request.playlist {
            args.push("--yes-playlist".into());
        } else {
            args.push("--no-playlist".into());
        }

        if let ItemLimit::AtMost(n) = request.limit {
            args.push("--playlist-end".into());
            args.push(n.to_string().into());
        }

        match (&request.cookies, cookie_file) {
            (Some(CookiePayload::Netscape(_)), Some(path)) => {
                args.push("--cookies".into());
                args.push(path.as_os_str().to_owned());
            }
            (Some(CookiePayload::Browser { browser, profile }), _) => {
                let spec = match profile {
                    Some(profile) => format!("{}:{}", browser, profile),
                    None => browser.clone(),
                };
                args.push("--cookies-from-browser".into());
                args.push(spec.into());
            }
            _ => {}
        }

        args.extend(self.extra_args.iter().map(OsString::from));
        args.push("--".into());
        args.push(request.url.clone().into());
        args
    }

    async fn write_cookie_jar(&self, request: &EngineRequest) -> Result<Option<PathBuf>, EngineError> {
        let Some(CookiePayload::Netscape(contents)) = &request.cookies else {
            return Ok(None);
        };

        let path = request.workspace.join(COOKIE_FILE_NAME);
        tokio::fs::write(&path, contents)
            .await
            .map_err(|e| EngineError::new(format!("failed to write cookie jar: {}", e)))?;
        Ok(Some(path))
    }
}

#[async_trait]
impl DownloadEngine for YtDlpEngine {
    fn name(&self) -> &str {
        "yt-dlp"
    }

    async fn fetch(
        &self,
        request: &EngineRequest,
        cancel: &CancellationToken,
    ) -> Result<(), EngineError> {
        let cookie_file = self.write_cookie_jar(request).await?;
        let args = self.build_args(request, cookie_file.as_deref());

        debug!(
            binary = %self.binary.display(),
            url = %request.url,
            workspace = %request.workspace.display(),
            "Starting engine"
        );

        let result = match Command::new(&self.binary)
            .args(&args)
            .current_dir(&request.workspace)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
        {
            Ok(child) => tokio::select! {
                output = child.wait_with_output() => {
                    output.map_err(EngineError::spawn).and_then(check_exit)
                }
                _ = cancel.cancelled() => {
                    warn!(url = %request.url, "Engine invocation cancelled");
                    Err(EngineError::cancelled())
                }
            },
            Err(e) => Err(EngineError::spawn(e)),
        };

        if let Some(path) = cookie_file {
            if let Err(e) = tokio::fs::remove_file(&path).await {
                warn!(path = %path.display(), error = %e, "Failed to remove cookie jar");
            }
        }

        result
    }
}

fn check_exit(output: Output) -> Result<(), EngineError> {
    if output.status.success() {
        return Ok(());
    }
    let stderr = String::from_utf8_lossy(&output.stderr);
    Err(EngineError::from_stderr(&stderr, output.status.code()))
}
