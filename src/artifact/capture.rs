// src/artifact/capture.rs
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use crate::error::CaptureError;

/// Hands out capture sessions. A session is acquired once per cycle and
/// released by the orchestrator on every exit path.
#[async_trait]
pub trait ArtifactCapturer: Send + Sync {
    async fn acquire(&self) -> Result<Box<dyn CaptureSession>, CaptureError>;
}

#[async_trait]
pub trait CaptureSession: Send {
    async fn capture(&mut self, url: &str, dest: &Path) -> Result<(), CaptureError>;
    async fn release(self: Box<Self>);
}

/// Headless browser screenshots through the browser's own CLI
/// (`--headless --screenshot=...`). Each session gets a scratch profile
/// directory that is deleted on release.
#[derive(Debug, Clone)]
pub struct CommandCapturer {
    browser: PathBuf,
    scratch_root: PathBuf,
    window: (u32, u32),
    timeout: Duration,
}

impl CommandCapturer {
    pub fn new(browser: impl Into<PathBuf>, scratch_root: impl Into<PathBuf>) -> Self {
        Self {
            browser: browser.into(),
            scratch_root: scratch_root.into(),
            window: (1280, 2400),
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_window(mut self, width: u32, height: u32) -> Self {
        self.window = (width, height);
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }
}

#[async_trait]
impl ArtifactCapturer for CommandCapturer {
    async fn acquire(&self) -> Result<Box<dyn CaptureSession>, CaptureError> {
        if !tokio::fs::try_exists(&self.browser).await.unwrap_or(false) {
            return Err(CaptureError::Driver(format!(
                "browser binary not found at {}",
                self.browser.display()
            )));
        }

        let stamp = chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default();
        let profile_dir = self
            .scratch_root
            .join(format!("profile-{}-{stamp}", std::process::id()));
        tokio::fs::create_dir_all(&profile_dir).await?;

        tracing::debug!(profile = %profile_dir.display(), "capture session acquired");
        Ok(Box::new(CommandSession {
            browser: self.browser.clone(),
            profile_dir,
            window: self.window,
            timeout: self.timeout,
        }))
    }
}

struct CommandSession {
    browser: PathBuf,
    profile_dir: PathBuf,
    window: (u32, u32),
    timeout: Duration,
}

#[async_trait]
impl CaptureSession for CommandSession {
    async fn capture(&mut self, url: &str, dest: &Path) -> Result<(), CaptureError> {
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut cmd = Command::new(&self.browser);
        cmd.arg("--headless")
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--hide-scrollbars")
            .arg(format!("--user-data-dir={}", self.profile_dir.display()))
            .arg(format!("--window-size={},{}", self.window.0, self.window.1))
            .arg(format!("--screenshot={}", dest.display()))
            .arg(url)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| CaptureError::Failed {
                url: url.to_string(),
                message: format!("timed out after {}s", self.timeout.as_secs()),
            })??;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CaptureError::Failed {
                url: url.to_string(),
                message: format!("{}: {}", output.status, stderr.trim()),
            });
        }
        if !tokio::fs::try_exists(dest).await.unwrap_or(false) {
            return Err(CaptureError::Failed {
                url: url.to_string(),
                message: "browser exited without writing a screenshot".to_string(),
            });
        }
        Ok(())
    }

    async fn release(self: Box<Self>) {
        if let Err(e) = tokio::fs::remove_dir_all(&self.profile_dir).await {
            tracing::warn!(profile = %self.profile_dir.display(), error = %e, "capture profile cleanup failed");
        } else {
            tracing::debug!(profile = %self.profile_dir.display(), "capture session released");
        }
    }
}
