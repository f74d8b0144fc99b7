// Player handoff - spawns mpv (or the configured player) with forwarded headers
//
// Attached: inherits stdio and blocks until the player exits.
// Detached: quiet, no terminal, returns the pid right after spawn.

use std::process::Stdio;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use super::config::ExtractorConfig;
use super::diagnostics::DiagnosticLog;
use super::errors::ExtractError;
use super::headers::{HeaderSet, MINIMAL_HEADERS};

/// What happened after a successful spawn
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchOutcome {
    /// Attached player ran to a clean exit
    Exited,
    /// Detached player is running
    Detached { pid: u32 },
}

/// Build mpv arguments: quiet flags (detached only), one header flag per
/// present header in User-Agent/Origin/Referer order, then the URL
pub fn build_args(url: &str, headers: &HeaderSet, attach: bool) -> Vec<String> {
    let mut args = Vec::new();
    if !attach {
        args.push("--no-terminal".to_string());
        args.push("--really-quiet".to_string());
    }

    for (lookup, display) in MINIMAL_HEADERS {
        if let Some(value) = headers.get(lookup).filter(|v| !v.trim().is_empty()) {
            args.push(format!("--http-header-fields={}: {}", display, value));
        }
    }

    args.push(url.to_string());
    args
}

fn default_url_opener() -> &'static str {
    if cfg!(target_os = "macos") {
        "open"
    } else {
        "xdg-open"
    }
}

/// Reap a detached child so it does not linger as a zombie
fn reap(mut child: tokio::process::Child) {
    tokio::spawn(async move {
        let _ = child.wait().await;
    });
}

pub struct PlayerLauncher {
    program: String,
    url_opener: Option<String>,
}

impl PlayerLauncher {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            url_opener: None,
        }
    }

    pub fn from_config(config: &ExtractorConfig) -> Self {
        Self {
            program: config.player.clone(),
            url_opener: config.url_opener.clone(),
        }
    }

    pub fn with_url_opener(mut self, opener: Option<String>) -> Self {
        self.url_opener = opener;
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    fn launch_failure(&self, e: impl std::fmt::Display) -> ExtractError {
        ExtractError::PlayerLaunchFailure {
            program: self.program.clone(),
            reason: e.to_string(),
        }
    }

    /// Start the player on `url` with already-normalized headers
    pub async fn launch(
        &self,
        url: &str,
        headers: &HeaderSet,
        attach: bool,
        log: &DiagnosticLog,
        cancel: &CancellationToken,
    ) -> Result<LaunchOutcome, ExtractError> {
        if url.trim().is_empty() {
            return Err(ExtractError::EmptyInput("playlist URL"));
        }

        let args = build_args(url, headers, attach);
        log.log(format!(
            "[player] launching {} ({}) with {} header flag(s)",
            self.program,
            if attach { "attached" } else { "detached" },
            args.iter()
                .filter(|a| a.starts_with("--http-header-fields"))
                .count()
        ));
        tracing::debug!("{} {:?}", self.program, args);

        let mut command = Command::new(&self.program);
        command.args(&args);

        if !attach {
            command
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null());
            let child = command.spawn().map_err(|e| self.launch_failure(e))?;
            let pid = child.id().unwrap_or_default();
            reap(child);
            log.log(format!("[player] {} started (pid {})", self.program, pid));
            return Ok(LaunchOutcome::Detached { pid });
        }

        command
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        let mut child = command.spawn().map_err(|e| self.launch_failure(e))?;

        let waited = tokio::select! {
            _ = cancel.cancelled() => None,
            status = child.wait() => Some(status),
        };
        let status = match waited {
            Some(status) => status.map_err(|e| self.launch_failure(e))?,
            None => {
                log.log(format!("[player] cancelled, stopping {}", self.program));
                let _ = child.kill().await;
                return Err(ExtractError::Cancelled);
            }
        };

        if status.success() {
            log.log(format!("[player] {} exited", self.program));
            Ok(LaunchOutcome::Exited)
        } else {
            log.log(format!("[player] {} exited with {}", self.program, status));
            Err(ExtractError::PlayerExitError {
                program: self.program.clone(),
                status: status.to_string(),
            })
        }
    }

    /// Hand the raw embed URL to the player, detached, without headers
    pub async fn play_raw(
        &self,
        embed_url: &str,
        log: &DiagnosticLog,
    ) -> Result<LaunchOutcome, ExtractError> {
        self.launch(
            embed_url,
            &HeaderSet::new(),
            false,
            log,
            &CancellationToken::new(),
        )
        .await
    }

    /// Open a URL in the system browser, fire-and-forget
    pub fn open_in_browser(&self, url: &str, log: &DiagnosticLog) -> Result<(), ExtractError> {
        if url.trim().is_empty() {
            return Err(ExtractError::EmptyInput("URL"));
        }
        let opener = self
            .url_opener
            .as_deref()
            .unwrap_or(default_url_opener());

        let child = Command::new(opener)
            .arg(url)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| ExtractError::PlayerLaunchFailure {
                program: opener.to_string(),
                reason: e.to_string(),
            })?;
        reap(child);
        log.log(format!("[player] opened {} with {}", url, opener));
        Ok(())
    }
}
