// External runtime detection: headless browser, media player, URL opener

use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::errors::ExtractError;
use super::utils::run_output_with_timeout;

const VERSION_TIMEOUT_SECS: u64 = 5;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum ToolType {
    Chromium,
    Mpv,
    UrlOpener,
}

impl ToolType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolType::Chromium => "chromium",
            ToolType::Mpv => "mpv",
            ToolType::UrlOpener => "url-opener",
        }
    }

    /// Binary names tried in order
    fn binaries(&self) -> &'static [&'static str] {
        match self {
            ToolType::Chromium => &[
                "google-chrome",
                "google-chrome-stable",
                "chromium",
                "chromium-browser",
            ],
            ToolType::Mpv => &["mpv"],
            ToolType::UrlOpener if cfg!(target_os = "macos") => &["open"],
            ToolType::UrlOpener => &["xdg-open"],
        }
    }

    fn bundle_paths(&self) -> &'static [&'static str] {
        match self {
            ToolType::Chromium => &[
                "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
                "/Applications/Chromium.app/Contents/MacOS/Chromium",
            ],
            _ => &[],
        }
    }

    fn version_arg(&self) -> Option<&'static str> {
        match self {
            ToolType::Chromium | ToolType::Mpv => Some("--version"),
            ToolType::UrlOpener => None,
        }
    }

    fn missing(&self) -> ExtractError {
        let reason = format!("{} not found (tried {})", self.as_str(), self.binaries().join(", "));
        match self {
            ToolType::Chromium => ExtractError::BrowserLaunchFailure(reason),
            ToolType::Mpv | ToolType::UrlOpener => ExtractError::PlayerLaunchFailure {
                program: self.binaries()[0].to_string(),
                reason,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInfo {
    pub name: String,
    pub tool_type: ToolType,
    pub version: Option<String>,
    pub path: Option<PathBuf>,
    pub is_available: bool,
}

#[derive(Default)]
pub struct ToolManager;

impl ToolManager {
    pub fn new() -> Self {
        Self
    }

    pub async fn get_tool_info(&self, tool_type: ToolType) -> ToolInfo {
        let path = self.detect_tool(tool_type).await;
        let version = match &path {
            Some(p) => self.get_version(p, tool_type).await,
            None => None,
        };

        ToolInfo {
            name: tool_type.as_str().to_string(),
            tool_type,
            version,
            is_available: path.is_some(),
            path,
        }
    }

    pub async fn get_all_tools(&self) -> Vec<ToolInfo> {
        vec![
            self.get_tool_info(ToolType::Chromium).await,
            self.get_tool_info(ToolType::Mpv).await,
            self.get_tool_info(ToolType::UrlOpener).await,
        ]
    }

    async fn detect_tool(&self, tool_type: ToolType) -> Option<PathBuf> {
        // 1. Try common paths first
        let prefixes = ["/opt/homebrew/bin", "/usr/local/bin", "/usr/bin", "/snap/bin"];
        let common = tool_type.binaries().iter().flat_map(|binary| {
            prefixes
                .iter()
                .map(move |prefix| Path::new(prefix).join(binary))
        });
        let bundles = tool_type.bundle_paths().iter().map(PathBuf::from);

        if let Some(found) = common.chain(bundles).find(|p| p.exists()) {
            return Some(found);
        }

        // 2. Try PATH
        for binary in tool_type.binaries() {
            if let Ok(output) =
                run_output_with_timeout("which", vec![binary.to_string()], VERSION_TIMEOUT_SECS).await
            {
                if output.status.success() {
                    let path = String::from_utf8_lossy(&output.stdout).trim().to_string();
                    if !path.is_empty() {
                        return Some(PathBuf::from(path));
                    }
                }
            }
        }

        None
    }

    async fn get_version(&self, path: &Path, tool_type: ToolType) -> Option<String> {
        let arg = tool_type.version_arg()?;
        let program = path.to_string_lossy();
        match run_output_with_timeout(&program, vec![arg.to_string()], VERSION_TIMEOUT_SECS).await {
            Ok(output) if output.status.success() => String::from_utf8_lossy(&output.stdout)
                .lines()
                .next()
                .map(|line| line.trim().to_string())
                .filter(|line| !line.is_empty()),
            _ => None,
        }
    }
}

lazy_static! {
    static ref RUNTIME_CACHE: Mutex<HashMap<ToolType, PathBuf>> = Mutex::new(HashMap::new());
}

/// Locate a runtime, caching the answer for the rest of the process.
/// Misses are not cached so a tool installed mid-session is picked up.
pub async fn ensure_runtime_available(tool_type: ToolType) -> Result<PathBuf, ExtractError> {
    if let Some(path) = RUNTIME_CACHE
        .lock()
        .ok()
        .and_then(|c| c.get(&tool_type).cloned())
    {
        return Ok(path);
    }

    let path = ToolManager::new()
        .detect_tool(tool_type)
        .await
        .ok_or_else(|| tool_type.missing())?;
    tracing::info!("{} runtime found at {}", tool_type.as_str(), path.display());

    if let Ok(mut c) = RUNTIME_CACHE.lock() {
        c.insert(tool_type, path.clone());
    }
    Ok(path)
}
