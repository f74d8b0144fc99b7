// Extraction orchestrator - one resolver, deadline, normalization, player handoff
//
// Strategy:
// 1. Derive headers for the embed URL
// 2. Run the single configured resolver under an overall deadline
// 3. Reduce captured headers to the minimal set
// 4. Launch the player (attached or detached)
//
// No fallback to a different resolver: the first terminal failure is
// returned, tagged with the stage that produced it.

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::config::ExtractorConfig;
use super::diagnostics::DiagnosticLog;
use super::errors::{ExtractError, Stage, StageError};
use super::headers::{derive_headers, normalize};
use super::http::{HttpTransport, ReqwestTransport};
use super::models::{CapturedStream, EmbedReference};
use super::player::{LaunchOutcome, PlayerLauncher};
use super::resolvers::static_probe::StaticSettings;
use super::resolvers::{DirectResolver, StaticResolver};
use super::traits::{Resolver, ResolverMode};

#[cfg(feature = "browser")]
fn browser_resolver(config: &ExtractorConfig) -> Result<Box<dyn Resolver>, ExtractError> {
    Ok(Box::new(super::resolvers::BrowserResolver::from_config(config)))
}

#[cfg(not(feature = "browser"))]
fn browser_resolver(_config: &ExtractorConfig) -> Result<Box<dyn Resolver>, ExtractError> {
    Err(ExtractError::BrowserLaunchFailure(
        "browser support not compiled".to_string(),
    ))
}

/// Orchestrator owning exactly one resolver and the player
pub struct ExtractionOrchestrator {
    resolver: Box<dyn Resolver>,
    player: PlayerLauncher,
    deadline: Duration,
}

impl ExtractionOrchestrator {
    pub fn new(resolver: Box<dyn Resolver>, player: PlayerLauncher) -> Self {
        Self {
            resolver,
            player,
            deadline: ExtractorConfig::default().resolve_deadline(),
        }
    }

    /// Build the resolver selected by `config.mode`
    pub fn from_config(config: &ExtractorConfig) -> Result<Self, ExtractError> {
        let resolver: Box<dyn Resolver> = match config.mode {
            ResolverMode::Browser => browser_resolver(config)?,
            ResolverMode::Static => {
                let transport: Arc<dyn HttpTransport> =
                    Arc::new(ReqwestTransport::new(config.proxy.as_deref())?);
                Box::new(StaticResolver::new(
                    transport,
                    StaticSettings::from_config(config),
                ))
            }
            ResolverMode::Direct => {
                let transport: Arc<dyn HttpTransport> =
                    Arc::new(ReqwestTransport::new(config.proxy.as_deref())?);
                Box::new(DirectResolver::new(transport))
            }
        };
        tracing::info!("using {} resolver", resolver.name());

        Ok(Self::new(resolver, PlayerLauncher::from_config(config))
            .with_deadline(config.resolve_deadline()))
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn resolver_name(&self) -> &'static str {
        self.resolver.name()
    }

    pub fn player(&self) -> &PlayerLauncher {
        &self.player
    }

    /// Resolve and normalize without launching anything
    pub async fn resolve(
        &self,
        embed_url: &str,
        log: &DiagnosticLog,
        cancel: &CancellationToken,
    ) -> Result<CapturedStream, StageError> {
        let embed = derive_headers(embed_url).map_err(|e| {
            log.log(format!("[orchestrator] rejected embed URL: {}", e));
            StageError::new(Stage::Input, e)
        })?;
        log.log(format!(
            "[orchestrator] resolving {} with {} (deadline {}s)",
            embed.url,
            self.resolver.name(),
            self.deadline.as_secs()
        ));

        let stage = Stage::Resolve(self.resolver.name());
        let captured = self
            .resolve_with_deadline(&embed, log, cancel)
            .await
            .map_err(|e| StageError::new(stage, e))?;

        let normalized = normalize(&captured.headers);
        log.log(format!(
            "[orchestrator] forwarding {} of {} captured header(s)",
            normalized.len(),
            captured.headers.len()
        ));
        let stream = CapturedStream::new(captured.playlist_url, normalized, captured.discovery_method)
            .map_err(|e| StageError::new(Stage::Normalize, e))?;

        log.log(format!(
            "[orchestrator] resolved via {}: {}",
            stream.discovery_method, stream.playlist_url
        ));
        Ok(stream)
    }

    /// Run the resolver under a child token that the deadline cancels
    async fn resolve_with_deadline(
        &self,
        embed: &EmbedReference,
        log: &DiagnosticLog,
        cancel: &CancellationToken,
    ) -> Result<CapturedStream, ExtractError> {
        let scoped = cancel.child_token();
        let timer = {
            let scoped = scoped.clone();
            let deadline = self.deadline;
            tokio::spawn(async move {
                tokio::time::sleep(deadline).await;
                scoped.cancel();
            })
        };

        let result = self.resolver.resolve(embed, log, &scoped).await;
        timer.abort();

        match result {
            Err(ExtractError::Cancelled) if !cancel.is_cancelled() => {
                log.log(format!(
                    "[orchestrator] deadline of {}s reached",
                    self.deadline.as_secs()
                ));
                Err(ExtractError::CaptureTimeout(self.deadline))
            }
            other => other,
        }
    }

    async fn resolve_and_launch(
        &self,
        embed_url: &str,
        attach: bool,
        log: &DiagnosticLog,
        cancel: &CancellationToken,
    ) -> Result<LaunchOutcome, StageError> {
        let stream = self.resolve(embed_url, log, cancel).await?;
        self.player
            .launch(&stream.playlist_url, &stream.headers, attach, log, cancel)
            .await
            .map_err(|e| StageError::new(Stage::Launch, e))
    }

    /// Resolve, then play attached until the player exits
    pub async fn run(
        &self,
        embed_url: &str,
        log: &DiagnosticLog,
        cancel: &CancellationToken,
    ) -> Result<LaunchOutcome, StageError> {
        self.resolve_and_launch(embed_url, true, log, cancel).await
    }

    /// Resolve, then start the player detached
    pub async fn run_detached(
        &self,
        embed_url: &str,
        log: &DiagnosticLog,
        cancel: &CancellationToken,
    ) -> Result<LaunchOutcome, StageError> {
        self.resolve_and_launch(embed_url, false, log, cancel).await
    }
}
