use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;

use stream_extractor_lib::extractor::player::PlayerLauncher;
use stream_extractor_lib::extractor::tools::ToolManager;
use stream_extractor_lib::logging::init_logging;
use stream_extractor_lib::{
    DiagnosticLog, ExtractError, ExtractionOrchestrator, ExtractorConfig, LaunchOutcome,
    ResolverMode,
};

#[derive(Parser, Debug)]
#[command(name = "stream-extractor")]
#[command(about = "Resolve the HLS playlist behind an embed page and play it in mpv", long_about = None)]
struct Cli {
    /// Embed page URL
    #[arg(short, long, value_name = "URL", required_unless_present = "tools")]
    embed: Option<String>,

    /// Print the diagnostic trail live and enable debug logging
    #[arg(long)]
    debug: bool,

    /// Resolver to use (overrides config and STREAM_EXTRACTOR_MODE)
    #[arg(long, value_name = "browser|static|direct")]
    mode: Option<ResolverMode>,

    /// Player binary (default from config, usually mpv)
    #[arg(long, value_name = "PROGRAM")]
    player: Option<String>,

    /// Proxy for page fetches and the browser, e.g. socks5://127.0.0.1:1080
    #[arg(long, value_name = "URL")]
    proxy: Option<String>,

    /// Chrome/Chromium executable to launch instead of the detected one
    #[arg(long, value_name = "PATH")]
    chrome: Option<PathBuf>,

    /// Overall resolve deadline in seconds
    #[arg(long, value_name = "SECS")]
    deadline: Option<u64>,

    /// Start the player detached and exit
    #[arg(long)]
    detach: bool,

    /// Skip extraction and open the embed URL in the system browser
    #[arg(long, conflicts_with_all = ["raw", "resolve_only"])]
    open_browser: bool,

    /// Skip extraction and hand the embed URL straight to the player
    #[arg(long, conflicts_with = "resolve_only")]
    raw: bool,

    /// Resolve and print the playlist URL and headers as JSON, without playing
    #[arg(long)]
    resolve_only: bool,

    /// Report detected browser/player/URL opener and exit
    #[arg(long)]
    tools: bool,
}

/// Error line plus hint. With --debug the trail has already been printed live.
fn report(err: &ExtractError, message: String) -> String {
    match err.suggestion() {
        Some(hint) => format!("{}\n\n{}", message, hint),
        None => message,
    }
}

async fn run(cli: Cli) -> Result<(), String> {
    if cli.tools {
        let tools = ToolManager::new().get_all_tools().await;
        let json = serde_json::to_string_pretty(&tools).map_err(|e| e.to_string())?;
        println!("{}", json);
        return Ok(());
    }

    let embed = cli.embed.unwrap_or_default();
    let mut config = ExtractorConfig::load().map_err(|e| e.to_string())?;
    if let Some(mode) = cli.mode {
        config = config.with_mode(mode);
    }
    if let Some(player) = cli.player {
        config = config.with_player(player);
    }
    if cli.proxy.is_some() {
        config = config.with_proxy(cli.proxy);
    }
    if cli.chrome.is_some() {
        config = config.with_chrome_executable(cli.chrome);
    }
    if let Some(secs) = cli.deadline {
        config = config.with_deadline(secs);
    }

    let log = if cli.debug {
        DiagnosticLog::with_sink(config.log_capacity, |line| eprintln!("{}", line))
    } else {
        DiagnosticLog::new(config.log_capacity)
    };

    if cli.open_browser || cli.raw {
        let player = PlayerLauncher::from_config(&config);
        let outcome = if cli.open_browser {
            player.open_in_browser(&embed, &log)
        } else {
            player.play_raw(&embed, &log).await.map(|_| ())
        };
        return outcome.map_err(|e| report(&e, e.to_string()));
    }

    let orchestrator = ExtractionOrchestrator::from_config(&config)
        .map_err(|e| report(&e, e.to_string()))?;

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupted, shutting down");
                cancel.cancel();
            }
        });
    }

    if cli.resolve_only {
        let stream = orchestrator
            .resolve(&embed, &log, &cancel)
            .await
            .map_err(|e| report(e.kind(), e.to_string()))?;
        let headers: serde_json::Map<String, serde_json::Value> = stream
            .headers
            .iter()
            .map(|(k, v)| (k.to_string(), serde_json::Value::from(v)))
            .collect();
        let out = serde_json::json!({
            "playlist_url": stream.playlist_url,
            "discovery_method": stream.discovery_method,
            "headers": headers,
        });
        println!("{}", serde_json::to_string_pretty(&out).map_err(|e| e.to_string())?);
        return Ok(());
    }

    let outcome = if cli.detach {
        orchestrator.run_detached(&embed, &log, &cancel).await
    } else {
        orchestrator.run(&embed, &log, &cancel).await
    };

    match outcome {
        Ok(LaunchOutcome::Detached { pid }) => {
            println!("{} started (pid {})", orchestrator.player().program(), pid);
            Ok(())
        }
        Ok(LaunchOutcome::Exited) => Ok(()),
        Err(e) => Err(report(e.kind(), e.to_string())),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.debug);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("error: {}", message);
            ExitCode::FAILURE
        }
    }
}
