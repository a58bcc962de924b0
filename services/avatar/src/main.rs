use anyhow::{Context, Result};
use clap::Parser;
use sightline_core::backend::BackendClient;
use sightline_core::capture::{StaticImage, UnavailableCamera};
use sightline_core::chat::TextChat;
use sightline_core::intent::{
    DEFAULT_VISUAL_KEYWORDS, FuzzyKeywordClassifier, IntentClassifier, KeywordClassifier,
};
use sightline_core::session::AvatarSession;
use sightline_core::{
    AnalysisRequestCoordinator, OrchestratorConfig, ResponseSpeaker, SessionLifecycleManager,
};
use sightline_service::command::{ConsoleCommand, HELP};
use sightline_service::config::Config;
use sightline_service::console_adapter::{ConsoleOptions, ConsoleSession};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::fmt::time::ChronoLocal;

#[derive(Parser, Debug)]
#[command(version, about = "Talk to the avatar from a terminal, optionally about what it can see")]
struct Cli {
    /// Image analyzed when no camera can be opened
    #[arg(long)]
    fallback_image: Option<PathBuf>,
    /// Base URL of the sightline API service
    #[arg(long)]
    backend_url: Option<String>,
    /// Start in camera mode
    #[arg(long)]
    camera: bool,
    /// Feed the avatar's own speech back in as transcriptions
    #[arg(long)]
    loopback: bool,
    /// Write synthesized replies as WAV files into this directory
    #[arg(long)]
    audio_dir: Option<PathBuf>,
    /// Use fuzzy keyword matching for visual questions with this minimum score
    #[arg(long)]
    fuzzy_threshold: Option<i64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // --- 1. Load Configuration ---
    let config = Config::from_env().context("Failed to load application configuration")?;
    let args = Cli::parse();

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(ChronoLocal::rfc_3339())
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("Configuration loaded successfully. Starting sightline service...");

    // --- 3. Initialize API Clients ---
    let backend_url = args.backend_url.unwrap_or(config.backend_url);
    let backend = Arc::new(BackendClient::new(&backend_url, config.avatar_mode));
    tracing::info!("Using backend at {} ({:?} mode).", backend_url, config.avatar_mode);

    let fallback = args
        .fallback_image
        .or(config.fallback_image)
        .map(|path| StaticImage::from_path(&path))
        .transpose()?;
    if fallback.is_none() {
        tracing::warn!("No fallback image configured; camera mode will have nothing to look at.");
    }

    let classifier: Arc<dyn IntentClassifier> = match args.fuzzy_threshold {
        Some(threshold) => Arc::new(FuzzyKeywordClassifier::new(
            DEFAULT_VISUAL_KEYWORDS.iter().copied(),
            threshold,
        )),
        None => Arc::new(KeywordClassifier::default()),
    };

    // --- 4. Application Setup ---
    let session = Arc::new(ConsoleSession::new(ConsoleOptions {
        loopback: args.loopback,
        audio_dir: args.audio_dir,
    }));
    let speaker = ResponseSpeaker::new(session.clone());
    let orchestrator_config = OrchestratorConfig {
        greeting: config.greeting,
        ..OrchestratorConfig::default()
    };
    let coordinator = Arc::new(AnalysisRequestCoordinator::new(
        backend.clone(),
        classifier,
        speaker.clone(),
        orchestrator_config.clone(),
    ));
    let manager = Arc::new(SessionLifecycleManager::new(
        session.clone(),
        coordinator,
        speaker.clone(),
        Arc::new(UnavailableCamera),
        fallback,
        orchestrator_config,
    ));
    let text_chat = TextChat::new(backend.clone(), backend, speaker);

    manager
        .attach()
        .await
        .context("Failed to connect the avatar session")?;
    if args.camera {
        manager.set_camera_mode(true).await;
    }
    println!("{HELP}");

    // --- 5. Run ---
    let console = tokio::spawn(run_console(session, manager.clone(), text_chat));

    tokio::select! {
        result = console => {
            match result {
                Ok(Err(e)) => tracing::error!("Console loop failed: {:?}", e),
                Err(e) => tracing::error!("Console task panicked: {:?}", e),
                Ok(Ok(())) => {}
            }
        },
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received Ctrl-C, shutting down...");
        }
    }

    tracing::info!("Shutting down...");
    manager.shutdown().await?;
    Ok(())
}

async fn run_console(
    session: Arc<ConsoleSession>,
    manager: Arc<SessionLifecycleManager>,
    text_chat: TextChat,
) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match ConsoleCommand::parse(&line) {
            ConsoleCommand::Camera(enabled) => manager.set_camera_mode(enabled).await,
            ConsoleCommand::Say(text) => {
                if let Err(e) = text_chat.send_message(&text).await {
                    tracing::error!("Text chat failed: {:?}", e);
                }
            }
            ConsoleCommand::Connect => session.start().await?,
            ConsoleCommand::Disconnect => session.disconnect(),
            ConsoleCommand::Help => println!("{HELP}"),
            ConsoleCommand::Quit => break,
            ConsoleCommand::Utterance(text) => session.transcribe(&text),
            ConsoleCommand::Unknown(line) => println!("Unknown command: {line} (try /help)"),
            ConsoleCommand::Empty => {}
        }
    }
    Ok(())
}
