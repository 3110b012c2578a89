use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use notebook_voice::audio::{AudioBackendFactory, AudioSource, CpalSinkFactory, HeadlessSinkFactory};
use notebook_voice::{
    create_router, AppState, Config, MicrophoneBackend, NatsChannel, SessionCallbacks,
    SessionChannel, SessionStatus, SinkFactory, VoiceOverlay,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Real-time voice sessions for notebook assistants.
#[derive(Parser)]
#[command(name = "notebook-voice", version, about)]
struct Cli {
    /// Path to the configuration file (extension optional).
    #[arg(short, long, global = true, default_value = "config/notebook-voice")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP control surface for a local UI.
    Serve {
        /// Replay a WAV file instead of the microphone.
        #[arg(long)]
        input_file: Option<PathBuf>,

        /// Keep time without playing reply audio.
        #[arg(long)]
        no_playback: bool,
    },

    /// Talk to the assistant from the terminal.
    Talk {
        /// Knowledge context to bind the session to.
        #[arg(long)]
        context: Option<String>,

        /// Replay a WAV file instead of the microphone.
        #[arg(long)]
        input_file: Option<PathBuf>,

        /// Keep time without playing reply audio.
        #[arg(long)]
        no_playback: bool,
    },

    /// List available audio devices.
    Devices,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::load(Some(cli.config.as_str()))?;

    info!("{} v{}", config.service.name, env!("CARGO_PKG_VERSION"));

    match cli.command {
        Command::Serve {
            input_file,
            no_playback,
        } => serve(config, input_file, no_playback).await,
        Command::Talk {
            context,
            input_file,
            no_playback,
        } => talk(config, context, input_file, no_playback).await,
        Command::Devices => list_devices(),
    }
}

fn capture_source(input_file: Option<PathBuf>) -> AudioSource {
    match input_file {
        Some(path) => AudioSource::File {
            path,
            realtime: true,
        },
        None => AudioSource::Microphone,
    }
}

fn sink_factory(config: &Config, no_playback: bool) -> Arc<dyn SinkFactory> {
    if no_playback {
        Arc::new(HeadlessSinkFactory::wall_clock())
    } else {
        Arc::new(CpalSinkFactory::new(config.audio.output_device.clone()))
    }
}

async fn connect(config: &Config) -> Result<Arc<dyn SessionChannel>> {
    let channel = NatsChannel::connect(&config.voice.nats_url, config.voice.subject_prefix.clone())
        .await
        .with_context(|| format!("Failed to connect to NATS at {}", config.voice.nats_url))?;
    Ok(Arc::new(channel))
}

async fn serve(config: Config, input_file: Option<PathBuf>, no_playback: bool) -> Result<()> {
    let channel = connect(&config).await?;
    let sinks = sink_factory(&config, no_playback);
    let addr = format!("{}:{}", config.service.http.bind, config.service.http.port);

    let state = AppState::new(config, channel, sinks, capture_source(input_file));
    let router = create_router(state.clone());

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("HTTP server listening on {}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Received Ctrl+C, shutting down...");
        })
        .await
        .context("HTTP server failed")?;

    let open = state.overlay.lock().await.take();
    if let Some(handle) = open {
        if let Err(e) = handle.close().await {
            warn!("Failed to close voice overlay: {}", e);
        }
    }

    Ok(())
}

async fn talk(
    config: Config,
    context: Option<String>,
    input_file: Option<PathBuf>,
    no_playback: bool,
) -> Result<()> {
    let channel = connect(&config).await?;
    let sinks = sink_factory(&config, no_playback);
    let backend = AudioBackendFactory::create(capture_source(input_file), config.backend_config())?;

    let callbacks = SessionCallbacks::default()
        .on_user_message(|text| println!("you: {text}"))
        .on_ai_message(|text| println!("assistant: {text}"))
        .on_error(|err| eprintln!("error: {err}"));

    let handle = VoiceOverlay::new(
        config.session_config(context.as_deref()),
        channel,
        sinks,
        backend,
    )
    .with_callbacks(callbacks)
    .open();

    println!("Connecting... type `m` + Enter to toggle mute, `q` + Enter or Ctrl+C to quit.");

    let mut status = handle.status_updates();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,

            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                if *status.borrow_and_update() == SessionStatus::Ready {
                    println!("Ready! Start speaking.");
                }
            }

            line = lines.next_line() => match line? {
                Some(line) => match line.trim() {
                    "m" => {
                        let muted = handle.toggle_mute().await?;
                        println!("{}", if muted { "Muted" } else { "Unmuted" });
                    }
                    "q" => break,
                    _ => {}
                },
                None => break,
            },
        }
    }

    let stats = handle.close().await?;
    println!(
        "Session closed after {:.1}s: {} frames sent, {} turns, {} interruptions",
        stats.duration_secs, stats.frames_sent, stats.turns_completed, stats.interruptions
    );

    Ok(())
}

fn list_devices() -> Result<()> {
    println!("Input devices:");
    for name in MicrophoneBackend::list_input_devices()? {
        println!("  {name}");
    }

    println!("Output devices:");
    for name in CpalSinkFactory::list_output_devices()? {
        println!("  {name}");
    }

    Ok(())
}
