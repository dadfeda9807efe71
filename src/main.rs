use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tracing::{info, warn};

use waav_live::LiveConfig;
use waav_live::core::live::{
    ClientMessage, FunctionResponse, LiveEvent, ReconnectSupervisor, ToolResponseChannel,
    WavFileCapture, WavFilePlayback,
};

/// waav-live - Gemini Live voice conversation client
#[derive(Parser, Debug)]
#[command(name = "waav-live")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Subcommand to run
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the setup message that would be sent
    Setup,

    /// Speak a WAV file to the model and record its answer
    Converse {
        /// 16-bit mono WAV file to send (16kHz)
        #[arg(short = 'i', long = "input")]
        input: PathBuf,

        /// WAV file receiving the model's audio (24kHz)
        #[arg(short = 'o', long = "output", default_value = "answer.wav")]
        output: PathBuf,

        /// Seconds to wait for the model to finish its turn
        #[arg(long = "turn-timeout-secs", default_value_t = 30)]
        turn_timeout_secs: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if it exists (must be done before config loading)
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt::init();

    // Must happen before any TLS connection is attempted
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow!("Failed to install default crypto provider"))?;

    let cli = Cli::parse();

    let config = if let Some(config_path) = cli.config {
        info!("Loading configuration from {}", config_path.display());
        LiveConfig::from_file(&config_path).map_err(|e| anyhow!(e.to_string()))?
    } else {
        LiveConfig::from_env().map_err(|e| anyhow!(e.to_string()))?
    };

    match cli.command {
        Commands::Setup => {
            let setup = ClientMessage::Setup(config.setup_command());
            println!("{}", serde_json::to_string_pretty(&setup)?);
            Ok(())
        }
        Commands::Converse {
            input,
            output,
            turn_timeout_secs,
        } => converse(config, input, output, Duration::from_secs(turn_timeout_secs)).await,
    }
}

async fn converse(
    config: LiveConfig,
    input: PathBuf,
    output: PathBuf,
    turn_timeout: Duration,
) -> anyhow::Result<()> {
    let playback = Arc::new(WavFilePlayback::create(&output)?);
    let (events_tx, mut events) = mpsc::unbounded_channel();

    let supervisor = ReconnectSupervisor::new(
        Arc::new(config.connector()?),
        config.session_options(),
        Arc::new(events_tx),
    )
    .with_playback(playback.clone());

    info!("Connecting to {}", config.display_endpoint());
    let session = supervisor.connect()?;
    session.ensure_open(config.connect_timeout()).await?;
    session.wait_for_setup_complete().await?;

    let capture = Arc::new(WavFileCapture::new(&input));
    supervisor.start_recording(capture.clone()).await?;
    capture.wait_finished().await;
    supervisor.stop_recording().await?;

    let deadline = tokio::time::sleep(turn_timeout);
    tokio::pin!(deadline);

    loop {
        let event = tokio::select! {
            _ = &mut deadline => {
                warn!("Model did not finish its turn within {}s", turn_timeout.as_secs());
                break;
            }
            event = events.recv() => event,
        };

        let Some(event) = event else { break };
        match event {
            LiveEvent::TurnPair(pair) => {
                println!("{}", serde_json::to_string(&pair)?);
                break;
            }
            LiveEvent::TurnComplete => {
                // A pair, if any, follows the turn completion immediately.
                let next = tokio::time::timeout(Duration::from_millis(250), events.recv()).await;
                if let Ok(Some(LiveEvent::TurnPair(pair))) = next {
                    println!("{}", serde_json::to_string(&pair)?);
                }
                break;
            }
            LiveEvent::ToolCall(call) => {
                let Some(session) = supervisor.current() else { continue };
                let results = call
                    .function_calls
                    .iter()
                    .map(|c| {
                        FunctionResponse::for_call(
                            c,
                            serde_json::json!({"error": "tool execution is not available"}),
                        )
                    })
                    .collect();
                if let Err(e) = ToolResponseChannel::new(session)
                    .send_tool_response(results)
                    .await
                {
                    warn!("Failed to answer tool call: {}", e);
                }
            }
            LiveEvent::Error(e) => warn!(category = e.category(), "{}", e),
            LiveEvent::Close(close) => {
                info!(code = close.code, reason = %close.reason, "Session closed");
                break;
            }
            _ => {}
        }
    }

    supervisor.shutdown().await?;
    playback.finish()?;
    info!(
        samples = playback.samples_written(),
        "Wrote model audio to {}",
        output.display()
    );
    Ok(())
}
