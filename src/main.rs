use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};

use recscribe::audio::{self, emergency_restore, SwitchAudioRouter};
use recscribe::capture::CaptureSession;
use recscribe::config::Config;
use recscribe::error::{CaptureError, StreamError};
use recscribe::store;
use recscribe::transcribe::{process_recording, ProgressUpdate, WorkerEngine};
use recscribe::transcript::NoteCollection;

#[derive(Parser)]
#[command(
    name = "recscribe",
    about = "Record meetings, transcribe each track, merge into one transcript"
)]
struct Cli {
    /// Path to a TOML config file
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List available audio input devices
    Devices,
    /// Record a session; Ctrl-C stops and saves, then transcription runs
    Record {
        /// Also capture system audio via the loopback device
        #[arg(short, long)]
        speaker: bool,
        /// Mic to record from (index or name substring); default input if omitted
        #[arg(short, long)]
        mic: Option<String>,
        /// Override the configured recordings folder
        #[arg(short, long)]
        folder: Option<PathBuf>,
    },
    /// Transcribe an existing recording (WAV file or session directory)
    Transcribe { audio: PathBuf },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let config = Config::load_or_default(cli.config.as_deref())?;

    match cli.command {
        Command::Devices => list_devices(),
        Command::Record {
            speaker,
            mic,
            folder,
        } => record(&config, speaker, mic.as_deref(), folder).await,
        Command::Transcribe { audio } => transcribe_existing(&config, &audio).await,
    }
}

fn list_devices() -> Result<()> {
    let devices = audio::list_input_devices().context("could not query audio devices")?;
    for device in devices {
        let marker = if device.is_default { " (default)" } else { "" };
        println!(
            "[{}] {} ({}ch, {}Hz){}",
            device.index, device.name, device.channels, device.sample_rate, marker
        );
    }
    Ok(())
}

async fn record(
    config: &Config,
    speaker: bool,
    mic: Option<&str>,
    folder: Option<PathBuf>,
) -> Result<()> {
    let router = Arc::new(SwitchAudioRouter);
    let mut session =
        CaptureSession::new(config.audio.clone(), config.routing.clone(), router.clone());

    let report = match session.start(mic, speaker) {
        Ok(report) => report,
        Err(e) => {
            emergency_restore(router.as_ref());
            return Err(e).context("could not start recording");
        }
    };
    if let Some(warning) = &report.warning {
        warn!("{}", warning);
    }

    let mode = if report.speaker_active {
        "mic + speaker"
    } else {
        "mic"
    };
    println!(
        "Recording ({})... Mic: {} | {}Hz {}ch",
        mode, report.mic_device, config.audio.sample_rate, config.audio.channels
    );
    println!("Type a note and press Enter to annotate; Ctrl-C stops and saves.");
    println!("Commands: /mic <device>   /speaker on   /speaker off");

    let mut notes = NoteCollection::new();
    notes.start();

    let mut stdin_lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let mut ticker = tokio::time::interval(Duration::from_secs(1));

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            line = stdin_lines.next_line(), if stdin_open => {
                match line {
                    Ok(Some(text)) => {
                        if handle_input(&mut session, &mut notes, text.trim()) {
                            break;
                        }
                    }
                    // EOF or a broken stdin: keep recording, stop polling.
                    _ => stdin_open = false,
                }
            }
            _ = ticker.tick() => {
                // Stream faults land here: a dead mic forces a stop that
                // keeps everything captured so far.
                if let Err(e) = session.check_streams() {
                    error!("{}; stopping with captured audio", e);
                    break;
                }
                let status = session.status();
                let total = status.elapsed_secs as u64;
                print!(
                    "\r  ● REC {:02}:{:02}:{:02}  ",
                    total / 3600,
                    (total % 3600) / 60,
                    total % 60
                );
                std::io::Write::flush(&mut std::io::stdout()).ok();
            }
        }
    }

    println!();
    let session_audio = session.stop().context("could not stop recording")?;
    let elapsed = session_audio.duration_secs();
    info!("captured {:.1}s of audio", elapsed);

    let base_dir = folder.unwrap_or_else(|| config.recordings_dir());
    let saved = match store::persist(&session_audio, &base_dir) {
        Ok(saved) => saved,
        Err(e) => {
            emergency_restore(router.as_ref());
            return Err(e).context("could not persist recording");
        }
    };
    println!("Saved: {}", saved.primary.display());

    run_pipeline(config, &saved, notes, Some(&session_audio.mic.device_name)).await
}

/// Handle one line of live input: a `/mic` or `/speaker` command, or a note.
/// Returns true when a fatal stream error means recording should stop.
fn handle_input(session: &mut CaptureSession, notes: &mut NoteCollection, text: &str) -> bool {
    if text.is_empty() {
        return false;
    }

    if let Some(device) = text.strip_prefix("/mic ") {
        match session.switch_mic_device(device.trim()) {
            Ok(()) => println!("Mic: {}", device.trim()),
            // The prior device is gone too: nothing left to record from.
            Err(e @ CaptureError::Stream(StreamError::Fault { .. })) => {
                error!("{}; stopping with captured audio", e);
                return true;
            }
            Err(e) => warn!("mic switch failed: {}", e),
        }
        return false;
    }

    match text {
        "/speaker on" => {
            match session.enable_speaker_capture() {
                Ok(()) => println!("Speaker capture on"),
                Err(e) => warn!("could not enable speaker capture: {}", e),
            }
        }
        "/speaker off" => {
            match session.disable_speaker_capture() {
                Ok(()) => println!("Speaker capture off"),
                Err(e) => warn!("could not disable speaker capture: {}", e),
            }
        }
        _ => {
            let note = notes.add(text);
            println!("  [{}] {}", note.index, note.text);
        }
    }
    false
}

async fn transcribe_existing(config: &Config, path: &Path) -> Result<()> {
    let saved = store::locate_saved(path).context("could not locate recording")?;
    run_pipeline(config, &saved, NoteCollection::new(), None).await
}

async fn run_pipeline(
    config: &Config,
    saved: &store::SavedAudio,
    notes: NoteCollection,
    mic_name: Option<&str>,
) -> Result<()> {
    let engine = WorkerEngine::from_config(&config.engine);

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<ProgressUpdate>();
    let display = tokio::spawn(async move {
        while let Some(update) = rx.recv().await {
            match update.eta_sec {
                Some(eta) => info!(
                    "transcribing... {:>3.0}% (eta {:.0}s)",
                    update.value * 100.0,
                    eta
                ),
                None => info!("transcribing... {:>3.0}%", update.value * 100.0),
            }
        }
    });

    let transcript = process_recording(
        &engine,
        saved,
        notes.into_notes(),
        mic_name,
        config,
        Some(tx),
    )
    .await?;
    let _ = display.await;

    println!("Transcript: {}", transcript.display());
    Ok(())
}
