use anyhow::Result;
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub audio: AudioConfig,
    pub routing: RoutingConfig,
    pub engine: EngineConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Where finished recordings and transcripts land.
    pub recordings_path: String,
    pub sample_rate: u32,
    pub channels: u16,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// Input side of the loopback pair (what the speaker stream records from).
    pub loopback_device: String,
    /// Combined output device that feeds both the speakers and the loopback.
    pub output_device: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Transcription engine executable, invoked once per source track.
    pub command: String,
    pub model: String,
    /// Language hint passed to the engine; None lets the engine auto-detect.
    pub language: Option<String>,
    pub timeout_secs: u64,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            recordings_path: "~/recordings".to_string(),
            sample_rate: 16000, // 16kHz, what STT engines expect
            channels: 1,
        }
    }
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            loopback_device: "BlackHole 2ch".to_string(),
            output_device: "Multi-Output Device".to_string(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            command: "stt-worker".to_string(),
            model: "base".to_string(),
            language: None,
            timeout_secs: 1800,
        }
    }
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    /// Load from the given path, or fall back to defaults when no file exists.
    pub fn load_or_default(path: Option<&str>) -> Result<Self> {
        match path {
            Some(p) => Self::load(p),
            None => Ok(Self::default()),
        }
    }

    /// Recordings directory with `~` expanded.
    pub fn recordings_dir(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.audio.recordings_path).into_owned())
    }
}
