//! Audio collaborators at the session boundary.
//!
//! The session never touches audio samples. Capture hands it base64 PCM chunks
//! and playback receives the base64 PCM the model produces. This module defines
//! both seams plus file-backed implementations used by the CLI:
//!
//! - [`WavFileCapture`] streams a 16-bit mono WAV file as paced chunks
//! - [`WavFilePlayback`] writes received audio to a 24kHz WAV file
//! - [`PlaybackBridge`] wires session events to a playback sink

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use base64::prelude::*;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::base::{LiveError, LiveEvent, LiveEventHandler, LiveResult};
use super::config::{INPUT_SAMPLE_RATE, OUTPUT_SAMPLE_RATE};

/// Receives each captured chunk as base64 little-endian PCM16.
pub type AudioChunkCallback = Arc<dyn Fn(String) + Send + Sync>;

/// Source of microphone audio.
#[async_trait]
pub trait AudioCapture: Send + Sync {
    /// Begin delivering chunks to `on_data`.
    async fn start(&self, on_data: AudioChunkCallback) -> LiveResult<()>;

    /// Stop delivering chunks. No callback fires after this returns.
    async fn stop(&self) -> LiveResult<()>;
}

/// Sink for model audio.
pub trait AudioPlayback: Send + Sync {
    /// Enqueue one base64 PCM16 chunk.
    fn add_chunk(&self, chunk: &str) -> LiveResult<()>;

    fn is_playing(&self) -> bool;

    /// Drop queued audio immediately (barge-in).
    fn stop(&self);

    /// No more audio will arrive for this turn.
    fn complete(&self);

    fn resume(&self);
}

/// Encode PCM16 samples as base64 little-endian bytes.
pub fn encode_pcm16(samples: &[i16]) -> String {
    let bytes: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
    BASE64_STANDARD.encode(bytes)
}

/// Decode a base64 little-endian PCM16 chunk.
pub fn decode_pcm16(chunk: &str) -> LiveResult<Vec<i16>> {
    let bytes = BASE64_STANDARD
        .decode(chunk)
        .map_err(|e| LiveError::Audio(format!("invalid base64 audio: {e}")))?;
    if bytes.len() % 2 != 0 {
        return Err(LiveError::Audio(format!(
            "odd PCM16 payload length: {}",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect())
}

// =============================================================================
// Playback Bridge
// =============================================================================

/// Drives a playback sink from session events, then forwards every event to
/// the wrapped handler.
///
/// - audio data: enqueue and resume playback
/// - interrupted: stop playback
/// - turn complete: complete playback
pub struct PlaybackBridge {
    playback: Arc<dyn AudioPlayback>,
    inner: Arc<dyn LiveEventHandler>,
}

impl PlaybackBridge {
    pub fn new(playback: Arc<dyn AudioPlayback>, inner: Arc<dyn LiveEventHandler>) -> Self {
        Self { playback, inner }
    }
}

#[async_trait]
impl LiveEventHandler for PlaybackBridge {
    async fn handle(&self, event: LiveEvent) {
        match &event {
            LiveEvent::AudioData(chunk) => {
                if !self.playback.is_playing() {
                    info!("Speaking");
                }
                if let Err(e) = self.playback.add_chunk(chunk) {
                    warn!("Dropping audio chunk: {}", e);
                }
                self.playback.resume();
            }
            LiveEvent::Interrupted => self.playback.stop(),
            LiveEvent::TurnComplete => self.playback.complete(),
            _ => {}
        }
        self.inner.handle(event).await;
    }
}

// =============================================================================
// WAV File Capture
// =============================================================================

/// Streams a 16-bit mono WAV file as if it were a microphone.
pub struct WavFileCapture {
    path: PathBuf,
    chunk_duration: Duration,
    paced: bool,
    task: Mutex<Option<JoinHandle<()>>>,
    finished: Arc<watch::Sender<bool>>,
}

impl WavFileCapture {
    /// Default chunk length.
    pub const DEFAULT_CHUNK: Duration = Duration::from_millis(100);

    pub fn new(path: impl Into<PathBuf>) -> Self {
        let (finished, _) = watch::channel(false);
        Self {
            path: path.into(),
            chunk_duration: Self::DEFAULT_CHUNK,
            paced: true,
            task: Mutex::new(None),
            finished: Arc::new(finished),
        }
    }

    pub fn with_chunk_duration(mut self, chunk_duration: Duration) -> Self {
        self.chunk_duration = chunk_duration;
        self
    }

    /// When paced (the default), chunks are delivered in real time.
    pub fn paced(mut self, paced: bool) -> Self {
        self.paced = paced;
        self
    }

    /// Wait until every chunk of the file was delivered or capture was stopped.
    pub async fn wait_finished(&self) {
        let mut rx = self.finished.subscribe();
        let _ = rx.wait_for(|done| *done).await;
    }

    fn read_chunks(&self) -> LiveResult<Vec<String>> {
        let reader = hound::WavReader::open(&self.path).map_err(|e| {
            LiveError::Audio(format!("Failed to open {}: {e}", self.path.display()))
        })?;
        let spec = reader.spec();

        if spec.sample_format != hound::SampleFormat::Int
            || spec.bits_per_sample != 16
            || spec.channels != 1
        {
            return Err(LiveError::Audio(format!(
                "expected 16-bit mono PCM, got {} channel(s) at {} bits",
                spec.channels, spec.bits_per_sample
            )));
        }
        if spec.sample_rate != INPUT_SAMPLE_RATE {
            warn!(
                "Input is {} Hz; the Live API expects {} Hz",
                spec.sample_rate, INPUT_SAMPLE_RATE
            );
        }

        let samples = reader
            .into_samples::<i16>()
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| LiveError::Audio(e.to_string()))?;

        let per_chunk =
            ((spec.sample_rate as u128 * self.chunk_duration.as_millis()) / 1000).max(1) as usize;
        Ok(samples.chunks(per_chunk).map(encode_pcm16).collect())
    }
}

#[async_trait]
impl AudioCapture for WavFileCapture {
    async fn start(&self, on_data: AudioChunkCallback) -> LiveResult<()> {
        let chunks = self.read_chunks()?;
        info!(
            path = %self.path.display(),
            chunks = chunks.len(),
            "Starting file capture"
        );

        self.finished.send_replace(false);
        let finished = self.finished.clone();
        let paced = self.paced;
        let chunk_duration = self.chunk_duration;

        let task = tokio::spawn(async move {
            let mut ticker = paced.then(|| tokio::time::interval(chunk_duration));
            for chunk in chunks {
                if let Some(ticker) = ticker.as_mut() {
                    ticker.tick().await;
                }
                on_data(chunk);
            }
            debug!("File capture drained");
            finished.send_replace(true);
        });

        if let Some(previous) = self.task.lock().replace(task) {
            previous.abort();
        }
        Ok(())
    }

    async fn stop(&self) -> LiveResult<()> {
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
        self.finished.send_replace(true);
        Ok(())
    }
}

// =============================================================================
// WAV File Playback
// =============================================================================

/// Writes model audio to a 24kHz mono WAV file.
pub struct WavFilePlayback {
    writer: Mutex<Option<hound::WavWriter<BufWriter<File>>>>,
    playing: AtomicBool,
    samples_written: AtomicU64,
    interruptions: AtomicUsize,
    completed_turns: AtomicUsize,
}

impl WavFilePlayback {
    pub fn create(path: &Path) -> LiveResult<Self> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: OUTPUT_SAMPLE_RATE,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let writer = hound::WavWriter::create(path, spec)
            .map_err(|e| LiveError::Audio(format!("Failed to create {}: {e}", path.display())))?;

        Ok(Self {
            writer: Mutex::new(Some(writer)),
            playing: AtomicBool::new(false),
            samples_written: AtomicU64::new(0),
            interruptions: AtomicUsize::new(0),
            completed_turns: AtomicUsize::new(0),
        })
    }

    /// Flush and close the file. Later chunks are rejected.
    pub fn finish(&self) -> LiveResult<()> {
        if let Some(writer) = self.writer.lock().take() {
            writer
                .finalize()
                .map_err(|e| LiveError::Audio(e.to_string()))?;
        }
        Ok(())
    }

    pub fn samples_written(&self) -> u64 {
        self.samples_written.load(Ordering::SeqCst)
    }

    pub fn interruptions(&self) -> usize {
        self.interruptions.load(Ordering::SeqCst)
    }

    pub fn completed_turns(&self) -> usize {
        self.completed_turns.load(Ordering::SeqCst)
    }
}

impl AudioPlayback for WavFilePlayback {
    fn add_chunk(&self, chunk: &str) -> LiveResult<()> {
        let samples = decode_pcm16(chunk)?;
        let mut guard = self.writer.lock();
        let writer = guard
            .as_mut()
            .ok_or_else(|| LiveError::Audio("playback already finished".to_string()))?;
        for sample in &samples {
            writer
                .write_sample(*sample)
                .map_err(|e| LiveError::Audio(e.to_string()))?;
        }
        self.samples_written
            .fetch_add(samples.len() as u64, Ordering::SeqCst);
        Ok(())
    }

    fn is_playing(&self) -> bool {
        self.playing.load(Ordering::SeqCst)
    }

    fn stop(&self) {
        if self.playing.swap(false, Ordering::SeqCst) {
            self.interruptions.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn complete(&self) {
        self.playing.store(false, Ordering::SeqCst);
        self.completed_turns.fetch_add(1, Ordering::SeqCst);
    }

    fn resume(&self) {
        self.playing.store(true, Ordering::SeqCst);
    }
}
