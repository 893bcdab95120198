// Microphone capture through the default cpal input device
// The stream is owned by a dedicated thread because cpal streams are not Send on every host.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use tracing::{debug, error, info, warn};

use super::error::SessionError;
use super::voice::{LocalAudio, Microphone, NoMicrophone};

/// How long acquire waits for the device to start delivering
const OPEN_TIMEOUT: Duration = Duration::from_secs(2);

const STREAM_ID: &str = "heartlink-mic";

struct Capture {
    stop_tx: mpsc::Sender<()>,
    thread: JoinHandle<()>,
}

/// Microphone backed by the system's default input device
pub struct CpalMicrophone {
    enabled: Arc<AtomicBool>,
    frames: Arc<AtomicU64>,
    capture: Option<Capture>,
}

impl CpalMicrophone {
    pub fn new() -> Self {
        Self {
            enabled: Arc::new(AtomicBool::new(true)),
            frames: Arc::new(AtomicU64::new(0)),
            capture: None,
        }
    }

    pub fn is_capturing(&self) -> bool {
        self.capture.is_some()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Frames delivered by the device while unmuted
    pub fn frames_captured(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }

    fn open(&self) -> Result<Capture, SessionError> {
        let (ready_tx, ready_rx) = mpsc::channel::<Result<(), String>>();
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let enabled = self.enabled.clone();
        let frames = self.frames.clone();

        let thread = thread::Builder::new()
            .name("heartlink-mic".into())
            .spawn(move || match open_input_stream(enabled, frames) {
                Ok(stream) => {
                    let _ = ready_tx.send(Ok(()));
                    // Sender dropped or stop requested: either way capture ends here
                    let _ = stop_rx.recv();
                    drop(stream);
                    debug!("Input stream dropped");
                }
                Err(reason) => {
                    let _ = ready_tx.send(Err(reason));
                }
            })
            .map_err(|e| denied(format!("failed to start capture thread: {}", e)))?;

        match ready_rx.recv_timeout(OPEN_TIMEOUT) {
            Ok(Ok(())) => Ok(Capture { stop_tx, thread }),
            Ok(Err(reason)) => {
                let _ = thread.join();
                Err(denied(reason))
            }
            Err(_) => {
                // Leave the thread to wind down on its own
                let _ = stop_tx.send(());
                Err(denied("microphone did not start in time".into()))
            }
        }
    }
}

impl Default for CpalMicrophone {
    fn default() -> Self {
        Self::new()
    }
}

impl Microphone for CpalMicrophone {
    fn acquire(&mut self) -> Result<LocalAudio, SessionError> {
        if self.capture.is_none() {
            self.capture = Some(self.open()?);
            info!("Microphone capture started");
        }
        Ok(LocalAudio::single_track(STREAM_ID))
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    fn release(&mut self) {
        if let Some(capture) = self.capture.take() {
            let _ = capture.stop_tx.send(());
            if capture.thread.join().is_err() {
                error!("Microphone thread panicked");
            }
            info!(
                "Microphone capture stopped after {} frames",
                self.frames_captured()
            );
        }
    }
}

impl Drop for CpalMicrophone {
    fn drop(&mut self) {
        self.release();
    }
}

/// Pick the microphone for a session: real capture unless voice is off or there is no device
pub fn default_microphone(voice_enabled: bool) -> Box<dyn Microphone> {
    if !voice_enabled {
        info!("Voice disabled in config");
        return Box::new(NoMicrophone);
    }
    match cpal::default_host().default_input_device() {
        Some(device) => {
            debug!(
                "Using input device {}",
                device.name().unwrap_or_else(|_| "unknown".into())
            );
            Box::new(CpalMicrophone::new())
        }
        None => {
            warn!("No audio input device found; voice will be unavailable");
            Box::new(NoMicrophone)
        }
    }
}

fn denied(reason: String) -> SessionError {
    SessionError::MediaPermissionDenied(reason)
}

fn open_input_stream(
    enabled: Arc<AtomicBool>,
    frames: Arc<AtomicU64>,
) -> Result<cpal::Stream, String> {
    let host = cpal::default_host();

    let device = host
        .default_input_device()
        .ok_or_else(|| "no audio input device available".to_string())?;

    let config = device
        .default_input_config()
        .map_err(|e| format!("failed to get default input config: {}", e))?;

    let channels = u64::from(config.channels().max(1));
    let sample_format = config.sample_format();
    let stream_config: cpal::StreamConfig = config.into();

    let stream = match sample_format {
        cpal::SampleFormat::F32 => {
            build_stream::<f32>(&device, &stream_config, channels, enabled, frames)?
        }
        cpal::SampleFormat::I16 => {
            build_stream::<i16>(&device, &stream_config, channels, enabled, frames)?
        }
        cpal::SampleFormat::U16 => {
            build_stream::<u16>(&device, &stream_config, channels, enabled, frames)?
        }
        other => return Err(format!("unsupported sample format: {:?}", other)),
    };

    stream
        .play()
        .map_err(|e| format!("failed to start capture: {}", e))?;

    debug!(
        "Input stream started: {} channel(s) at {} Hz",
        channels, stream_config.sample_rate.0
    );
    Ok(stream)
}

fn build_stream<T: cpal::SizedSample>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    channels: u64,
    enabled: Arc<AtomicBool>,
    frames: Arc<AtomicU64>,
) -> Result<cpal::Stream, String> {
    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                if enabled.load(Ordering::Relaxed) {
                    frames.fetch_add(data.len() as u64 / channels, Ordering::Relaxed);
                }
            },
            |err| error!("Microphone stream error: {}", err),
            None,
        )
        .map_err(|e| format!("failed to open input stream: {}", e))
}
