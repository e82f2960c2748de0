//! Microphone capture
//!
//! Records the default input at 16kHz. Multi-channel microphones are mixed
//! down to mono in the callback so the detector and recognizer only ever see
//! one channel.

use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, SampleRate, Stream, StreamConfig, SupportedStreamConfigRange};

use crate::{Error, Result};

/// Sample rate for speech capture (16kHz, what the recognizer expects)
pub const SAMPLE_RATE: u32 = 16000;

type SampleBuffer = Arc<Mutex<Vec<f32>>>;

/// Captures mono audio from the default input device
pub struct AudioCapture {
    device: Device,
    config: StreamConfig,
    sample_format: SampleFormat,
    buffer: SampleBuffer,
    stream: Option<Stream>,
}

impl AudioCapture {
    /// Open the default microphone
    ///
    /// # Errors
    ///
    /// Returns error if there is no input device or it cannot record at 16kHz
    pub fn new() -> Result<Self> {
        let device = cpal::default_host()
            .default_input_device()
            .ok_or_else(|| Error::Audio("no input device available".to_string()))?;

        let range = device
            .supported_input_configs()
            .map_err(|e| Error::Audio(e.to_string()))?
            .filter(|c| covers_speech_rate(c) && is_capturable(c.sample_format()))
            .min_by_key(|c| (c.channels(), c.sample_format() != SampleFormat::F32))
            .ok_or_else(|| Error::Audio("microphone cannot record at 16kHz".to_string()))?;

        let sample_format = range.sample_format();
        let config = range.with_sample_rate(SampleRate(SAMPLE_RATE)).config();

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            channels = config.channels,
            sample_format = ?sample_format,
            "microphone opened"
        );

        Ok(Self {
            device,
            config,
            sample_format,
            buffer: Arc::default(),
            stream: None,
        })
    }

    /// Start recording into the internal buffer
    ///
    /// # Errors
    ///
    /// Returns error if the input stream cannot be started
    pub fn start(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let channels = usize::from(self.config.channels);
        let on_error = |err: cpal::StreamError| {
            tracing::error!(error = %err, "audio capture error");
        };

        let stream = match self.sample_format {
            SampleFormat::I16 => {
                let buffer = Arc::clone(&self.buffer);
                self.device.build_input_stream(
                    &self.config,
                    move |data: &[i16], _: &cpal::InputCallbackInfo| {
                        push_mono(&buffer, data, channels, |s| f32::from(s) / 32768.0);
                    },
                    on_error,
                    None,
                )
            }
            _ => {
                let buffer = Arc::clone(&self.buffer);
                self.device.build_input_stream(
                    &self.config,
                    move |data: &[f32], _: &cpal::InputCallbackInfo| {
                        push_mono(&buffer, data, channels, |s| s);
                    },
                    on_error,
                    None,
                )
            }
        }
        .map_err(|e| Error::Audio(e.to_string()))?;

        stream.play().map_err(|e| Error::Audio(e.to_string()))?;
        self.stream = Some(stream);

        tracing::debug!("audio capture started");
        Ok(())
    }

    /// Stop recording and release the input stream
    pub fn stop(&mut self) {
        if self.stream.take().is_some() {
            tracing::debug!("audio capture stopped");
        }
    }

    /// Take everything captured since the last call
    #[must_use]
    pub fn take_buffer(&self) -> Vec<f32> {
        self.buffer
            .lock()
            .map(|mut buf| std::mem::take(&mut *buf))
            .unwrap_or_default()
    }

    /// Discard captured audio
    pub fn clear_buffer(&self) {
        if let Ok(mut buf) = self.buffer.lock() {
            buf.clear();
        }
    }
}

fn covers_speech_rate(range: &SupportedStreamConfigRange) -> bool {
    range.min_sample_rate() <= SampleRate(SAMPLE_RATE)
        && range.max_sample_rate() >= SampleRate(SAMPLE_RATE)
}

const fn is_capturable(format: SampleFormat) -> bool {
    matches!(format, SampleFormat::F32 | SampleFormat::I16)
}

/// Average interleaved frames down to mono and append them to `buffer`
fn push_mono<T: Copy>(buffer: &SampleBuffer, data: &[T], channels: usize, to_f32: impl Fn(T) -> f32) {
    let Ok(mut buf) = buffer.lock() else {
        return;
    };

    if channels <= 1 {
        buf.extend(data.iter().map(|&s| to_f32(s)));
        return;
    }

    #[allow(clippy::cast_precision_loss)]
    let scale = 1.0 / channels as f32;
    buf.extend(
        data.chunks_exact(channels)
            .map(|frame| frame.iter().map(|&s| to_f32(s)).sum::<f32>() * scale),
    );
}

/// Encode f32 samples as raw little-endian 16-bit PCM (LINEAR16)
#[must_use]
pub fn encode_linear16(samples: &[f32]) -> Vec<u8> {
    samples
        .iter()
        .flat_map(|&sample| {
            #[allow(clippy::cast_possible_truncation)]
            let value = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
            value.to_le_bytes()
        })
        .collect()
}
