//! cpal implementation of the audio backend

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{
    BufferSize, Device, Host, SampleFormat, SampleRate, Stream, StreamConfig,
    SupportedStreamConfigRange,
};
use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};

use super::{AudioBackend, AudioFormat, OutputEndpoint, OutputStream, StreamError};
use crate::audio::CHUNK_FRAMES;

/// Chunks of audio a stream may hold ahead of the device
const QUEUE_CHUNKS: usize = 4;

/// How long a blocked write or drain waits without device progress
const STALL_TIMEOUT: Duration = Duration::from_secs(2);

/// Sleep between checks while blocked on a full or draining queue
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Grace period after draining so the device plays out its own buffer
const TAIL_DELAY: Duration = Duration::from_millis(100);

/// Audio backend over the platform's default cpal host
pub struct CpalBackend {
    host: Host,
}

impl CpalBackend {
    /// Initialize the default host
    #[must_use]
    pub fn new() -> Self {
        let host = cpal::default_host();
        tracing::debug!(host = host.id().name(), "audio host initialized");
        Self { host }
    }

    fn device_for(&self, endpoint: &OutputEndpoint) -> Result<Device, StreamError> {
        let devices: Vec<Device> = self
            .host
            .output_devices()
            .map_err(StreamError::new)?
            .collect();

        if let Some(device) = devices.get(endpoint.index)
            && device.name().is_ok_and(|name| name == endpoint.name)
        {
            return Ok(device.clone());
        }

        // Enumeration order changed since the endpoint was listed
        devices
            .into_iter()
            .find(|d| d.name().is_ok_and(|name| name == endpoint.name))
            .ok_or_else(|| StreamError(format!("output device {:?} not found", endpoint.name)))
    }
}

impl Default for CpalBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioBackend for CpalBackend {
    type Stream = CpalOutputStream;

    fn output_endpoints(&self) -> Result<Vec<OutputEndpoint>, StreamError> {
        let devices = self.host.output_devices().map_err(StreamError::new)?;

        Ok(devices
            .enumerate()
            .map(|(index, device)| {
                let name = device
                    .name()
                    .unwrap_or_else(|_| "Unnamed output device".to_string());
                let output_channels = max_output_channels(&device);
                tracing::trace!(index, device = %name, output_channels, "detected output device");
                OutputEndpoint::new(index, name, output_channels)
            })
            .collect())
    }

    fn default_output(&self) -> Option<OutputEndpoint> {
        let device = self.host.default_output_device()?;
        let name = device.name().ok()?;

        let index = self
            .host
            .output_devices()
            .ok()
            .and_then(|mut devices| devices.position(|d| d.name().is_ok_and(|n| n == name)))
            .unwrap_or_default();

        Some(OutputEndpoint::new(index, name, max_output_channels(&device)))
    }

    fn open_output(
        &self,
        endpoint: &OutputEndpoint,
        format: AudioFormat,
    ) -> Result<CpalOutputStream, StreamError> {
        let device = self.device_for(endpoint)?;
        CpalOutputStream::open(&device, &endpoint.name, format)
    }
}

fn max_output_channels(device: &Device) -> u16 {
    device
        .supported_output_configs()
        .map(|configs| configs.map(|c| c.channels()).max().unwrap_or(0))
        .unwrap_or(0)
}

/// Sample type a device can take the container bytes in unchanged
const fn native_sample_format(format: AudioFormat) -> Option<SampleFormat> {
    match (format.sample_width, format.float) {
        (1, false) => Some(SampleFormat::U8),
        (2, false) => Some(SampleFormat::I16),
        (4, false) => Some(SampleFormat::I32),
        (4, true) => Some(SampleFormat::F32),
        _ => None,
    }
}

fn supports(device: &Device, config: &StreamConfig, sample_format: SampleFormat) -> bool {
    device.supported_output_configs().is_ok_and(|mut configs| {
        configs.any(|c| {
            c.channels() == config.channels
                && c.sample_format() == sample_format
                && c.min_sample_rate() <= config.sample_rate
                && c.max_sample_rate() >= config.sample_rate
        })
    })
}

/// First error reported by a stream's callback thread
type Failure = Arc<Mutex<Option<String>>>;

fn record_failure(failure: &Failure, reason: String) {
    if let Ok(mut slot) = failure.lock() {
        slot.get_or_insert(reason);
    }
}

/// Running cpal output stream fed through a bounded ring buffer
///
/// The handle owns the producer half; the audio callback owns the consumer.
pub struct CpalOutputStream {
    stream: Stream,
    producer: HeapProd<u8>,
    failure: Failure,
    device: String,
    frame_size: usize,
}

impl CpalOutputStream {
    fn open(device: &Device, name: &str, format: AudioFormat) -> Result<Self, StreamError> {
        let config = StreamConfig {
            channels: format.channels,
            sample_rate: SampleRate(format.sample_rate),
            buffer_size: BufferSize::Default,
        };

        let frame_size = format.frame_size();
        let capacity = CHUNK_FRAMES * QUEUE_CHUNKS * frame_size;
        let (producer, consumer) = HeapRb::<u8>::new(capacity).split();
        let failure = Failure::default();

        let native = native_sample_format(format).filter(|f| supports(device, &config, *f));

        let stream = match native {
            Some(sample_format) => build_native(device, &config, sample_format, consumer, &failure)?,
            None => {
                tracing::debug!(
                    device = name,
                    sample_width = format.sample_width,
                    "device lacks native sample type, converting to f32"
                );
                build_f32(device, &config, format, consumer, &failure).map_err(|e| {
                    StreamError(format!("{e}; device supports {}", supported_configs(device)))
                })?
            }
        };

        stream.play().map_err(StreamError::new)?;

        tracing::debug!(
            device = name,
            sample_rate = format.sample_rate,
            channels = format.channels,
            native = native.is_some(),
            "output stream opened"
        );

        Ok(Self {
            stream,
            producer,
            failure,
            device: name.to_string(),
            frame_size,
        })
    }

    fn check(&self) -> Result<(), StreamError> {
        match self.failure.lock() {
            Ok(failure) => failure.as_ref().map_or(Ok(()), |f| Err(StreamError(f.clone()))),
            Err(_) => Err(StreamError::new("stream state poisoned")),
        }
    }

    /// Sleep until `ready` holds, failing if the device stops consuming
    fn wait_until(&self, ready: impl Fn(&HeapProd<u8>) -> bool) -> Result<(), StreamError> {
        let mut last_len = self.producer.occupied_len();
        let mut last_progress = Instant::now();

        while !ready(&self.producer) {
            self.check()?;
            std::thread::sleep(POLL_INTERVAL);

            let len = self.producer.occupied_len();
            if len != last_len {
                last_len = len;
                last_progress = Instant::now();
            } else if last_progress.elapsed() > STALL_TIMEOUT {
                return Err(StreamError(format!("device {:?} stopped consuming audio", self.device)));
            }
        }

        Ok(())
    }
}

impl OutputStream for CpalOutputStream {
    fn write(&mut self, chunk: &[u8]) -> Result<(), StreamError> {
        let frame_size = self.frame_size;
        let mut rest = chunk;

        while !rest.is_empty() {
            self.check()?;
            self.wait_until(|p| p.vacant_len() >= frame_size)?;

            // Whole frames only, so the callback never splits a sample
            let room = self.producer.vacant_len() / frame_size * frame_size;
            let pushed = self.producer.push_slice(&rest[..room.min(rest.len())]);
            rest = &rest[pushed..];
        }

        Ok(())
    }

    fn drain(&mut self) -> Result<(), StreamError> {
        self.wait_until(Observer::is_empty)?;
        std::thread::sleep(TAIL_DELAY);
        self.check()
    }
}

impl Drop for CpalOutputStream {
    fn drop(&mut self) {
        if let Err(e) = self.stream.pause() {
            tracing::debug!(device = %self.device, error = %e, "failed to pause output stream");
        }
        tracing::debug!(device = %self.device, "output stream closed");
    }
}

fn error_callback(failure: &Failure) -> impl FnMut(cpal::StreamError) + Send + 'static {
    let failure = Arc::clone(failure);
    move |err| {
        tracing::error!(error = %err, "audio playback error");
        record_failure(&failure, err.to_string());
    }
}

fn build_native(
    device: &Device,
    config: &StreamConfig,
    sample_format: SampleFormat,
    mut consumer: HeapCons<u8>,
    failure: &Failure,
) -> Result<Stream, StreamError> {
    let silence = if sample_format == SampleFormat::U8 { 0x80 } else { 0 };

    device
        .build_output_stream_raw(
            config,
            sample_format,
            move |data: &mut cpal::Data, _: &cpal::OutputCallbackInfo| {
                let out = data.bytes_mut();
                let filled = consumer.pop_slice(out);
                out[filled..].fill(silence);
            },
            error_callback(failure),
            None,
        )
        .map_err(StreamError::new)
}

fn build_f32(
    device: &Device,
    config: &StreamConfig,
    format: AudioFormat,
    mut consumer: HeapCons<u8>,
    failure: &Failure,
) -> Result<Stream, StreamError> {
    let width = usize::from(format.sample_width);
    let float = format.float;

    device
        .build_output_stream(
            config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                let mut sample = [0u8; 4];
                for out in data.iter_mut() {
                    *out = if consumer.occupied_len() >= width {
                        consumer.pop_slice(&mut sample[..width]);
                        sample_to_f32(&sample[..width], float)
                    } else {
                        0.0
                    };
                }
            },
            error_callback(failure),
            None,
        )
        .map_err(StreamError::new)
}

/// Summary of a device's output configs for open failure reports
fn supported_configs(device: &Device) -> String {
    match device.supported_output_configs() {
        Ok(configs) => {
            let described: Vec<String> = configs.map(|c| describe_config(&c)).collect();
            if described.is_empty() {
                "no output configs".to_string()
            } else {
                described.join(", ")
            }
        }
        Err(e) => format!("unknown configs ({e})"),
    }
}

fn describe_config(range: &SupportedStreamConfigRange) -> String {
    let (min, max) = (range.min_sample_rate().0, range.max_sample_rate().0);
    let rate = if min == max {
        format!("{min}Hz")
    } else {
        format!("{min}-{max}Hz")
    };
    format!("{}ch {:?} {rate}", range.channels(), range.sample_format())
}

/// Convert one little-endian sample to f32 in [-1.0, 1.0]
#[allow(clippy::cast_precision_loss)]
fn sample_to_f32(bytes: &[u8], float: bool) -> f32 {
    match (bytes, float) {
        ([a, b, c, d], true) => f32::from_le_bytes([*a, *b, *c, *d]),
        ([a], false) => (f32::from(*a) - 128.0) / 128.0,
        ([a, b], false) => f32::from(i16::from_le_bytes([*a, *b])) / 32768.0,
        ([a, b, c], false) => (i32::from_le_bytes([0, *a, *b, *c]) >> 8) as f32 / 8_388_608.0,
        ([a, b, c, d], false) => i32::from_le_bytes([*a, *b, *c, *d]) as f32 / 2_147_483_648.0,
        _ => 0.0,
    }
}
