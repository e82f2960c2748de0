//! Utterance detection on the microphone stream
//!
//! Energy-based: the threshold is calibrated from a second of ambient
//! noise, an utterance starts when a block exceeds it and ends after a
//! pause. Waiting too long for speech or talking past the phrase limit both
//! end the turn.

use std::time::Duration;

use super::capture::{AudioCapture, SAMPLE_RATE};
use super::stt::SpeechRecognizer;
use crate::Result;

/// Lowest threshold calibration may settle on
const MIN_ENERGY_THRESHOLD: f32 = 0.01;

/// Threshold as a multiple of the ambient RMS
const AMBIENT_RATIO: f32 = 1.5;

/// Threshold used before calibration
const DEFAULT_ENERGY_THRESHOLD: f32 = 0.03;

/// Minimum speech before a pause ends the utterance (0.3s)
const MIN_SPEECH_SAMPLES: usize = SAMPLE_RATE as usize * 3 / 10;

/// Pause that ends an utterance (0.8s)
const PAUSE_SAMPLES: usize = SAMPLE_RATE as usize * 8 / 10;

/// How often the listener drains the capture buffer
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Limits for one listening turn
#[derive(Debug, Clone, Copy)]
pub struct ListenSettings {
    /// Give up if no speech starts within this time
    pub speech_timeout: Duration,
    /// Cut the utterance off after this much audio
    pub phrase_limit: Duration,
    /// Ambient noise sampled before the first turn
    pub calibration: Duration,
}

impl Default for ListenSettings {
    fn default() -> Self {
        Self {
            speech_timeout: Duration::from_secs(10),
            phrase_limit: Duration::from_secs(30),
            calibration: Duration::from_secs(1),
        }
    }
}

/// Detector state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorState {
    /// Waiting for speech to start
    Waiting,
    /// Accumulating an utterance
    Speaking,
}

/// Outcome of feeding one block of samples
#[derive(Debug, PartialEq)]
pub enum DetectorEvent {
    /// Keep feeding
    Pending,
    /// Utterance finished; carries its samples
    Complete(Vec<f32>),
    /// No speech started within the timeout
    TimedOut,
}

/// Segments a 16kHz mono stream into utterances
pub struct UtteranceDetector {
    settings: ListenSettings,
    threshold: f32,
    state: DetectorState,
    speech_buffer: Vec<f32>,
    silence_counter: usize,
    waited: usize,
}

impl UtteranceDetector {
    /// Create an uncalibrated detector
    #[must_use]
    pub const fn new(settings: ListenSettings) -> Self {
        Self {
            settings,
            threshold: DEFAULT_ENERGY_THRESHOLD,
            state: DetectorState::Waiting,
            speech_buffer: Vec::new(),
            silence_counter: 0,
            waited: 0,
        }
    }

    /// Set the speech threshold from a sample of ambient noise
    pub fn calibrate(&mut self, ambient: &[f32]) {
        let noise = calculate_energy(ambient);
        self.threshold = (noise * AMBIENT_RATIO).max(MIN_ENERGY_THRESHOLD);
        tracing::debug!(noise, threshold = self.threshold, "microphone calibrated");
    }

    /// Feed a block of samples
    pub fn process(&mut self, samples: &[f32]) -> DetectorEvent {
        let energy = calculate_energy(samples);
        let is_speech = energy > self.threshold;

        match self.state {
            DetectorState::Waiting => {
                if is_speech {
                    self.state = DetectorState::Speaking;
                    self.speech_buffer.clear();
                    self.speech_buffer.extend_from_slice(samples);
                    self.silence_counter = 0;
                    tracing::trace!(energy, "speech started");
                    return DetectorEvent::Pending;
                }

                self.waited += samples.len();
                if self.waited >= duration_samples(self.settings.speech_timeout) {
                    self.reset();
                    return DetectorEvent::TimedOut;
                }
            }
            DetectorState::Speaking => {
                self.speech_buffer.extend_from_slice(samples);

                if is_speech {
                    self.silence_counter = 0;
                } else {
                    self.silence_counter += samples.len();
                }

                let paused = self.silence_counter > PAUSE_SAMPLES;
                let spoken = self.speech_buffer.len() - self.silence_counter;

                if paused && spoken < MIN_SPEECH_SAMPLES {
                    // A click or cough, not an utterance
                    tracing::trace!(spoken, "discarding short noise burst");
                    self.state = DetectorState::Waiting;
                    self.speech_buffer.clear();
                    self.silence_counter = 0;
                    return DetectorEvent::Pending;
                }

                let limit = self.speech_buffer.len() >= duration_samples(self.settings.phrase_limit);
                if paused || limit {
                    tracing::debug!(samples = self.speech_buffer.len(), limit, "utterance complete");
                    let utterance = std::mem::take(&mut self.speech_buffer);
                    self.reset();
                    return DetectorEvent::Complete(utterance);
                }
            }
        }

        DetectorEvent::Pending
    }

    /// Return to waiting with an empty buffer and a fresh timeout
    pub fn reset(&mut self) {
        self.state = DetectorState::Waiting;
        self.speech_buffer.clear();
        self.silence_counter = 0;
        self.waited = 0;
    }

    /// Current state
    #[must_use]
    pub const fn state(&self) -> DetectorState {
        self.state
    }

    /// Current speech threshold
    #[must_use]
    pub const fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Samples accumulated for the current utterance
    #[must_use]
    pub fn speech_buffer(&self) -> &[f32] {
        &self.speech_buffer
    }
}

/// What one listening turn produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Heard {
    /// Recognized text
    Speech(String),
    /// Nobody spoke before the timeout
    NoSpeech,
    /// Speech was captured but not recognized
    Unintelligible,
}

/// Microphone plus recognizer, producing one utterance per call
pub struct Listener {
    capture: AudioCapture,
    detector: UtteranceDetector,
    recognizer: SpeechRecognizer,
}

impl Listener {
    /// Open the microphone and calibrate against ambient noise
    ///
    /// # Errors
    ///
    /// Returns error if the microphone cannot be opened
    pub async fn new(recognizer: SpeechRecognizer, settings: ListenSettings) -> Result<Self> {
        let mut capture = AudioCapture::new()?;
        capture.start()?;

        let mut detector = UtteranceDetector::new(settings);
        println!("🎤 環境音を調整中...");
        tokio::time::sleep(settings.calibration).await;
        detector.calibrate(&capture.take_buffer());
        println!("🎤 マイク準備完了！");

        Ok(Self {
            capture,
            detector,
            recognizer,
        })
    }

    /// Wait for one utterance and recognize it
    ///
    /// # Errors
    ///
    /// Returns error if the recognition request fails
    pub async fn listen(&mut self) -> Result<Heard> {
        self.capture.clear_buffer();
        self.detector.reset();
        println!("\n（話してください...）");

        loop {
            tokio::time::sleep(POLL_INTERVAL).await;
            let samples = self.capture.take_buffer();
            if samples.is_empty() {
                continue;
            }

            match self.detector.process(&samples) {
                DetectorEvent::Pending => {}
                DetectorEvent::TimedOut => return Ok(Heard::NoSpeech),
                DetectorEvent::Complete(utterance) => {
                    return Ok(match self.recognizer.recognize(&utterance).await? {
                        Some(text) => Heard::Speech(text),
                        None => Heard::Unintelligible,
                    });
                }
            }
        }
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        self.capture.stop();
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn duration_samples(duration: Duration) -> usize {
    (duration.as_secs_f64() * f64::from(SAMPLE_RATE)) as usize
}

/// RMS energy of a block of samples
#[allow(clippy::cast_precision_loss)]
fn calculate_energy(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}
