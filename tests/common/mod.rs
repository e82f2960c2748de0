//! Shared test utilities

#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::io::Cursor;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use avatar_voice::audio::{
    AudioBackend, AudioFormat, Interrupt, OutputEndpoint, OutputStream, StreamError,
};
use avatar_voice::chat::ChatModel;
use avatar_voice::conversation::{InputSource, UserInput};
use avatar_voice::voice::{SynthesisError, Synthesizer};
use avatar_voice::{Error, Result};

/// Host with a speaker and a VB-Audio cable
#[must_use]
pub fn speakers_and_cable() -> Vec<OutputEndpoint> {
    vec![
        OutputEndpoint::new(0, "Speakers", 2),
        OutputEndpoint::new(1, "CABLE Input (VB-Audio)", 2),
    ]
}

/// Host with only a speaker
#[must_use]
pub fn speakers_only() -> Vec<OutputEndpoint> {
    vec![OutputEndpoint::new(0, "Speakers", 2)]
}

#[derive(Default)]
struct FakeState {
    endpoints: Vec<OutputEndpoint>,
    default_name: Option<String>,
    fail_open: HashSet<String>,
    fail_write_after: HashMap<String, usize>,
    fail_enumeration: bool,
    interrupt_after: Option<(String, usize, Interrupt)>,
    enumerations: usize,
    opens: Vec<String>,
    closes: Vec<String>,
    drains: Vec<String>,
    formats: Vec<AudioFormat>,
    written: HashMap<String, Vec<u8>>,
}

/// Recording audio backend; clones share state
#[derive(Clone, Default)]
pub struct FakeBackend {
    state: Arc<Mutex<FakeState>>,
}

impl FakeBackend {
    /// Backend whose default output is the first endpoint
    #[must_use]
    pub fn new(endpoints: Vec<OutputEndpoint>) -> Self {
        let backend = Self::default();
        {
            let mut state = backend.state();
            state.default_name = endpoints.first().map(|e| e.name.clone());
            state.endpoints = endpoints;
        }
        backend
    }

    fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    /// Replace the device set (simulates hot-plug)
    pub fn set_endpoints(&self, endpoints: Vec<OutputEndpoint>) {
        self.state().endpoints = endpoints;
    }

    /// Change which endpoint is the default output
    pub fn set_default(&self, name: Option<&str>) {
        self.state().default_name = name.map(ToString::to_string);
    }

    /// Make opening `name` fail
    pub fn fail_open(&self, name: &str) {
        self.state().fail_open.insert(name.to_string());
    }

    /// Make writes to `name` fail once `chunks` writes succeeded
    pub fn fail_write_after(&self, name: &str, chunks: usize) {
        self.state().fail_write_after.insert(name.to_string(), chunks);
    }

    /// Make every device enumeration fail
    pub fn fail_enumeration(&self) {
        self.state().fail_enumeration = true;
    }

    /// Raise `interrupt` once `chunks` writes to `name` succeeded
    pub fn interrupt_after(&self, name: &str, chunks: usize, interrupt: &Interrupt) {
        self.state().interrupt_after = Some((name.to_string(), chunks, interrupt.clone()));
    }

    #[must_use]
    pub fn enumerations(&self) -> usize {
        self.state().enumerations
    }

    #[must_use]
    pub fn opens(&self) -> Vec<String> {
        self.state().opens.clone()
    }

    #[must_use]
    pub fn closes(&self) -> Vec<String> {
        self.state().closes.clone()
    }

    #[must_use]
    pub fn drains(&self) -> Vec<String> {
        self.state().drains.clone()
    }

    #[must_use]
    pub fn formats(&self) -> Vec<AudioFormat> {
        self.state().formats.clone()
    }

    /// Bytes written to `name` across all its streams
    #[must_use]
    pub fn written(&self, name: &str) -> Vec<u8> {
        self.state().written.get(name).cloned().unwrap_or_default()
    }

    /// Every opened stream was closed exactly once
    pub fn assert_balanced(&self) {
        let state = self.state();
        let mut opens = state.opens.clone();
        let mut closes = state.closes.clone();
        opens.sort();
        closes.sort();
        assert_eq!(opens, closes, "every opened stream must be closed once");
    }
}

impl AudioBackend for FakeBackend {
    type Stream = FakeStream;

    fn output_endpoints(&self) -> std::result::Result<Vec<OutputEndpoint>, StreamError> {
        let mut state = self.state();
        state.enumerations += 1;
        if state.fail_enumeration {
            return Err(StreamError::new("audio service unavailable"));
        }
        Ok(state.endpoints.clone())
    }

    fn default_output(&self) -> Option<OutputEndpoint> {
        let state = self.state();
        let name = state.default_name.as_ref()?;
        state.endpoints.iter().find(|e| &e.name == name).cloned()
    }

    fn open_output(
        &self,
        endpoint: &OutputEndpoint,
        format: AudioFormat,
    ) -> std::result::Result<FakeStream, StreamError> {
        let mut state = self.state();
        if state.fail_open.contains(&endpoint.name) {
            return Err(StreamError::new("device busy"));
        }

        state.opens.push(endpoint.name.clone());
        state.formats.push(format);
        let fail_after = state.fail_write_after.get(&endpoint.name).copied();

        Ok(FakeStream {
            name: endpoint.name.clone(),
            state: Arc::clone(&self.state),
            writes: 0,
            fail_after,
        })
    }
}

/// Stream handed out by [`FakeBackend`]; records its close on drop
pub struct FakeStream {
    name: String,
    state: Arc<Mutex<FakeState>>,
    writes: usize,
    fail_after: Option<usize>,
}

impl OutputStream for FakeStream {
    fn write(&mut self, chunk: &[u8]) -> std::result::Result<(), StreamError> {
        if self.fail_after.is_some_and(|n| self.writes >= n) {
            return Err(StreamError::new("device unplugged"));
        }
        self.writes += 1;

        let mut state = self.state.lock().unwrap();
        state
            .written
            .entry(self.name.clone())
            .or_default()
            .extend_from_slice(chunk);

        if let Some((name, after, interrupt)) = &state.interrupt_after
            && *name == self.name
            && *after == self.writes
        {
            interrupt.trigger();
        }
        Ok(())
    }

    fn drain(&mut self) -> std::result::Result<(), StreamError> {
        self.state.lock().unwrap().drains.push(self.name.clone());
        Ok(())
    }
}

impl Drop for FakeStream {
    fn drop(&mut self) {
        if let Ok(mut state) = self.state.lock() {
            state.closes.push(self.name.clone());
        }
    }
}

/// Build a 16-bit PCM WAV with `frames` frames of a ramp signal
#[must_use]
pub fn wav_i16(sample_rate: u32, channels: u16, frames: usize) -> Vec<u8> {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        for i in 0..frames * usize::from(channels) {
            #[allow(clippy::cast_possible_truncation)]
            writer.write_sample((i % 2000) as i16 - 1000).unwrap();
        }
        writer.finalize().unwrap();
    }
    cursor.into_inner()
}

/// The PCM payload at the end of a WAV written by [`wav_i16`]
#[must_use]
pub fn payload(wav: &[u8], frames: usize, channels: u16) -> &[u8] {
    let len = frames * usize::from(channels) * 2;
    &wav[wav.len() - len..]
}

/// Synthesizer returning a fixed result and recording requests; clones share the log
#[derive(Clone, Default)]
pub struct FakeSynthesizer {
    audio: Option<Vec<u8>>,
    requests: Arc<Mutex<Vec<String>>>,
}

impl FakeSynthesizer {
    /// Always returns `audio`
    #[must_use]
    pub fn returning(audio: Vec<u8>) -> Self {
        Self {
            audio: Some(audio),
            requests: Arc::default(),
        }
    }

    /// Always fails as if the engine were down
    #[must_use]
    pub fn unreachable() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Synthesizer for FakeSynthesizer {
    async fn synthesize(&self, text: &str) -> std::result::Result<Vec<u8>, SynthesisError> {
        self.requests.lock().unwrap().push(text.to_string());
        self.audio
            .clone()
            .ok_or_else(|| SynthesisError::Unreachable("connection refused".to_string()))
    }
}

/// Chat model answering from a script; `None` entries fail
pub struct FakeChat {
    replies: VecDeque<Option<String>>,
    pub received: Vec<String>,
}

impl FakeChat {
    #[must_use]
    pub fn new(replies: &[Option<&str>]) -> Self {
        Self {
            replies: replies.iter().map(|r| r.map(ToString::to_string)).collect(),
            received: Vec::new(),
        }
    }
}

#[async_trait]
impl ChatModel for FakeChat {
    async fn send_message(&mut self, text: &str) -> Result<String> {
        self.received.push(text.to_string());
        self.replies
            .pop_front()
            .flatten()
            .ok_or_else(|| Error::Chat("model unavailable".to_string()))
    }
}

/// Input source replaying a fixed list, then quitting
pub struct ScriptedInput {
    inputs: VecDeque<UserInput>,
}

impl ScriptedInput {
    #[must_use]
    pub fn new(inputs: Vec<UserInput>) -> Self {
        Self {
            inputs: inputs.into(),
        }
    }
}

#[async_trait(?Send)]
impl InputSource for ScriptedInput {
    async fn next_input(&mut self) -> Result<UserInput> {
        Ok(self.inputs.pop_front().unwrap_or(UserInput::Quit))
    }

    fn is_voice(&self) -> bool {
        false
    }
}
