//! Audio capture and playback
//!
//! Capture runs on a blocking thread: the `cpal` input stream pushes chunks
//! over a channel to a [`PhraseDetector`], which classifies 30 ms frames with
//! the WebRTC voice detector and decides when speech starts and ends. Devices
//! that cannot capture at a detector rate are resampled with `rubato`.
//! Captured phrases are encoded as 16-bit mono WAV with `hound`. Playback
//! decodes WAV bytes from memory with `rodio`, so no sound files are written
//! to disk.

pub mod vad;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SampleFormat, SizedSample};
use rubato::{FastFixedIn, PolynomialDegree, Resampler};
use sdk::errors::EngineError;
use std::io::Cursor;
use std::sync::mpsc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::config::SpeechConfig;
use vad::VoiceDetector;

/// Longest the capture loop blocks on the channel before checking its deadline
const CHUNK_WAIT: Duration = Duration::from_millis(250);

/// Timing and detection settings for one capture
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureSettings {
    /// Rate the detector and the recording run at
    pub sample_rate_hz: u32,
    pub vad_mode: u8,
    pub listen_timeout: Duration,
    pub phrase_time_limit: Duration,
    pub trailing_silence: Duration,
}

impl CaptureSettings {
    /// Wall-clock bound on a whole capture
    pub fn deadline(&self) -> Duration {
        self.listen_timeout + self.phrase_time_limit
    }
}

impl From<&SpeechConfig> for CaptureSettings {
    fn from(config: &SpeechConfig) -> Self {
        Self {
            sample_rate_hz: config.sample_rate_hz,
            vad_mode: config.vad_mode,
            listen_timeout: Duration::from_secs(config.listen_timeout_secs),
            phrase_time_limit: Duration::from_secs(config.phrase_time_limit_secs),
            trailing_silence: Duration::from_millis(config.trailing_silence_ms),
        }
    }
}

/// Mono 16-bit PCM
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recording {
    pub samples: Vec<i16>,
    pub sample_rate: u32,
}

impl Recording {
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.samples.len() as f64 / self.sample_rate as f64)
    }

    /// Encode as a WAV file in memory
    pub fn to_wav(&self) -> Result<Vec<u8>, EngineError> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec)
                .map_err(|e| EngineError::Audio(format!("Failed to start WAV: {}", e)))?;
            for &sample in &self.samples {
                writer
                    .write_sample(sample)
                    .map_err(|e| EngineError::Audio(format!("Failed to write WAV: {}", e)))?;
            }
            writer
                .finalize()
                .map_err(|e| EngineError::Audio(format!("Failed to finish WAV: {}", e)))?;
        }

        Ok(cursor.into_inner())
    }
}

/// Result of one capture
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureOutcome {
    /// A phrase was recorded
    Phrase(Recording),
    /// Nobody spoke before the listen timeout
    Timeout,
}

/// Where the detector is in a capture
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorState {
    Waiting,
    Recording,
    Finished,
    TimedOut,
}

fn samples_for(duration: Duration, sample_rate: u32) -> usize {
    (duration.as_secs_f64() * sample_rate as f64).round() as usize
}

fn to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
}

/// Start/end-of-phrase detection over a stream of chunks
///
/// Chunks of any length are cut into detector frames. Time is counted in
/// samples, so the detector behaves the same whether it is fed by a live
/// device or by a test.
#[derive(Debug)]
pub struct PhraseDetector {
    vad: VoiceDetector,
    pending: Vec<f32>,
    timeout_samples: usize,
    phrase_limit_samples: usize,
    trailing_samples: usize,
    waited: usize,
    quiet: usize,
    recorded: Vec<f32>,
    state: DetectorState,
}

impl PhraseDetector {
    pub fn new(settings: &CaptureSettings) -> Result<Self, EngineError> {
        let rate = settings.sample_rate_hz;
        Ok(Self {
            vad: VoiceDetector::new(rate, settings.vad_mode)?,
            pending: Vec::new(),
            timeout_samples: samples_for(settings.listen_timeout, rate),
            phrase_limit_samples: samples_for(settings.phrase_time_limit, rate),
            trailing_samples: samples_for(settings.trailing_silence, rate),
            waited: 0,
            quiet: 0,
            recorded: Vec::new(),
            state: DetectorState::Waiting,
        })
    }

    pub fn state(&self) -> DetectorState {
        self.state
    }

    pub fn sample_rate(&self) -> u32 {
        self.vad.sample_rate()
    }

    pub fn is_done(&self) -> bool {
        matches!(self.state, DetectorState::Finished | DetectorState::TimedOut)
    }

    /// Feed one chunk of mono samples in `[-1.0, 1.0]` at the detector rate
    pub fn feed(&mut self, chunk: &[f32]) -> DetectorState {
        self.pending.extend_from_slice(chunk);
        let frame_len = self.vad.frame_len();

        while !self.is_done() && self.pending.len() >= frame_len {
            let frame: Vec<f32> = self.pending.drain(..frame_len).collect();
            let pcm: Vec<i16> = frame.iter().map(|&s| to_i16(s)).collect();
            let speech = match self.vad.is_speech(&pcm) {
                Ok(speech) => speech,
                Err(e) => {
                    warn!("Voice detection failed, treating frame as silence: {}", e);
                    false
                }
            };
            self.advance(&frame, speech);
        }

        self.state
    }

    fn advance(&mut self, frame: &[f32], speech: bool) {
        match self.state {
            DetectorState::Waiting => {
                if speech {
                    debug!("Speech started");
                    self.state = DetectorState::Recording;
                    self.record(frame, speech);
                } else {
                    self.waited += frame.len();
                    if self.waited >= self.timeout_samples {
                        self.state = DetectorState::TimedOut;
                    }
                }
            }
            DetectorState::Recording => self.record(frame, speech),
            DetectorState::Finished | DetectorState::TimedOut => {}
        }
    }

    fn record(&mut self, frame: &[f32], speech: bool) {
        self.recorded.extend_from_slice(frame);

        if speech {
            self.quiet = 0;
        } else {
            self.quiet += frame.len();
        }

        if self.recorded.len() >= self.phrase_limit_samples {
            debug!("Phrase time limit reached");
            self.recorded.truncate(self.phrase_limit_samples);
            self.state = DetectorState::Finished;
        } else if self.trailing_samples > 0 && self.quiet >= self.trailing_samples {
            debug!("Trailing silence, phrase ended");
            self.state = DetectorState::Finished;
        }
    }

    /// Close the capture and hand back what was heard
    ///
    /// A capture that never left `Waiting` counts as a timeout.
    pub fn finish(self) -> CaptureOutcome {
        if self.recorded.is_empty() {
            return CaptureOutcome::Timeout;
        }

        CaptureOutcome::Phrase(Recording {
            samples: self.recorded.iter().map(|&s| to_i16(s)).collect(),
            sample_rate: self.vad.sample_rate(),
        })
    }
}

/// Converts device-rate mono chunks to the detector rate
pub struct ChunkResampler {
    resampler: FastFixedIn<f32>,
    pending: Vec<f32>,
}

impl ChunkResampler {
    pub fn new(from_hz: u32, to_hz: u32) -> Result<Self, EngineError> {
        // 30 ms at the device rate
        let chunk_size = (from_hz as usize * vad::FRAME_MS as usize / 1000).max(1);
        let resampler = FastFixedIn::<f32>::new(
            to_hz as f64 / from_hz as f64,
            1.0,
            PolynomialDegree::Cubic,
            chunk_size,
            1,
        )
        .map_err(|e| EngineError::Audio(format!("Failed to create resampler: {}", e)))?;

        Ok(Self {
            resampler,
            pending: Vec::new(),
        })
    }

    /// Resample whatever full input blocks are buffered, keeping the rest
    pub fn push(&mut self, chunk: &[f32]) -> Result<Vec<f32>, EngineError> {
        self.pending.extend_from_slice(chunk);
        let mut out = Vec::new();

        loop {
            let needed = self.resampler.input_frames_next();
            if self.pending.len() < needed {
                break;
            }
            let mut resampled = self
                .resampler
                .process(&[&self.pending[..needed]], None)
                .map_err(|e| EngineError::Audio(format!("Resampling failed: {}", e)))?;
            self.pending.drain(..needed);
            if let Some(channel) = resampled.pop() {
                out.extend(channel);
            }
        }

        Ok(out)
    }
}

/// Drain chunks into the detector until it decides or the deadline passes
///
/// A stream that stops delivering audio ends the capture at `deadline`
/// with whatever was recorded so far.
pub fn collect_phrase(
    chunks: &mpsc::Receiver<Vec<f32>>,
    mut detector: PhraseDetector,
    mut resampler: Option<ChunkResampler>,
    deadline: Duration,
) -> Result<CaptureOutcome, EngineError> {
    let stop_at = Instant::now() + deadline;

    while !detector.is_done() {
        let now = Instant::now();
        if now >= stop_at {
            warn!("Capture deadline of {:?} passed, closing the phrase", deadline);
            break;
        }

        match chunks.recv_timeout(CHUNK_WAIT.min(stop_at - now)) {
            Ok(chunk) => {
                let chunk = match resampler.as_mut() {
                    Some(resampler) => resampler.push(&chunk)?,
                    None => chunk,
                };
                detector.feed(&chunk);
            }
            Err(mpsc::RecvTimeoutError::Timeout) => continue,
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                return Err(EngineError::Audio("Capture stream closed".to_string()));
            }
        }
    }

    Ok(detector.finish())
}

/// Default microphone
#[derive(Debug, Clone)]
pub struct Microphone {
    settings: CaptureSettings,
}

impl Microphone {
    pub fn new(settings: CaptureSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &CaptureSettings {
        &self.settings
    }

    /// Capture one phrase without blocking the runtime
    pub async fn listen(&self) -> Result<CaptureOutcome, EngineError> {
        let microphone = self.clone();
        tokio::task::spawn_blocking(move || microphone.capture())
            .await
            .map_err(|e| EngineError::Audio(format!("Capture task failed: {}", e)))?
    }

    /// Capture one phrase on the current thread
    pub fn capture(&self) -> Result<CaptureOutcome, EngineError> {
        let detector = PhraseDetector::new(&self.settings)?;

        let device = cpal::default_host()
            .default_input_device()
            .ok_or_else(|| EngineError::AudioDevice("No input device available".to_string()))?;

        let supported = self.pick_config(&device)?;
        let sample_format = supported.sample_format();
        let config: cpal::StreamConfig = supported.into();
        let channels = config.channels as usize;
        let device_rate = config.sample_rate.0;

        info!(
            "Listening on {} ({} Hz, {} channels)",
            device.name().unwrap_or_else(|_| "Unknown".to_string()),
            device_rate,
            channels
        );

        let resampler = if device_rate == self.settings.sample_rate_hz {
            None
        } else {
            debug!(
                "Resampling {} Hz to {} Hz",
                device_rate, self.settings.sample_rate_hz
            );
            Some(ChunkResampler::new(
                device_rate,
                self.settings.sample_rate_hz,
            )?)
        };

        let (chunk_tx, chunk_rx) = mpsc::channel::<Vec<f32>>();

        let stream = match sample_format {
            SampleFormat::F32 => build_input::<f32>(&device, &config, channels, chunk_tx)?,
            SampleFormat::I16 => build_input::<i16>(&device, &config, channels, chunk_tx)?,
            SampleFormat::U16 => build_input::<u16>(&device, &config, channels, chunk_tx)?,
            other => {
                return Err(EngineError::AudioDevice(format!(
                    "Unsupported sample format {:?}",
                    other
                )))
            }
        };

        stream
            .play()
            .map_err(|e| EngineError::AudioDevice(format!("Failed to start capture: {}", e)))?;

        let outcome = collect_phrase(&chunk_rx, detector, resampler, self.settings.deadline());
        drop(stream);
        outcome
    }

    // The detector rate when the device offers it, otherwise the device default
    fn pick_config(&self, device: &cpal::Device) -> Result<cpal::SupportedStreamConfig, EngineError> {
        let wanted = cpal::SampleRate(self.settings.sample_rate_hz);

        if let Ok(ranges) = device.supported_input_configs() {
            for range in ranges {
                if range.min_sample_rate() <= wanted && wanted <= range.max_sample_rate() {
                    return Ok(range.with_sample_rate(wanted));
                }
            }
        }

        device.default_input_config().map_err(|e| {
            EngineError::AudioDevice(format!("No usable input configuration: {}", e))
        })
    }
}

fn build_input<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    channels: usize,
    chunk_tx: mpsc::Sender<Vec<f32>>,
) -> Result<cpal::Stream, EngineError>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                // Downmix to mono
                let chunk: Vec<f32> = data
                    .chunks(channels.max(1))
                    .map(|frame| {
                        frame.iter().map(|&s| s.to_sample::<f32>()).sum::<f32>() / frame.len() as f32
                    })
                    .collect();
                // The receiver is gone once the phrase is complete
                let _ = chunk_tx.send(chunk);
            },
            move |err| {
                warn!("Audio stream error: {}", err);
            },
            None,
        )
        .map_err(|e| EngineError::AudioDevice(format!("Failed to open input stream: {}", e)))
}

/// Default output device
#[derive(Debug, Clone, Copy, Default)]
pub struct Speaker;

impl Speaker {
    /// Play WAV bytes to completion without blocking the runtime
    pub async fn play(&self, wav: Vec<u8>) -> Result<(), EngineError> {
        tokio::task::spawn_blocking(move || play_wav(wav))
            .await
            .map_err(|e| EngineError::Audio(format!("Playback task failed: {}", e)))?
    }
}

/// Play WAV bytes on the current thread, returning when playback ends
pub fn play_wav(wav: Vec<u8>) -> Result<(), EngineError> {
    let (_stream, handle) = rodio::OutputStream::try_default()
        .map_err(|e| EngineError::AudioDevice(format!("No output device: {}", e)))?;
    let sink = rodio::Sink::try_new(&handle)
        .map_err(|e| EngineError::AudioDevice(format!("Failed to open output: {}", e)))?;
    let source = rodio::Decoder::new(Cursor::new(wav))
        .map_err(|e| EngineError::Audio(format!("Failed to decode audio: {}", e)))?;

    sink.append(source);
    sink.sleep_until_end();
    Ok(())
}

/// Name of the default input device, if any
pub fn input_device_name() -> Option<String> {
    cpal::default_host()
        .default_input_device()
        .map(|d| d.name().unwrap_or_else(|_| "Unknown".to_string()))
}

/// Name of the default output device, if any
pub fn output_device_name() -> Option<String> {
    cpal::default_host()
        .default_output_device()
        .map(|d| d.name().unwrap_or_else(|_| "Unknown".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const RATE: u32 = 16_000;
    // One 30 ms detector frame at RATE
    const FRAME: usize = 480;

    fn settings() -> CaptureSettings {
        CaptureSettings {
            sample_rate_hz: RATE,
            vad_mode: 2,
            listen_timeout: Duration::from_millis(600),
            phrase_time_limit: Duration::from_millis(1500),
            trailing_silence: Duration::from_millis(300),
        }
    }

    fn detector() -> PhraseDetector {
        PhraseDetector::new(&settings()).unwrap()
    }

    fn frame() -> Vec<f32> {
        vec![0.0; FRAME]
    }

    #[test]
    fn test_times_out_without_speech() {
        let mut detector = detector();

        // 600 ms of silence is 20 frames
        for _ in 0..19 {
            assert_eq!(detector.feed(&frame()), DetectorState::Waiting);
        }
        assert_eq!(detector.feed(&frame()), DetectorState::TimedOut);
        assert_eq!(detector.finish(), CaptureOutcome::Timeout);
    }

    #[test]
    fn test_partial_frames_are_buffered() {
        let mut detector = detector();

        // 300 ms delivered in uneven chunks is still ten frames of waiting
        for _ in 0..30 {
            detector.feed(&vec![0.0; 160]);
        }
        assert_eq!(detector.waited, 10 * FRAME);
        assert!(detector.pending.is_empty());
    }

    #[test]
    fn test_trailing_silence_ends_phrase() {
        let mut detector = detector();

        detector.advance(&frame(), false);
        detector.advance(&frame(), true);
        assert_eq!(detector.state(), DetectorState::Recording);
        detector.advance(&frame(), true);

        // 300 ms of trailing silence is ten frames
        for _ in 0..9 {
            detector.advance(&frame(), false);
            assert_eq!(detector.state(), DetectorState::Recording);
        }
        detector.advance(&frame(), false);
        assert_eq!(detector.state(), DetectorState::Finished);

        match detector.finish() {
            CaptureOutcome::Phrase(recording) => {
                assert_eq!(recording.samples.len(), 12 * FRAME);
                assert_eq!(recording.sample_rate, RATE);
                assert_eq!(recording.duration(), Duration::from_millis(360));
            }
            other => panic!("expected a phrase, got {:?}", other),
        }
    }

    #[test]
    fn test_speech_resets_trailing_silence() {
        let mut detector = detector();

        detector.advance(&frame(), true);
        for _ in 0..9 {
            detector.advance(&frame(), false);
        }
        detector.advance(&frame(), true);
        for _ in 0..9 {
            detector.advance(&frame(), false);
        }
        assert_eq!(detector.state(), DetectorState::Recording);
    }

    #[test]
    fn test_phrase_time_limit() {
        let mut detector = detector();

        for _ in 0..60 {
            detector.advance(&frame(), true);
        }
        assert_eq!(detector.state(), DetectorState::Finished);

        match detector.finish() {
            CaptureOutcome::Phrase(recording) => assert_eq!(recording.samples.len(), 24_000),
            other => panic!("expected a phrase, got {:?}", other),
        }
    }

    #[test]
    fn test_unsupported_rate_rejected() {
        let mut settings = settings();
        settings.sample_rate_hz = 44_100;
        assert!(PhraseDetector::new(&settings).is_err());
    }

    #[test]
    fn test_stalled_stream_ends_at_deadline() {
        // The sender stays alive but never delivers a chunk
        let (_chunk_tx, chunk_rx) = mpsc::channel::<Vec<f32>>();
        let started = Instant::now();

        let outcome =
            collect_phrase(&chunk_rx, detector(), None, Duration::from_millis(200)).unwrap();

        assert_eq!(outcome, CaptureOutcome::Timeout);
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(200));
        assert!(elapsed < Duration::from_secs(2), "took {:?}", elapsed);
    }

    #[test]
    fn test_deadline_keeps_partial_phrase() {
        let (_chunk_tx, chunk_rx) = mpsc::channel::<Vec<f32>>();
        let mut detector = detector();
        detector.advance(&frame(), true);

        let outcome =
            collect_phrase(&chunk_rx, detector, None, Duration::from_millis(100)).unwrap();

        match outcome {
            CaptureOutcome::Phrase(recording) => assert_eq!(recording.samples.len(), FRAME),
            other => panic!("expected a phrase, got {:?}", other),
        }
    }

    #[test]
    fn test_closed_stream_is_an_error() {
        let (chunk_tx, chunk_rx) = mpsc::channel::<Vec<f32>>();
        drop(chunk_tx);

        let result = collect_phrase(&chunk_rx, detector(), None, Duration::from_secs(5));
        assert!(matches!(result, Err(EngineError::Audio(_))));
    }

    #[test]
    fn test_silent_stream_times_out_before_deadline() {
        let (chunk_tx, chunk_rx) = mpsc::channel::<Vec<f32>>();
        for _ in 0..20 {
            chunk_tx.send(frame()).unwrap();
        }

        let outcome =
            collect_phrase(&chunk_rx, detector(), None, Duration::from_secs(30)).unwrap();
        assert_eq!(outcome, CaptureOutcome::Timeout);
    }

    #[test]
    fn test_resampler_converts_to_detector_rate() {
        let mut resampler = ChunkResampler::new(48_000, RATE).unwrap();

        // One second at 48 kHz in 10 ms chunks
        let mut out = Vec::new();
        for _ in 0..100 {
            out.extend(resampler.push(&[0.0; 480]).unwrap());
        }

        assert!((15_500..=16_100).contains(&out.len()), "got {}", out.len());
    }

    #[test]
    fn test_resampled_stream_feeds_detector() {
        let (chunk_tx, chunk_rx) = mpsc::channel::<Vec<f32>>();
        // 800 ms of silence at 44.1 kHz
        for _ in 0..80 {
            chunk_tx.send(vec![0.0; 441]).unwrap();
        }
        let resampler = ChunkResampler::new(44_100, RATE).unwrap();

        let outcome =
            collect_phrase(&chunk_rx, detector(), Some(resampler), Duration::from_secs(30))
                .unwrap();
        assert_eq!(outcome, CaptureOutcome::Timeout);
    }

    #[test]
    fn test_wav_encoding() {
        let recording = Recording {
            samples: vec![0, 1000, -1000, i16::MAX],
            sample_rate: 16_000,
        };
        let wav = recording.to_wav().unwrap();

        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");

        let reader = hound::WavReader::new(Cursor::new(wav)).unwrap();
        assert_eq!(reader.spec().sample_rate, 16_000);
        assert_eq!(reader.spec().channels, 1);
        let samples: Vec<i16> = reader.into_samples().map(|s| s.unwrap()).collect();
        assert_eq!(samples, recording.samples);
    }

    #[test]
    fn test_settings_from_config() {
        let settings = CaptureSettings::from(&SpeechConfig::default());
        assert_eq!(settings.sample_rate_hz, 16_000);
        assert_eq!(settings.vad_mode, 2);
        assert_eq!(settings.listen_timeout, Duration::from_secs(15));
        assert_eq!(
            settings.deadline(),
            settings.listen_timeout + settings.phrase_time_limit
        );
    }
}
