//! Per-frame speech detection backed by the WebRTC voice activity detector

use sdk::errors::EngineError;
use webrtc_vad::{SampleRate, Vad, VadMode};

/// Rates the detector accepts
pub const SUPPORTED_RATES: [u32; 4] = [8_000, 16_000, 32_000, 48_000];

/// Frame length in milliseconds; the detector takes 10, 20 or 30
pub const FRAME_MS: u32 = 30;

/// Speech/silence classifier for fixed-length 16-bit frames
///
/// The underlying detector is not `Send`, so one is built on the capture
/// thread for each phrase.
pub struct VoiceDetector {
    vad: Vad,
    sample_rate: u32,
    frame_len: usize,
}

impl VoiceDetector {
    /// `mode` runs from 0 (least aggressive) to 3 (most aggressive)
    pub fn new(sample_rate: u32, mode: u8) -> Result<Self, EngineError> {
        let rate = match sample_rate {
            8_000 => SampleRate::Rate8kHz,
            16_000 => SampleRate::Rate16kHz,
            32_000 => SampleRate::Rate32kHz,
            48_000 => SampleRate::Rate48kHz,
            other => {
                return Err(EngineError::Audio(format!(
                    "Voice detection needs 8000, 16000, 32000 or 48000 Hz, got {}",
                    other
                )))
            }
        };
        let mode = match mode {
            0 => VadMode::Quality,
            1 => VadMode::LowBitrate,
            2 => VadMode::Aggressive,
            3 => VadMode::VeryAggressive,
            other => {
                return Err(EngineError::Audio(format!(
                    "Voice detection mode must be 0-3, got {}",
                    other
                )))
            }
        };

        let mut vad = Vad::new();
        vad.set_mode(mode);
        vad.set_sample_rate(rate);

        Ok(Self {
            vad,
            sample_rate,
            frame_len: (sample_rate * FRAME_MS / 1000) as usize,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Samples per frame
    pub fn frame_len(&self) -> usize {
        self.frame_len
    }

    /// Classify one frame of exactly [`frame_len`](Self::frame_len) samples
    pub fn is_speech(&mut self, frame: &[i16]) -> Result<bool, EngineError> {
        if frame.len() != self.frame_len {
            return Err(EngineError::Audio(format!(
                "Expected {} samples per frame, got {}",
                self.frame_len,
                frame.len()
            )));
        }

        self.vad
            .is_voice_segment(frame)
            .map_err(|_| EngineError::Audio("Voice detection rejected the frame".to_string()))
    }
}

impl std::fmt::Debug for VoiceDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VoiceDetector")
            .field("sample_rate", &self.sample_rate)
            .field("frame_len", &self.frame_len)
            .finish()
    }
}
