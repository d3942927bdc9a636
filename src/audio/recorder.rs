// ClipRecorder - accumulates captured samples and encodes a playable clip
//
// Samples arrive from whichever thread drains the capture queue (the pump
// thread or a tick), so the buffer sits behind a mutex. Encoding happens
// once, when the recorder is stopped.

use std::io::Cursor;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::error::TrainingError;

/// Container produced by the recorder
pub const CLIP_MIME_TYPE: &str = "audio/wav";

/// Finished recording of one session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedClip {
    pub mime_type: String,
    pub sample_rate: u32,
    pub duration_secs: f32,
    #[serde(skip)]
    pub bytes: Vec<u8>,
}

impl RecordedClip {
    /// Write the encoded clip to disk
    pub fn write_to<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        std::fs::write(path, &self.bytes)
    }

    /// Decode the clip back to mono f32 samples
    pub fn decode_samples(&self) -> Result<Vec<f32>, TrainingError> {
        let reader = hound::WavReader::new(Cursor::new(&self.bytes)).map_err(|err| {
            TrainingError::PlaybackFailure {
                reason: format!("Failed to decode clip: {}", err),
            }
        })?;
        let scale = i16::MAX as f32;
        reader
            .into_samples::<i16>()
            .map(|sample| {
                sample
                    .map(|value| value as f32 / scale)
                    .map_err(|err| TrainingError::PlaybackFailure {
                        reason: format!("Failed to decode clip: {}", err),
                    })
            })
            .collect()
    }
}

/// Callback-safe sample accumulator
pub struct ClipRecorder {
    sample_rate: u32,
    samples: Mutex<Vec<f32>>,
    active: AtomicBool,
}

impl ClipRecorder {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            samples: Mutex::new(Vec::new()),
            active: AtomicBool::new(false),
        }
    }

    /// Begin a fresh recording, discarding anything captured before
    pub fn start(&self) -> Result<(), TrainingError> {
        self.lock_samples()?.clear();
        self.active.store(true, Ordering::SeqCst);
        Ok(())
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Append samples while recording; ignored once stopped
    pub fn append(&self, chunk: &[f32]) -> Result<(), TrainingError> {
        if !self.is_active() {
            return Ok(());
        }
        self.lock_samples()?.extend_from_slice(chunk);
        Ok(())
    }

    pub fn captured_samples(&self) -> Result<usize, TrainingError> {
        Ok(self.lock_samples()?.len())
    }

    /// Stop and encode the recording
    ///
    /// Returns `Ok(None)` when the recorder was already stopped or captured
    /// nothing.
    pub fn stop(&self) -> Result<Option<RecordedClip>, TrainingError> {
        if !self.active.swap(false, Ordering::SeqCst) {
            return Ok(None);
        }

        let samples = std::mem::take(&mut *self.lock_samples()?);
        if samples.is_empty() {
            log::warn!("[ClipRecorder] No audio captured; no clip produced");
            return Ok(None);
        }

        let clip = encode_wav(&samples, self.sample_rate)?;
        log::info!(
            "[ClipRecorder] Encoded {:.2}s clip ({} bytes)",
            clip.duration_secs,
            clip.bytes.len()
        );
        Ok(Some(clip))
    }

    fn lock_samples(&self) -> Result<std::sync::MutexGuard<'_, Vec<f32>>, TrainingError> {
        self.samples
            .lock()
            .map_err(|_| TrainingError::LockPoisoned {
                component: "ClipRecorder".to_string(),
            })
    }
}

/// Encode mono f32 samples as 16-bit PCM WAV
pub fn encode_wav(samples: &[f32], sample_rate: u32) -> Result<RecordedClip, TrainingError> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let encode_err = |err: hound::Error| TrainingError::CaptureFailure {
        reason: format!("Failed to encode recording: {}", err),
    };

    let mut bytes = Vec::new();
    {
        let mut writer = hound::WavWriter::new(Cursor::new(&mut bytes), spec).map_err(encode_err)?;
        for &sample in samples {
            let clamped = if sample.is_finite() {
                sample.clamp(-1.0, 1.0)
            } else {
                0.0
            };
            writer
                .write_sample((clamped * i16::MAX as f32) as i16)
                .map_err(encode_err)?;
        }
        writer.finalize().map_err(encode_err)?;
    }

    Ok(RecordedClip {
        mime_type: CLIP_MIME_TYPE.to_string(),
        sample_rate,
        duration_secs: samples.len() as f32 / sample_rate.max(1) as f32,
        bytes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::signals::sine_frame;

    #[test]
    fn test_recorder_produces_wav_clip() {
        let recorder = ClipRecorder::new(8_000);
        recorder.start().unwrap();
        recorder.append(&sine_frame(440.0, 8_000, 4_000, 0.5)).unwrap();
        recorder.append(&sine_frame(440.0, 8_000, 4_000, 0.5)).unwrap();

        let clip = recorder.stop().unwrap().unwrap();
        assert_eq!(clip.mime_type, "audio/wav");
        assert_eq!(clip.sample_rate, 8_000);
        assert!((clip.duration_secs - 1.0).abs() < 1e-6);
        assert_eq!(&clip.bytes[..4], b"RIFF");

        let decoded = clip.decode_samples().unwrap();
        assert_eq!(decoded.len(), 8_000);
    }

    #[test]
    fn test_empty_recording_yields_no_clip() {
        let recorder = ClipRecorder::new(44_100);
        recorder.start().unwrap();
        assert_eq!(recorder.stop().unwrap(), None);
    }

    #[test]
    fn test_stop_is_idempotent_and_append_after_stop_is_ignored() {
        let recorder = ClipRecorder::new(8_000);
        recorder.start().unwrap();
        recorder.append(&[0.1; 100]).unwrap();
        assert!(recorder.stop().unwrap().is_some());
        assert_eq!(recorder.stop().unwrap(), None);

        recorder.append(&[0.1; 100]).unwrap();
        assert_eq!(recorder.captured_samples().unwrap(), 0);
    }

    #[test]
    fn test_restart_discards_previous_samples() {
        let recorder = ClipRecorder::new(8_000);
        recorder.start().unwrap();
        recorder.append(&[0.2; 50]).unwrap();
        recorder.start().unwrap();
        assert_eq!(recorder.captured_samples().unwrap(), 0);
    }

    #[test]
    fn test_write_to_disk() {
        let clip = encode_wav(&[0.0, 0.5, -0.5], 16_000).unwrap();
        let path = std::env::temp_dir().join("vocal_trainer_recorder_test.wav");
        clip.write_to(&path).unwrap();
        let reader = hound::WavReader::open(&path).unwrap();
        assert_eq!(reader.spec().sample_rate, 16_000);
        assert_eq!(reader.len(), 3);
        let _ = std::fs::remove_file(&path);
    }
}
