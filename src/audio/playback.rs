// Playback - reference track and comparison output
//
// The controller drives playback through the PlaybackDevice trait so a
// session runs the same way with real speakers or headless.

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use crate::audio::recorder::RecordedClip;
use crate::error::TrainingError;

/// Output side of a training session
pub trait PlaybackDevice: Send {
    /// Prepare the reference recording for a track (`None` when it has none)
    fn load_reference(&mut self, url: Option<&str>) -> Result<(), TrainingError>;

    /// Start the loaded reference from time zero
    fn play_reference_from_start(&mut self) -> Result<(), TrainingError>;

    /// Pause the reference and rewind it to zero
    fn pause_reference(&mut self);

    /// Play the reference, then the user's clip
    fn play_comparison(
        &mut self,
        reference: Option<&str>,
        clip: &RecordedClip,
    ) -> Result<(), TrainingError>;
}

/// Action recorded by [`SilentPlayback`]
#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackAction {
    Load(Option<String>),
    PlayReference,
    PauseReference,
    Compare {
        reference: Option<String>,
        clip_bytes: usize,
    },
}

/// Headless playback that only records what it was asked to do
///
/// Clones share the action log, so a test can keep one handle and give the
/// other to the controller.
#[derive(Debug, Clone, Default)]
pub struct SilentPlayback {
    actions: Arc<Mutex<Vec<PlaybackAction>>>,
    playing: Arc<Mutex<bool>>,
}

impl SilentPlayback {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn actions(&self) -> Vec<PlaybackAction> {
        self.actions
            .lock()
            .map(|actions| actions.clone())
            .unwrap_or_default()
    }

    pub fn is_reference_playing(&self) -> bool {
        self.playing.lock().map(|playing| *playing).unwrap_or(false)
    }

    fn push(&self, action: PlaybackAction) {
        if let Ok(mut actions) = self.actions.lock() {
            actions.push(action);
        }
    }

    fn set_playing(&self, value: bool) {
        if let Ok(mut playing) = self.playing.lock() {
            *playing = value;
        }
    }
}

impl PlaybackDevice for SilentPlayback {
    fn load_reference(&mut self, url: Option<&str>) -> Result<(), TrainingError> {
        self.set_playing(false);
        self.push(PlaybackAction::Load(url.map(str::to_string)));
        Ok(())
    }

    fn play_reference_from_start(&mut self) -> Result<(), TrainingError> {
        self.set_playing(true);
        self.push(PlaybackAction::PlayReference);
        Ok(())
    }

    fn pause_reference(&mut self) {
        self.set_playing(false);
        self.push(PlaybackAction::PauseReference);
    }

    fn play_comparison(
        &mut self,
        reference: Option<&str>,
        clip: &RecordedClip,
    ) -> Result<(), TrainingError> {
        self.push(PlaybackAction::Compare {
            reference: reference.map(str::to_string),
            clip_bytes: clip.bytes.len(),
        });
        Ok(())
    }
}

/// Desktop output through the default cpal device
///
/// Reference tracks are remote compressed audio, which this build does not
/// decode; reference requests are logged and comparison plays the clip.
#[derive(Debug, Default)]
pub struct CpalPlayback {
    reference: Option<String>,
}

impl CpalPlayback {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PlaybackDevice for CpalPlayback {
    fn load_reference(&mut self, url: Option<&str>) -> Result<(), TrainingError> {
        self.reference = url.map(str::to_string);
        Ok(())
    }

    fn play_reference_from_start(&mut self) -> Result<(), TrainingError> {
        if let Some(url) = &self.reference {
            log::info!("[CpalPlayback] Reference playback not decoded locally: {}", url);
        }
        Ok(())
    }

    fn pause_reference(&mut self) {}

    fn play_comparison(
        &mut self,
        reference: Option<&str>,
        clip: &RecordedClip,
    ) -> Result<(), TrainingError> {
        if let Some(url) = reference {
            log::info!("[CpalPlayback] Comparison reference: {}", url);
        }
        let samples = clip.decode_samples()?;
        let sample_rate = clip.sample_rate;
        let duration = Duration::from_secs_f32(clip.duration_secs.max(0.0));

        thread::Builder::new()
            .name("vocal-clip-playback".to_string())
            .spawn(move || {
                if let Err(err) = play_blocking(samples, sample_rate, duration) {
                    log::warn!("[CpalPlayback] {}", err);
                }
            })
            .map_err(|err| TrainingError::PlaybackFailure {
                reason: format!("Failed to spawn playback thread: {}", err),
            })?;
        Ok(())
    }
}

/// Open the default output, play `samples` once, and block until done
fn play_blocking(
    samples: Vec<f32>,
    sample_rate: u32,
    duration: Duration,
) -> Result<(), TrainingError> {
    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| TrainingError::PlaybackFailure {
            reason: "No default output device found".to_string(),
        })?;

    let config = device
        .default_output_config()
        .map_err(|e| TrainingError::PlaybackFailure {
            reason: format!("Failed to get default output config: {:?}", e),
        })?;
    if config.sample_format() != cpal::SampleFormat::F32 {
        return Err(TrainingError::PlaybackFailure {
            reason: "Only F32 output is supported".to_string(),
        });
    }

    let stream_config: cpal::StreamConfig = config.into();
    let channels_count = (stream_config.channels as usize).max(1);
    // Nearest-sample resampling onto the device rate
    let step = sample_rate as f64 / stream_config.sample_rate.0 as f64;
    let mut position = 0.0_f64;

    let stream = device
        .build_output_stream(
            &stream_config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                for frame in data.chunks_mut(channels_count) {
                    let value = samples.get(position as usize).copied().unwrap_or(0.0);
                    position += step;
                    for slot in frame.iter_mut() {
                        *slot = value;
                    }
                }
            },
            |err| log::warn!("[CpalPlayback] Output stream error: {}", err),
            None,
        )
        .map_err(|e| TrainingError::PlaybackFailure {
            reason: format!("{:?}", e),
        })?;

    stream.play().map_err(|e| TrainingError::PlaybackFailure {
        reason: format!("Output start failed: {}", e),
    })?;
    thread::sleep(duration + Duration::from_millis(100));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::recorder::encode_wav;

    #[test]
    fn silent_playback_logs_actions() {
        let handle = SilentPlayback::new();
        let mut device: Box<dyn PlaybackDevice> = Box::new(handle.clone());

        device.load_reference(Some("ref.mp3")).unwrap();
        device.play_reference_from_start().unwrap();
        assert!(handle.is_reference_playing());
        device.pause_reference();
        assert!(!handle.is_reference_playing());

        let clip = encode_wav(&[0.1; 10], 8_000).unwrap();
        device.play_comparison(Some("ref.mp3"), &clip).unwrap();

        assert_eq!(
            handle.actions(),
            vec![
                PlaybackAction::Load(Some("ref.mp3".to_string())),
                PlaybackAction::PlayReference,
                PlaybackAction::PauseReference,
                PlaybackAction::Compare {
                    reference: Some("ref.mp3".to_string()),
                    clip_bytes: clip.bytes.len(),
                },
            ]
        );
    }
}
