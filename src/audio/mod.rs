// Audio module - capture transport, analysis graph, recording and playback

pub mod buffer_pool;
pub mod graph;
pub mod playback;
pub mod recorder;

pub use buffer_pool::{AnalysisChannels, AudioBuffer, BufferPool, BufferPoolChannels, CaptureChannels};
pub use graph::AudioGraph;
pub use playback::{CpalPlayback, PlaybackAction, PlaybackDevice, SilentPlayback};
pub use recorder::{ClipRecorder, RecordedClip};
