// Managers Module
//
// Focused manager classes owned by the SessionController.
//
// Each manager handles one specific concern:
// - CaptureManager: microphone capture and analysis graph lifecycle
// - BroadcastChannelManager: Tokio broadcast channel management

pub mod broadcast_manager;
pub mod capture_manager;

pub use broadcast_manager::BroadcastChannelManager;
pub use capture_manager::CaptureManager;
