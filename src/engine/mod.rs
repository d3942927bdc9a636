//! Engine module housing the session orchestration layer.
//!
//! This module exposes trait-based capture backends (`backend`), the
//! `SessionController` (`core`) and the headless refresh loop (`driver`).

pub mod backend;
pub mod core;
pub mod driver;

pub use backend::{
    CaptureBackend, CaptureEvent, CaptureHandle, CaptureRequest, CpalBackend, ManualTimeSource,
    OpenedCapture, SyntheticBackend, SyntheticFeeder, SystemTimeSource, TimeSource,
};
pub use core::{
    SessionController, SessionEvent, SessionEventKind, SessionPhase, TickOutcome,
    TrainingSnapshot,
};
pub use driver::{drive, DriveSummary};
