// Reference library error types and constants

use crate::error::ErrorCode;
use log::error;
use std::fmt;

/// Library error code constants
///
/// Error code range: 4001-4010
pub struct LibraryErrorCodes {}

impl LibraryErrorCodes {
    pub const EMPTY_LIBRARY: i32 = 4001;
    pub const EMPTY_GENRE: i32 = 4002;
    pub const UNSORTED_CONTOUR: i32 = 4003;
    pub const INVALID_LYRIC_WINDOW: i32 = 4004;
    pub const OVERLAPPING_LYRICS: i32 = 4005;
    pub const INVALID_TEMPO: i32 = 4006;
    pub const PARSE: i32 = 4007;
    pub const IO: i32 = 4008;
    pub const DUPLICATE_GENRE: i32 = 4009;
    pub const DUPLICATE_TRACK: i32 = 4010;
}

/// Log a library error with structured context
pub fn log_library_error(err: &LibraryError, context: &str) {
    error!(
        "Library error in {}: code={}, component=TrackLibrary, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Defects in authored reference data, detected when the library loads
#[derive(Debug, Clone, PartialEq)]
pub enum LibraryError {
    /// Library contains no genres
    EmptyLibrary,

    /// Genre declares no tracks
    EmptyGenre { genre: String },

    /// Pitch contour times are not strictly increasing, or a frequency is not positive
    UnsortedContour { track: String, index: usize },

    /// Lyric line with `start >= end` or a non-finite bound
    InvalidLyricWindow { track: String, index: usize },

    /// Lyric line starts before the previous one ends
    OverlappingLyrics { track: String, index: usize },

    /// Tempo is zero, negative or not finite
    InvalidTempo { track: String, tempo: f32 },

    /// JSON could not be parsed into the library schema
    Parse { reason: String },

    /// Library file could not be read
    Io { reason: String },

    /// Two genres share an id
    DuplicateGenre { genre: String },

    /// Two tracks of one genre share an id
    DuplicateTrack { genre: String, track: String },
}

impl ErrorCode for LibraryError {
    fn code(&self) -> i32 {
        match self {
            LibraryError::EmptyLibrary => LibraryErrorCodes::EMPTY_LIBRARY,
            LibraryError::EmptyGenre { .. } => LibraryErrorCodes::EMPTY_GENRE,
            LibraryError::UnsortedContour { .. } => LibraryErrorCodes::UNSORTED_CONTOUR,
            LibraryError::InvalidLyricWindow { .. } => LibraryErrorCodes::INVALID_LYRIC_WINDOW,
            LibraryError::OverlappingLyrics { .. } => LibraryErrorCodes::OVERLAPPING_LYRICS,
            LibraryError::InvalidTempo { .. } => LibraryErrorCodes::INVALID_TEMPO,
            LibraryError::Parse { .. } => LibraryErrorCodes::PARSE,
            LibraryError::Io { .. } => LibraryErrorCodes::IO,
            LibraryError::DuplicateGenre { .. } => LibraryErrorCodes::DUPLICATE_GENRE,
            LibraryError::DuplicateTrack { .. } => LibraryErrorCodes::DUPLICATE_TRACK,
        }
    }

    fn message(&self) -> String {
        match self {
            LibraryError::EmptyLibrary => "Track library contains no genres".to_string(),
            LibraryError::EmptyGenre { genre } => format!("Genre '{}' has no tracks", genre),
            LibraryError::UnsortedContour { track, index } => format!(
                "Pitch contour of '{}' is not strictly increasing at point {}",
                track, index
            ),
            LibraryError::InvalidLyricWindow { track, index } => {
                format!("Lyric line {} of '{}' has an empty window", index, track)
            }
            LibraryError::OverlappingLyrics { track, index } => format!(
                "Lyric line {} of '{}' overlaps the previous line",
                index, track
            ),
            LibraryError::InvalidTempo { track, tempo } => {
                format!("Track '{}' has invalid tempo {}", track, tempo)
            }
            LibraryError::Parse { reason } => format!("Failed to parse library: {}", reason),
            LibraryError::Io { reason } => format!("Failed to read library: {}", reason),
            LibraryError::DuplicateGenre { genre } => {
                format!("Genre id '{}' is declared more than once", genre)
            }
            LibraryError::DuplicateTrack { genre, track } => format!(
                "Track id '{}' is declared more than once in genre '{}'",
                track, genre
            ),
        }
    }
}

impl fmt::Display for LibraryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "LibraryError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for LibraryError {}

impl From<serde_json::Error> for LibraryError {
    fn from(err: serde_json::Error) -> Self {
        LibraryError::Parse {
            reason: err.to_string(),
        }
    }
}

impl From<std::io::Error> for LibraryError {
    fn from(err: std::io::Error) -> Self {
        LibraryError::Io {
            reason: err.to_string(),
        }
    }
}
