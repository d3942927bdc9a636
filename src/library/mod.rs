//! Reference track store
//!
//! Immutable reference material (lyrics with timing windows, tempo, pitch
//! contour) keyed by genre then track id. The library is validated once at
//! load; authoring defects are reported as [`LibraryError`] and never reach
//! the analysis loop.

use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{LibraryError, TrainingError};

mod validation;

pub use validation::validate_track;

/// Library bundled with the crate
const BUILTIN_LIBRARY_JSON: &str = include_str!("../../assets/training_library.json");

/// One lyric line, active over `[start, end)` seconds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LyricLine {
    pub text: String,
    pub start: f64,
    pub end: f64,
}

impl LyricLine {
    pub fn contains(&self, seconds: f64) -> bool {
        seconds >= self.start && seconds < self.end
    }
}

/// Control point of the reference pitch contour
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PitchPoint {
    pub time: f64,
    pub freq: f32,
}

/// Reference performance for one track
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceTrack {
    pub id: String,
    pub title: String,
    /// Location of the reference recording, if the track has one
    #[serde(default)]
    pub audio: Option<String>,
    /// Tempo in beats per minute
    pub tempo: f32,
    pub lyrics: Vec<LyricLine>,
    pub pitch_contour: Vec<PitchPoint>,
}

impl ReferenceTrack {
    /// Expected beat spacing in seconds (`60 / tempo`)
    pub fn expected_beat_interval(&self) -> f64 {
        if self.tempo > 0.0 {
            60.0 / self.tempo as f64
        } else {
            0.0
        }
    }

    /// Expected fundamental frequency at `seconds` into the track
    ///
    /// Piecewise-linear between contour points. Times before the first
    /// point hold the first frequency; times after the last hold the last.
    /// Returns `None` only when the track has no contour.
    pub fn expected_pitch_at(&self, seconds: f64) -> Option<f32> {
        let first = self.pitch_contour.first()?;
        if seconds <= first.time {
            return Some(first.freq);
        }

        for pair in self.pitch_contour.windows(2) {
            let (current, next) = (pair[0], pair[1]);
            if seconds >= current.time && seconds <= next.time {
                let ratio = ((seconds - current.time) / (next.time - current.time)) as f32;
                return Some(current.freq + ratio * (next.freq - current.freq));
            }
        }

        self.pitch_contour.last().map(|point| point.freq)
    }

    /// Index of the lyric line whose window contains `seconds`
    pub fn lyric_index_at(&self, seconds: f64) -> Option<usize> {
        self.lyrics.iter().position(|line| line.contains(seconds))
    }

    /// Length of the authored material in seconds
    pub fn duration(&self) -> f64 {
        let lyric_end = self.lyrics.last().map(|line| line.end).unwrap_or(0.0);
        let contour_end = self.pitch_contour.last().map(|p| p.time).unwrap_or(0.0);
        lyric_end.max(contour_end)
    }
}

/// A genre with its display text and ordered tracks
#[derive(Debug, Clone)]
pub struct Genre {
    pub id: String,
    pub name: String,
    pub reference_hint: String,
    tracks: Vec<Arc<ReferenceTrack>>,
}

impl Genre {
    pub fn tracks(&self) -> &[Arc<ReferenceTrack>] {
        &self.tracks
    }

    pub fn track(&self, track_id: &str) -> Option<&Arc<ReferenceTrack>> {
        self.tracks.iter().find(|track| track.id == track_id)
    }

    pub fn first_track(&self) -> Option<&Arc<ReferenceTrack>> {
        self.tracks.first()
    }

    pub fn info(&self) -> GenreInfo {
        GenreInfo {
            id: self.id.clone(),
            name: self.name.clone(),
            reference_hint: self.reference_hint.clone(),
            tracks: self
                .tracks
                .iter()
                .map(|track| TrackSummary {
                    id: track.id.clone(),
                    title: track.title.clone(),
                    tempo: track.tempo,
                    has_audio: track.audio.is_some(),
                })
                .collect(),
        }
    }
}

/// Serializable description of a genre for listings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenreInfo {
    pub id: String,
    pub name: String,
    pub reference_hint: String,
    pub tracks: Vec<TrackSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackSummary {
    pub id: String,
    pub title: String,
    pub tempo: f32,
    pub has_audio: bool,
}

/// On-disk schema of a genre
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenreDocument {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub reference_hint: String,
    pub tracks: Vec<ReferenceTrack>,
}

#[derive(Debug, Deserialize)]
struct LibraryDocument {
    genres: Vec<GenreDocument>,
}

/// Read-only store of reference tracks
#[derive(Debug, Clone)]
pub struct TrackLibrary {
    genres: Vec<Genre>,
}

impl TrackLibrary {
    /// Build a library from genre documents, validating every track
    pub fn new(documents: Vec<GenreDocument>) -> Result<Self, LibraryError> {
        if documents.is_empty() {
            return Err(LibraryError::EmptyLibrary);
        }

        let mut genres: Vec<Genre> = Vec::with_capacity(documents.len());
        for document in documents {
            if genres.iter().any(|genre| genre.id == document.id) {
                return Err(LibraryError::DuplicateGenre {
                    genre: document.id,
                });
            }
            if document.tracks.is_empty() {
                return Err(LibraryError::EmptyGenre {
                    genre: document.id,
                });
            }
            let mut track_ids = HashSet::with_capacity(document.tracks.len());
            for track in &document.tracks {
                if !track_ids.insert(track.id.as_str()) {
                    return Err(LibraryError::DuplicateTrack {
                        genre: document.id.clone(),
                        track: track.id.clone(),
                    });
                }
                validate_track(track)?;
            }
            genres.push(Genre {
                id: document.id,
                name: document.name,
                reference_hint: document.reference_hint,
                tracks: document.tracks.into_iter().map(Arc::new).collect(),
            });
        }

        log::info!(
            "[TrackLibrary] Loaded {} genres, {} tracks",
            genres.len(),
            genres.iter().map(|g| g.tracks.len()).sum::<usize>()
        );
        Ok(Self { genres })
    }

    /// Parse and validate a library from JSON text
    pub fn from_json_str(json: &str) -> Result<Self, LibraryError> {
        let document: LibraryDocument = serde_json::from_str(json)?;
        Self::new(document.genres)
    }

    /// Load and validate a library from a JSON file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, LibraryError> {
        let contents = fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    /// The library bundled with the crate
    pub fn builtin() -> Result<Self, LibraryError> {
        Self::from_json_str(BUILTIN_LIBRARY_JSON)
    }

    /// Look up a track by genre and id
    pub fn get_track(
        &self,
        genre: &str,
        track_id: &str,
    ) -> Result<Arc<ReferenceTrack>, TrainingError> {
        let found = self.genre(genre).ok_or_else(|| TrainingError::UnknownTrack {
            genre: genre.to_string(),
            track: None,
        })?;
        found
            .track(track_id)
            .cloned()
            .ok_or_else(|| TrainingError::UnknownTrack {
                genre: genre.to_string(),
                track: Some(track_id.to_string()),
            })
    }

    /// Ordered tracks of a genre; the slice can be iterated any number of times
    pub fn list_tracks(&self, genre: &str) -> Result<&[Arc<ReferenceTrack>], TrainingError> {
        self.genre(genre)
            .map(Genre::tracks)
            .ok_or_else(|| TrainingError::UnknownTrack {
                genre: genre.to_string(),
                track: None,
            })
    }

    pub fn genre(&self, genre: &str) -> Option<&Genre> {
        self.genres.iter().find(|g| g.id == genre)
    }

    pub fn genres(&self) -> impl Iterator<Item = &Genre> {
        self.genres.iter()
    }

    /// Preferred genre if present, otherwise the first authored genre
    pub fn genre_or_first(&self, preferred: &str) -> Option<&Genre> {
        self.genre(preferred).or_else(|| self.genres.first())
    }
}
