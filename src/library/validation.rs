// Load-time validation of authored reference tracks

use crate::error::LibraryError;

use super::ReferenceTrack;

/// Check the invariants the analysis loop relies on
///
/// - tempo is positive and finite
/// - every lyric window is non-empty, and lines are ordered without overlap
/// - contour times strictly increase and frequencies are positive
pub fn validate_track(track: &ReferenceTrack) -> Result<(), LibraryError> {
    if !(track.tempo.is_finite() && track.tempo > 0.0) {
        return Err(LibraryError::InvalidTempo {
            track: track.id.clone(),
            tempo: track.tempo,
        });
    }

    let mut previous_end: Option<f64> = None;
    for (index, line) in track.lyrics.iter().enumerate() {
        if !(line.start.is_finite() && line.end.is_finite()) || line.start >= line.end {
            return Err(LibraryError::InvalidLyricWindow {
                track: track.id.clone(),
                index,
            });
        }
        if let Some(end) = previous_end {
            if line.start < end {
                return Err(LibraryError::OverlappingLyrics {
                    track: track.id.clone(),
                    index,
                });
            }
        }
        previous_end = Some(line.end);
    }

    let mut previous_time: Option<f64> = None;
    for (index, point) in track.pitch_contour.iter().enumerate() {
        let ordered = previous_time.map(|t| point.time > t).unwrap_or(true);
        if !point.time.is_finite() || !ordered || !(point.freq > 0.0) {
            return Err(LibraryError::UnsortedContour {
                track: track.id.clone(),
                index,
            });
        }
        previous_time = Some(point.time);
    }

    Ok(())
}
