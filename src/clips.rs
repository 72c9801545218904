//! Keyframe clips and their JSON file format (`[[0.0, 0.4, ...], [...]]`).

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use crate::error::{RenderError, RenderResult};

/// One recording session's keyframe timestamps, in seconds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Clip(pub Vec<f64>);

impl Clip {
    pub fn timestamps(&self) -> &[f64] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Check that timestamps are finite, non-negative and non-decreasing.
    pub fn validate(&self, index: usize) -> RenderResult<()> {
        validate_timestamps(index, &self.0)
    }
}

impl From<Vec<f64>> for Clip {
    fn from(timestamps: Vec<f64>) -> Self {
        Self(timestamps)
    }
}

pub fn validate_timestamps(index: usize, timestamps: &[f64]) -> RenderResult<()> {
    for (i, &t) in timestamps.iter().enumerate() {
        if !t.is_finite() {
            return Err(RenderError::invalid_clip(
                index,
                format!("timestamp {} is not a finite number", i),
            ));
        }
        if t < 0.0 {
            return Err(RenderError::invalid_clip(
                index,
                format!("timestamp {} is negative ({})", i, t),
            ));
        }
    }
    if let Some(i) = timestamps.windows(2).position(|w| w[1] < w[0]) {
        return Err(RenderError::invalid_clip(
            index,
            format!(
                "timestamps go backwards at position {} ({} after {})",
                i + 1,
                timestamps[i + 1],
                timestamps[i]
            ),
        ));
    }
    Ok(())
}

/// All clips of a capture session, in recording order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClipSet(pub Vec<Clip>);

impl ClipSet {
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("Failed to open clip file: {}", path.display()))?;
        let clips: ClipSet = serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("Failed to parse clip file: {}", path.display()))?;
        Ok(clips)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let file = File::create(path)
            .with_context(|| format!("Failed to create clip file: {}", path.display()))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, self)
            .with_context(|| format!("Failed to write clip file: {}", path.display()))?;
        writer.flush()?;
        Ok(())
    }

    pub fn clips(&self) -> &[Clip] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Total keyframes over all clips.
    pub fn keyframe_count(&self) -> usize {
        self.0.iter().map(Clip::len).sum()
    }

    pub fn validate(&self) -> RenderResult<()> {
        self.0
            .iter()
            .enumerate()
            .try_for_each(|(index, clip)| clip.validate(index))
    }
}

impl From<Vec<Vec<f64>>> for ClipSet {
    fn from(clips: Vec<Vec<f64>>) -> Self {
        Self(clips.into_iter().map(Clip).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_list_of_lists() {
        let clips: ClipSet = serde_json::from_str("[[0.5, 1, 2.25], [], [3]]").unwrap();
        assert_eq!(clips.len(), 3);
        assert_eq!(clips.clips()[0].timestamps(), &[0.5, 1.0, 2.25]);
        assert!(clips.clips()[1].is_empty());
        assert_eq!(clips.keyframe_count(), 4);
    }

    #[test]
    fn save_then_load_is_identical() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clips.json");
        let clips = ClipSet::from(vec![vec![0.0, 0.123456789, 7.5], vec![], vec![1e-3]]);
        clips.save(&path).unwrap();
        assert_eq!(ClipSet::load(&path).unwrap(), clips);
    }

    #[test]
    fn saved_file_is_indented_one_timestamp_per_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clips.json");
        ClipSet::from(vec![vec![0.0, 0.5], vec![]]).save(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, "[\n  [\n    0.0,\n    0.5\n  ],\n  []\n]");
    }

    #[test]
    fn rejects_backwards_timestamps() {
        let clips = ClipSet::from(vec![vec![0.0, 1.0], vec![0.0, 2.0, 1.5]]);
        let err = clips.validate().unwrap_err();
        assert!(matches!(err, RenderError::InvalidClip { index: 1, .. }));
    }

    #[test]
    fn rejects_negative_and_non_finite() {
        assert!(Clip(vec![-0.5, 1.0]).validate(0).is_err());
        assert!(Clip(vec![0.0, f64::INFINITY]).validate(0).is_err());
        assert!(Clip(vec![f64::NAN]).validate(0).is_err());
    }

    #[test]
    fn repeated_timestamps_are_allowed() {
        assert!(Clip(vec![0.0, 1.0, 1.0, 1.0]).validate(0).is_ok());
        assert!(Clip(vec![]).validate(0).is_ok());
    }

    #[test]
    fn malformed_file_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{\"not\": \"clips\"}").unwrap();
        let err = ClipSet::load(&path).unwrap_err();
        assert!(format!("{err:#}").contains("broken.json"));
    }
}
