//! Frame-rate quantization of a clip's keyframe timeline.
//!
//! A clip spanning `d` seconds is sampled at `round(fps * d)` evenly spaced
//! instants over `[0, d]`, endpoints included. Each sample carries the keyframe
//! cursor to display on it.
//!
//! The cursor starts at zero. Before a sample is emitted, the *next* sample's
//! time is compared with the keyframe under the cursor; if that keyframe lies
//! strictly before it, the cursor moves forward by one and the sample already
//! shows the new value. The count therefore rises one sample ahead of the raw
//! crossing. Only one keyframe can be discovered per sample, so bursts of
//! keyframes make the counter lag behind for a few frames. The last sample has
//! no successor and never advances. Once the cursor is on the last keyframe it
//! stays there.

/// One output frame of the real (non-padding) timeline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameSample {
    pub index: usize,
    /// Seconds since the clip's first keyframe.
    pub time: f64,
    pub cursor: usize,
}

/// Number of real frames for a clip lasting `duration` seconds.
///
/// Halfway cases round to even, so 2.5 frames become 2.
pub fn frame_count(fps: u32, duration: f64) -> usize {
    let frames = (fps as f64 * duration).round_ties_even();
    if frames.is_finite() && frames > 0.0 {
        frames as usize
    } else {
        0
    }
}

/// `count` evenly spaced points over `[0, end]`, both endpoints included.
///
/// A single point degenerates to `[0]`.
pub fn sample_times(end: f64, count: usize) -> Vec<f64> {
    match count {
        0 => Vec::new(),
        1 => vec![0.0],
        _ => {
            let last = count - 1;
            (0..count)
                .map(|i| {
                    if i == last {
                        end
                    } else {
                        end * i as f64 / last as f64
                    }
                })
                .collect()
        }
    }
}

/// Span between the earliest and latest keyframe.
pub fn clip_bounds(timestamps: &[f64]) -> Option<(f64, f64)> {
    let mut iter = timestamps.iter().copied();
    let first = iter.next()?;
    Some(iter.fold((first, first), |(lo, hi), t| (lo.min(t), hi.max(t))))
}

/// The quantized timeline of one clip.
#[derive(Debug, Clone, PartialEq)]
pub struct Timeline {
    pub samples: Vec<FrameSample>,
    pub duration: f64,
}

impl Timeline {
    /// Cursor shown on the last real frame, held through the padding frames.
    pub fn final_cursor(&self) -> usize {
        self.samples.last().map(|s| s.cursor).unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Quantize `timestamps` at `fps`. An empty clip yields an empty timeline.
pub fn quantize(timestamps: &[f64], fps: u32) -> Timeline {
    let Some((lo, hi)) = clip_bounds(timestamps) else {
        return Timeline {
            samples: Vec::new(),
            duration: 0.0,
        };
    };
    let duration = hi - lo;
    let times = sample_times(duration, frame_count(fps, duration));

    let mut samples = Vec::with_capacity(times.len());
    let mut cursor = 0;
    for (index, &time) in times.iter().enumerate() {
        let next = times.get(index + 1);
        if let (Some(&next_time), Some(&keyframe)) = (next, timestamps.get(cursor)) {
            if keyframe - lo < next_time && cursor + 1 < timestamps.len() {
                cursor += 1;
            }
        }
        samples.push(FrameSample {
            index,
            time,
            cursor,
        });
    }

    Timeline { samples, duration }
}
