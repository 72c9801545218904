use std::time::Instant;

use crate::clips::ClipSet;
use crate::counter::CounterFormatter;

/// Keyframes recorded so far, one list per clip.
///
/// Timestamps are seconds since the current clip was started. A new clip is
/// only opened when the current one already holds keyframes, so the log never
/// ends with two empty clips.
#[derive(Debug, Clone)]
pub struct KeyframeLog {
    clips: Vec<Vec<f64>>,
    clip_start: Instant,
}

impl KeyframeLog {
    pub fn new(now: Instant) -> Self {
        Self {
            clips: vec![Vec::new()],
            clip_start: now,
        }
    }

    /// Append a keyframe to the current clip and return its timestamp.
    pub fn record_keyframe(&mut self, now: Instant) -> f64 {
        let elapsed = now.saturating_duration_since(self.clip_start).as_secs_f64();
        self.current_mut().push(elapsed);
        elapsed
    }

    /// Restart the clock; open a new clip unless the current one is still empty.
    pub fn start_new_clip(&mut self, now: Instant) {
        self.clip_start = now;
        if !self.current().is_empty() {
            self.clips.push(Vec::new());
        }
    }

    pub fn current(&self) -> &[f64] {
        self.clips.last().map(Vec::as_slice).unwrap_or(&[])
    }

    fn current_mut(&mut self) -> &mut Vec<f64> {
        if self.clips.is_empty() {
            self.clips.push(Vec::new());
        }
        let last = self.clips.len() - 1;
        &mut self.clips[last]
    }

    /// Index of the clip keyframes currently go to.
    pub fn clip_index(&self) -> usize {
        self.clips.len().saturating_sub(1)
    }

    /// Up to `n` most recent keyframes of the current clip.
    pub fn recent(&self, n: usize) -> &[f64] {
        let current = self.current();
        &current[current.len().saturating_sub(n)..]
    }

    pub fn keyframe_count(&self) -> usize {
        self.clips.iter().map(Vec::len).sum()
    }

    /// Counter as it will appear once the current clip is rendered.
    pub fn counter_label(&self, formatter: &CounterFormatter) -> String {
        formatter.format(self.current().len())
    }

    pub fn clip_set(&self) -> ClipSet {
        ClipSet::from(self.clips.clone())
    }
}
