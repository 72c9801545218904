/// Turns a keyframe cursor into the string burned into a frame.
///
/// Each keyframe is a tenth of a display unit, so the cursor is divided by ten,
/// shifted by `start_at`, and shown with a single decimal digit.
#[derive(Debug, Clone, PartialEq)]
pub struct CounterFormatter {
    prepend: String,
    start_at: f64,
}

impl CounterFormatter {
    pub fn new(prepend: impl Into<String>, start_at: f64) -> Self {
        Self {
            prepend: prepend.into(),
            start_at,
        }
    }

    pub fn value(&self, index: usize) -> f64 {
        index as f64 / 10.0 + self.start_at
    }

    pub fn format(&self, index: usize) -> String {
        format!("{}{:.1}", self.prepend, self.value(index))
    }
}

impl Default for CounterFormatter {
    fn default() -> Self {
        Self::new("", 0.0)
    }
}
