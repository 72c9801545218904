//! Interactive keyframe capture.
//!
//! Keys are read from the controlling terminal in raw mode. A reader thread
//! and the hold-to-repeat timers all feed one channel; the capture loop is the
//! only owner of the keyframe log.

mod app;
mod dispatch;
mod hold;
mod keys;
mod session;

pub use app::{CaptureApp, CaptureEvent, CaptureState};
pub use dispatch::Dispatcher;
pub use hold::HoldRepeater;
pub use keys::KeyBinding;
pub use session::KeyframeLog;

pub const ACTION_COUNT: &str = "count";
pub const ACTION_NEW_CLIP: &str = "new-clip";
pub const ACTION_SAVE: &str = "save";
pub const ACTION_GENERATE: &str = "generate";
pub const ACTION_EXIT: &str = "exit";
pub const ACTION_QUIT: &str = "quit";
