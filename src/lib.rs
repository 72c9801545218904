//! Counter overlay videos from keyframe timestamps.
//!
//! Keyframes are captured interactively (see [`capture`]) or loaded from a
//! JSON clip file (see [`clips`]). Each clip is turned into a fixed-rate
//! timeline ([`timeline`]) and rendered frame by frame into an AVI file
//! ([`render`], [`encoder`]).

pub mod capture;
pub mod clips;
pub mod config;
pub mod counter;
pub mod encoder;
pub mod error;
pub mod logging;
pub mod render;
pub mod renderer;
pub mod timeline;

pub use clips::{Clip, ClipSet};
pub use config::{RenderConfig, RenderOverrides, Settings};
pub use counter::CounterFormatter;
pub use error::{RenderError, RenderResult};
pub use render::{BatchRenderer, BatchReport, CancelFlag, ClipRenderer};
