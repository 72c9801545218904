//! Settings file (`config.yml`) and the validated per-render configuration.
//!
//! The settings file has three sections: `output` (render defaults),
//! `counter` (hold-to-repeat timing) and `keybinds` (capture keys). Every key
//! is optional; missing keys fall back to the defaults below.

mod template;

pub use template::NameTemplate;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::counter::CounterFormatter;
use crate::encoder::Codec;
use crate::error::{RenderError, RenderResult};

pub const CONFIG_FILE_NAME: &str = "config.yml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub output: OutputSettings,
    pub counter: CounterSettings,
    pub keybinds: Keybinds,
}

/// Render defaults, as written in the settings file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputSettings {
    pub font: PathBuf,
    pub name_template: String,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub fontsize: u32,
    pub prepend: String,
    /// Seconds of padding after the last keyframe
    pub extend: f64,
    pub start_at: f64,
    pub output_dir: PathBuf,
    pub codec: Codec,
    pub jpeg_quality: u8,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            font: PathBuf::from("font.ttf"),
            name_template: "counter_{}".to_string(),
            width: 400,
            height: 100,
            fps: 30,
            fontsize: 64,
            prepend: String::new(),
            extend: 2.0,
            start_at: 0.0,
            output_dir: PathBuf::from("."),
            codec: Codec::Raw,
            jpeg_quality: 90,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct CounterSettings {
    /// Seconds between repeats while the count key is held
    pub hold_delay: f64,
    /// Maximum number of concurrent repeat tasks per held key
    pub hold_multiplier: usize,
}

impl Default for CounterSettings {
    fn default() -> Self {
        Self {
            hold_delay: 0.1,
            hold_multiplier: 1,
        }
    }
}

impl CounterSettings {
    pub fn hold_interval(&self) -> Duration {
        Duration::from_secs_f64(self.hold_delay.clamp(0.001, 3600.0))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Keybinds {
    pub count: String,
    pub new_clip: String,
}

impl Default for Keybinds {
    fn default() -> Self {
        Self {
            count: "space".to_string(),
            new_clip: "n".to_string(),
        }
    }
}

impl Settings {
    /// Load settings from a YAML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file: {}", path.display()))?;

        let settings: Settings = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse settings YAML: {}", path.display()))?;

        Ok(settings)
    }

    /// Load from `explicit` if given, else the first settings file found in the
    /// search paths, else defaults. Returns the file that was used, if any.
    pub fn discover(explicit: Option<&Path>) -> Result<(Self, Option<PathBuf>)> {
        if let Some(path) = explicit {
            return Ok((Self::load(path)?, Some(path.to_path_buf())));
        }

        for path in Self::search_paths() {
            if path.is_file() {
                tracing::debug!(path = %path.display(), "Using settings file");
                return Ok((Self::load(&path)?, Some(path)));
            }
        }

        tracing::debug!("No settings file found, using defaults");
        Ok((Self::default(), None))
    }

    /// Settings search paths in order of priority
    pub fn search_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(CONFIG_FILE_NAME)];
        if let Some(proj_dirs) = directories::ProjectDirs::from("", "", "keycount") {
            paths.push(proj_dirs.config_dir().join(CONFIG_FILE_NAME));
        }
        paths
    }

    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).context("Failed to serialize settings")
    }

    /// Merge `overrides` over the `output` section and validate the result.
    pub fn render_config(&self, overrides: &RenderOverrides) -> RenderResult<RenderConfig> {
        RenderConfig::from_settings(&overrides.apply(&self.output))
    }
}

/// Per-call overrides. `Some` fields win over the settings file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderOverrides {
    pub font: Option<PathBuf>,
    pub name_template: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub fps: Option<u32>,
    pub fontsize: Option<u32>,
    pub prepend: Option<String>,
    pub extend: Option<f64>,
    pub start_at: Option<f64>,
    pub output_dir: Option<PathBuf>,
    pub codec: Option<Codec>,
    pub jpeg_quality: Option<u8>,
}

impl RenderOverrides {
    pub fn apply(&self, base: &OutputSettings) -> OutputSettings {
        OutputSettings {
            font: self.font.clone().unwrap_or_else(|| base.font.clone()),
            name_template: self
                .name_template
                .clone()
                .unwrap_or_else(|| base.name_template.clone()),
            width: self.width.unwrap_or(base.width),
            height: self.height.unwrap_or(base.height),
            fps: self.fps.unwrap_or(base.fps),
            fontsize: self.fontsize.unwrap_or(base.fontsize),
            prepend: self.prepend.clone().unwrap_or_else(|| base.prepend.clone()),
            extend: self.extend.unwrap_or(base.extend),
            start_at: self.start_at.unwrap_or(base.start_at),
            output_dir: self
                .output_dir
                .clone()
                .unwrap_or_else(|| base.output_dir.clone()),
            codec: self.codec.unwrap_or(base.codec),
            jpeg_quality: self.jpeg_quality.unwrap_or(base.jpeg_quality),
        }
    }
}

/// Upper bound on `fps * extend`, checked before it is turned into a frame count.
const MAX_PADDING_FRAMES: f64 = 1_000_000.0;

/// Validated configuration for one render invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderConfig {
    pub font: PathBuf,
    pub name_template: NameTemplate,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub fontsize: u32,
    pub prepend: String,
    pub extend: f64,
    pub start_at: f64,
    pub output_dir: PathBuf,
    pub codec: Codec,
    pub jpeg_quality: u8,
}

impl RenderConfig {
    pub fn from_settings(output: &OutputSettings) -> RenderResult<Self> {
        if output.width == 0 || output.height == 0 {
            return Err(RenderError::config(format!(
                "frame size must be positive, got {}x{}",
                output.width, output.height
            )));
        }
        if output.width > u16::MAX as u32 || output.height > u16::MAX as u32 {
            return Err(RenderError::config(format!(
                "frame size {}x{} is too large",
                output.width, output.height
            )));
        }
        if output.fps == 0 {
            return Err(RenderError::config("fps must be positive"));
        }
        if output.fontsize == 0 {
            return Err(RenderError::config("fontsize must be positive"));
        }
        if !output.extend.is_finite() || output.extend < 0.0 {
            return Err(RenderError::config(format!(
                "extend must be a non-negative number of seconds, got {}",
                output.extend
            )));
        }
        let padding = output.fps as f64 * output.extend;
        if padding.round_ties_even() > MAX_PADDING_FRAMES {
            return Err(RenderError::config(format!(
                "extend of {}s at {} fps needs {} padding frames, the limit is {}",
                output.extend, output.fps, padding, MAX_PADDING_FRAMES
            )));
        }
        if !output.start_at.is_finite() {
            return Err(RenderError::config("start_at must be a finite number"));
        }
        if !(1..=100).contains(&output.jpeg_quality) {
            return Err(RenderError::config(format!(
                "jpeg_quality must be between 1 and 100, got {}",
                output.jpeg_quality
            )));
        }
        if output.font.as_os_str().is_empty() {
            return Err(RenderError::config("font path is empty"));
        }

        Ok(Self {
            font: output.font.clone(),
            name_template: NameTemplate::parse(&output.name_template)?,
            width: output.width,
            height: output.height,
            fps: output.fps,
            fontsize: output.fontsize,
            prepend: output.prepend.clone(),
            extend: output.extend,
            start_at: output.start_at,
            output_dir: output.output_dir.clone(),
            codec: output.codec,
            jpeg_quality: output.jpeg_quality,
        })
    }

    pub fn formatter(&self) -> CounterFormatter {
        CounterFormatter::new(self.prepend.clone(), self.start_at)
    }

    /// Number of frames appended after the real timeline.
    pub fn padding_frames(&self) -> usize {
        (self.fps as f64 * self.extend).round_ties_even() as usize
    }

    /// Output file for the clip at `index` in the batch.
    pub fn output_path(&self, index: usize) -> PathBuf {
        let stem = self.name_template.render(index);
        self.output_dir
            .join(format!("{}.{}", stem, self.codec.extension()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_yaml_keeps_defaults() {
        let yaml = r#"
output:
  font: fonts/Counter.ttf
  fps: 25
  prepend: "+"
counter:
  hold-delay: 0.25
keybinds:
  new-clip: c
"#;
        let settings: Settings = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(settings.output.font, PathBuf::from("fonts/Counter.ttf"));
        assert_eq!(settings.output.fps, 25);
        assert_eq!(settings.output.prepend, "+");
        assert_eq!(settings.output.width, OutputSettings::default().width);
        assert_eq!(settings.counter.hold_delay, 0.25);
        assert_eq!(settings.counter.hold_multiplier, 1);
        assert_eq!(settings.keybinds.count, "space");
        assert_eq!(settings.keybinds.new_clip, "c");
    }

    #[test]
    fn codec_is_read_from_yaml() {
        let settings: Settings = serde_yaml::from_str("output:\n  codec: MJPG\n").unwrap();
        assert_eq!(settings.output.codec, Codec::Mjpeg);
        assert!(serde_yaml::from_str::<Settings>("output:\n  codec: MP42\n").is_err());
    }

    #[test]
    fn overrides_take_precedence_per_key() {
        let settings = Settings::default();
        let overrides = RenderOverrides {
            fps: Some(60),
            prepend: Some("#".to_string()),
            ..Default::default()
        };
        let config = settings.render_config(&overrides).unwrap();
        assert_eq!(config.fps, 60);
        assert_eq!(config.prepend, "#");
        assert_eq!(config.width, settings.output.width);
        assert_eq!(config.name_template.as_str(), settings.output.name_template);
    }

    #[test]
    fn invalid_values_are_config_errors() {
        let base = OutputSettings::default();
        let cases = [
            RenderOverrides { width: Some(0), ..Default::default() },
            RenderOverrides { fps: Some(0), ..Default::default() },
            RenderOverrides { fontsize: Some(0), ..Default::default() },
            RenderOverrides { extend: Some(-1.0), ..Default::default() },
            RenderOverrides { extend: Some(f64::NAN), ..Default::default() },
            RenderOverrides { extend: Some(1e30), ..Default::default() },
            RenderOverrides { jpeg_quality: Some(0), ..Default::default() },
            RenderOverrides { name_template: Some("clip".into()), ..Default::default() },
        ];
        for overrides in cases {
            let err = RenderConfig::from_settings(&overrides.apply(&base)).unwrap_err();
            assert!(matches!(err, RenderError::Config { .. }), "{overrides:?}");
        }
    }

    #[test]
    fn output_path_uses_template_and_directory() {
        let config = RenderConfig::from_settings(&OutputSettings {
            name_template: "take{:02}".into(),
            output_dir: PathBuf::from("renders"),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(config.output_path(3), PathBuf::from("renders/take03.avi"));
    }

    #[test]
    fn padding_is_capped_at_a_million_frames() {
        let mut output = OutputSettings {
            fps: 100,
            extend: 10_000.0,
            ..Default::default()
        };
        let config = RenderConfig::from_settings(&output).unwrap();
        assert_eq!(config.padding_frames(), 1_000_000);

        output.extend = 10_000.01;
        let err = RenderConfig::from_settings(&output).unwrap_err();
        assert!(matches!(err, RenderError::Config { .. }));
        assert!(err.to_string().contains("padding frames"));
    }

    #[test]
    fn padding_frames_is_fps_times_extend() {
        let mut output = OutputSettings {
            fps: 30,
            extend: 2.0,
            ..Default::default()
        };
        assert_eq!(RenderConfig::from_settings(&output).unwrap().padding_frames(), 60);
        output.extend = 0.0;
        assert_eq!(RenderConfig::from_settings(&output).unwrap().padding_frames(), 0);
        output.fps = 24;
        output.extend = 0.5;
        assert_eq!(RenderConfig::from_settings(&output).unwrap().padding_frames(), 12);
    }

    #[test]
    fn load_reads_a_settings_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "output:\n  width: 640\n  height: 120\n").unwrap();

        let (settings, used) = Settings::discover(Some(&path)).unwrap();
        assert_eq!(used.as_deref(), Some(path.as_path()));
        assert_eq!((settings.output.width, settings.output.height), (640, 120));
    }

    #[test]
    fn yaml_round_trip() {
        let settings = Settings::default();
        let yaml = settings.to_yaml().unwrap();
        let back: Settings = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back, settings);
    }
}
