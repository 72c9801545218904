use std::path::PathBuf;

use super::CancelFlag;
use crate::clips::validate_timestamps;
use crate::config::RenderConfig;
use crate::counter::CounterFormatter;
use crate::encoder::{AviEncoder, VideoEncoder};
use crate::error::{RenderError, RenderResult};
use crate::renderer::{Canvas, FrameCompositor, TextRasterizer};
use crate::timeline::{self, Timeline};

/// Cursor for every frame of one clip's video.
#[derive(Debug, Clone, PartialEq)]
pub struct ClipPlan {
    pub timeline: Timeline,
    pub padding_frames: usize,
}

impl ClipPlan {
    pub fn new(timestamps: &[f64], fps: u32, padding_frames: usize) -> Self {
        Self {
            timeline: timeline::quantize(timestamps, fps),
            padding_frames,
        }
    }

    pub fn real_frames(&self) -> usize {
        self.timeline.len()
    }

    pub fn total_frames(&self) -> usize {
        self.real_frames() + self.padding_frames
    }

    /// Real frames in sample order, then the padding frames holding the final cursor.
    pub fn cursors(&self) -> impl Iterator<Item = usize> + '_ {
        let held = self.timeline.final_cursor();
        self.timeline
            .samples
            .iter()
            .map(|s| s.cursor)
            .chain(std::iter::repeat(held).take(self.padding_frames))
    }
}

/// Summary of one written video.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedClip {
    pub index: usize,
    pub path: PathBuf,
    pub real_frames: usize,
    pub padding_frames: usize,
    pub final_label: String,
}

/// Renders a single clip into its own video file.
pub struct ClipRenderer<'a> {
    config: &'a RenderConfig,
    compositor: FrameCompositor<'a>,
    formatter: CounterFormatter,
    cancel: CancelFlag,
}

impl<'a> ClipRenderer<'a> {
    pub fn new(config: &'a RenderConfig, text: &'a dyn TextRasterizer) -> Self {
        Self {
            config,
            compositor: FrameCompositor::new(config.width, config.height, text),
            formatter: config.formatter(),
            cancel: CancelFlag::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn plan(&self, timestamps: &[f64]) -> ClipPlan {
        ClipPlan::new(timestamps, self.config.fps, self.config.padding_frames())
    }

    /// Counter text of every frame, in output order.
    pub fn labels(&self, timestamps: &[f64]) -> Vec<String> {
        self.plan(timestamps)
            .cursors()
            .map(|cursor| self.formatter.format(cursor))
            .collect()
    }

    /// Render the clip at `index` to `config.output_path(index)`.
    ///
    /// On any failure after the file was created, the file is closed and deleted.
    pub fn render(&self, index: usize, timestamps: &[f64]) -> RenderResult<RenderedClip> {
        if timestamps.is_empty() {
            return Err(RenderError::EmptyClip { index });
        }
        validate_timestamps(index, timestamps)?;

        let plan = self.plan(timestamps);
        let path = self.config.output_path(index);
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        tracing::info!(
            clip = index,
            keyframes = timestamps.len(),
            frames = plan.real_frames(),
            padding = plan.padding_frames,
            path = %path.display(),
            "Rendering clip"
        );

        let mut encoder = AviEncoder::create(
            &path,
            self.config.width,
            self.config.height,
            self.config.fps,
            self.config.codec,
            self.config.jpeg_quality,
        )?;

        if let Err(e) = self.write_frames(&plan, &mut encoder) {
            let written = encoder.frames_written();
            if let Err(cleanup) = encoder.abort() {
                tracing::warn!(path = %path.display(), error = %cleanup, "Failed to remove partial video");
            }
            tracing::debug!(clip = index, written, "Discarded partial video");
            return Err(e);
        }

        match encoder.finish() {
            Ok(frames) => tracing::debug!(clip = index, frames, "Video finalized"),
            Err(e) => {
                if let Err(cleanup) = std::fs::remove_file(&path) {
                    tracing::warn!(path = %path.display(), error = %cleanup, "Failed to remove partial video");
                }
                return Err(e);
            }
        }

        let final_label = self.formatter.format(plan.timeline.final_cursor());
        tracing::info!(clip = index, counter = %final_label, path = %path.display(), "Clip rendered");

        Ok(RenderedClip {
            index,
            path,
            real_frames: plan.real_frames(),
            padding_frames: plan.padding_frames,
            final_label,
        })
    }

    /// Stream every frame of `timestamps` into `encoder` without finalizing it.
    pub fn render_into<E: VideoEncoder>(
        &self,
        timestamps: &[f64],
        encoder: &mut E,
    ) -> RenderResult<usize> {
        let plan = self.plan(timestamps);
        self.write_frames(&plan, encoder)?;
        Ok(plan.total_frames())
    }

    fn write_frames<E: VideoEncoder>(&self, plan: &ClipPlan, encoder: &mut E) -> RenderResult<()> {
        // consecutive frames with the same counter are pixel-identical
        let mut last: Option<(usize, Canvas)> = None;

        for cursor in plan.cursors() {
            if self.cancel.is_cancelled() {
                return Err(RenderError::Cancelled);
            }
            let canvas = match last.take() {
                Some((previous, canvas)) if previous == cursor => canvas,
                _ => self.compositor.compose(&self.formatter.format(cursor)),
            };
            encoder.add_frame(&canvas)?;
            last = Some((cursor, canvas));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{OutputSettings, RenderConfig};
    use crate::renderer::testing::BlockText;

    /// Keeps frames in memory.
    #[derive(Default)]
    struct Frames(Vec<Vec<u8>>);

    impl VideoEncoder for Frames {
        fn add_frame(&mut self, canvas: &Canvas) -> RenderResult<()> {
            self.0.push(canvas.data().to_vec());
            Ok(())
        }

        fn finish(self) -> RenderResult<usize> {
            Ok(self.0.len())
        }
    }

    fn config(fps: u32, extend: f64) -> RenderConfig {
        RenderConfig::from_settings(&OutputSettings {
            fps,
            extend,
            prepend: "+".into(),
            start_at: 0.0,
            width: 40,
            height: 8,
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn scenario_labels() {
        let config = config(2, 1.0);
        let text = BlockText { size: 4 };
        let renderer = ClipRenderer::new(&config, &text);

        let labels = renderer.labels(&[0.0, 0.5, 1.0, 1.5]);
        assert_eq!(labels, vec!["+0.1", "+0.2", "+0.2", "+0.2", "+0.2"]);

        let plan = renderer.plan(&[0.0, 0.5, 1.0, 1.5]);
        assert_eq!(plan.real_frames(), 3);
        assert_eq!(plan.padding_frames, 2);
    }

    #[test]
    fn padding_repeats_last_real_frame() {
        let config = config(10, 0.5);
        let text = BlockText { size: 1 };
        let renderer = ClipRenderer::new(&config, &text);

        let timestamps = [1.0, 1.2, 1.3, 1.9, 2.0];
        let labels = renderer.labels(&timestamps);
        let real = renderer.plan(&timestamps).real_frames();
        assert_eq!(labels.len(), real + 5);
        assert!(labels[real..].iter().all(|l| l == &labels[real - 1]));
    }

    #[test]
    fn single_keyframe_renders_only_padding() {
        let config = config(30, 1.0);
        let text = BlockText { size: 1 };
        let renderer = ClipRenderer::new(&config, &text);
        let labels = renderer.labels(&[3.7]);
        assert_eq!(labels.len(), 30);
        assert!(labels.iter().all(|l| l == "+0.0"));
    }

    #[test]
    fn render_into_streams_composited_frames() {
        let config = config(2, 1.0);
        let text = BlockText { size: 4 };
        let renderer = ClipRenderer::new(&config, &text);

        let mut frames = Frames::default();
        let count = renderer
            .render_into(&[0.0, 0.5, 1.0, 1.5], &mut frames)
            .unwrap();
        assert_eq!(count, 5);
        assert_eq!(frames.0.len(), 5);

        let compositor = FrameCompositor::new(40, 8, &text);
        assert_eq!(frames.0[0], compositor.compose("+0.1").data());
        for frame in &frames.0[1..] {
            assert_eq!(frame, compositor.compose("+0.2").data());
        }
        assert_ne!(frames.0[0], frames.0[1]);
    }

    #[test]
    fn rendering_twice_is_deterministic() {
        let config = config(12, 0.25);
        let text = BlockText { size: 2 };
        let renderer = ClipRenderer::new(&config, &text);
        let timestamps = [0.0, 0.1, 0.15, 0.6, 1.4];

        let mut first = Frames::default();
        let mut second = Frames::default();
        renderer.render_into(&timestamps, &mut first).unwrap();
        renderer.render_into(&timestamps, &mut second).unwrap();
        assert_eq!(first.0, second.0);
    }

    #[test]
    fn cancelled_render_stops_before_first_frame() {
        let config = config(2, 1.0);
        let text = BlockText { size: 1 };
        let cancel = CancelFlag::new();
        cancel.cancel();
        let renderer = ClipRenderer::new(&config, &text).with_cancel(cancel);

        let mut frames = Frames::default();
        let err = renderer.render_into(&[0.0, 1.0], &mut frames).unwrap_err();
        assert!(matches!(err, RenderError::Cancelled));
        assert!(frames.0.is_empty());
    }

    #[test]
    fn empty_and_invalid_clips_create_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(2, 1.0);
        config.output_dir = dir.path().to_path_buf();
        let text = BlockText { size: 1 };
        let renderer = ClipRenderer::new(&config, &text);

        assert!(matches!(
            renderer.render(0, &[]).unwrap_err(),
            RenderError::EmptyClip { index: 0 }
        ));
        assert!(matches!(
            renderer.render(1, &[2.0, 1.0]).unwrap_err(),
            RenderError::InvalidClip { index: 1, .. }
        ));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
