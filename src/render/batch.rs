use super::{CancelFlag, ClipRenderer, RenderedClip};
use crate::clips::Clip;
use crate::config::RenderConfig;
use crate::error::{RenderError, RenderResult};
use crate::renderer::{load_font, TextRasterizer};

/// Outcome of rendering every clip of a session.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub rendered: Vec<RenderedClip>,
    /// Positions of clips without keyframes
    pub skipped: Vec<usize>,
    pub failed: Vec<(usize, RenderError)>,
}

impl BatchReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Renders each non-empty clip to its own file, named after its position.
pub struct BatchRenderer {
    config: RenderConfig,
    text: Box<dyn TextRasterizer>,
    cancel: CancelFlag,
}

impl BatchRenderer {
    /// Load the configured font. Fails before any output file is created.
    pub fn new(config: RenderConfig) -> RenderResult<Self> {
        let font = load_font(&config.font, config.fontsize)?;
        Ok(Self::with_rasterizer(config, Box::new(font)))
    }

    pub fn with_rasterizer(config: RenderConfig, text: Box<dyn TextRasterizer>) -> Self {
        Self {
            config,
            text,
            cancel: CancelFlag::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    /// Render every clip. Empty clips are skipped but keep their index, so
    /// file names line up with the recording session's clip numbers.
    ///
    /// A failing clip is recorded in the report and the batch moves on, except
    /// for errors every later clip would hit too, which are returned.
    pub fn render_all(&self, clips: &[Clip]) -> RenderResult<BatchReport> {
        let renderer =
            ClipRenderer::new(&self.config, self.text.as_ref()).with_cancel(self.cancel.clone());
        let mut report = BatchReport::default();

        for (index, clip) in clips.iter().enumerate() {
            if clip.is_empty() {
                tracing::debug!(clip = index, "Skipping empty clip");
                report.skipped.push(index);
                continue;
            }

            match renderer.render(index, clip.timestamps()) {
                Ok(rendered) => report.rendered.push(rendered),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    tracing::warn!(clip = index, error = %e, "Clip failed to render");
                    report.failed.push((index, e));
                }
            }
        }

        tracing::info!(
            rendered = report.rendered.len(),
            skipped = report.skipped.len(),
            failed = report.failed.len(),
            "Batch finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clips::ClipSet;
    use crate::config::OutputSettings;
    use crate::renderer::testing::BlockText;
    use std::path::Path;

    fn batch(dir: &Path) -> BatchRenderer {
        let config = RenderConfig::from_settings(&OutputSettings {
            fps: 4,
            extend: 0.5,
            width: 16,
            height: 4,
            name_template: "clip{}".into(),
            output_dir: dir.to_path_buf(),
            ..Default::default()
        })
        .unwrap();
        BatchRenderer::with_rasterizer(config, Box::new(BlockText { size: 2 }))
    }

    #[test]
    fn empty_clips_keep_their_index() {
        let dir = tempfile::tempdir().unwrap();
        let clips = ClipSet::from(vec![vec![], vec![1.0, 2.0]]);

        let report = batch(dir.path()).render_all(clips.clips()).unwrap();
        assert_eq!(report.skipped, vec![0]);
        assert_eq!(report.rendered.len(), 1);
        assert_eq!(report.rendered[0].index, 1);

        let files: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(files, vec!["clip1.avi".to_string()]);
    }

    #[test]
    fn invalid_clip_does_not_stop_the_batch() {
        let dir = tempfile::tempdir().unwrap();
        let clips = ClipSet::from(vec![vec![0.0, 1.0], vec![3.0, 1.0], vec![0.0, 0.5]]);

        let report = batch(dir.path()).render_all(clips.clips()).unwrap();
        assert!(!report.is_success());
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, 1);
        let rendered: Vec<usize> = report.rendered.iter().map(|r| r.index).collect();
        assert_eq!(rendered, vec![0, 2]);
        assert!(!dir.path().join("clip1.avi").exists());
    }

    #[test]
    fn cancellation_aborts_the_batch() {
        let dir = tempfile::tempdir().unwrap();
        let cancel = CancelFlag::new();
        cancel.cancel();
        let renderer = batch(dir.path()).with_cancel(cancel);

        let clips = ClipSet::from(vec![vec![0.0, 1.0], vec![0.0, 2.0]]);
        let err = renderer.render_all(clips.clips()).unwrap_err();
        assert!(matches!(err, RenderError::Cancelled));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn missing_font_fails_before_any_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = RenderConfig::from_settings(&OutputSettings {
            font: dir.path().join("missing.ttf"),
            output_dir: dir.path().join("out"),
            ..Default::default()
        })
        .unwrap();

        let err = BatchRenderer::new(config).err().unwrap();
        assert!(err.is_fatal());
        assert!(!dir.path().join("out").exists());
    }
}
