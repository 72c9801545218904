use anyhow::{Context, Result};
use clap::Parser;
use std::path::Path;
use std::process::ExitCode;

mod cli;

use cli::{Args, Command};
use keycount::capture::{CaptureApp, CaptureState};
use keycount::config::{RenderOverrides, Settings};
use keycount::encoder::AviInfo;
use keycount::render::{BatchRenderer, BatchReport, CancelFlag};
use keycount::{logging, ClipSet};

fn main() -> ExitCode {
    let args = Args::parse();
    logging::init(args.verbose);

    match run(args) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<ExitCode> {
    let (settings, source) = Settings::discover(args.config.as_deref())?;
    if let Some(path) = &source {
        tracing::info!(path = %path.display(), "Loaded settings");
    }

    let cancel = CancelFlag::new();
    {
        let cancel = cancel.clone();
        ctrlc::set_handler(move || {
            eprintln!("\nInterrupted, stopping after the current frame...");
            cancel.cancel();
        })
        .context("Failed to install Ctrl+C handler")?;
    }

    match args.command {
        Command::Render { clips, overrides } => {
            render(&settings, &clips, overrides.into(), cancel)
        }
        Command::Capture { save, overrides } => {
            let state = CaptureState::new(settings, overrides.into(), save.clone())
                .with_cancel(cancel);
            let clips = CaptureApp::new(state)?.run()?;
            eprintln!(
                "Captured {} keyframes in {} clip(s) (last save: {})",
                clips.keyframe_count(),
                clips.len(),
                save.display()
            );
            Ok(ExitCode::SUCCESS)
        }
        Command::Config => {
            match &source {
                Some(path) => println!("# {}", path.display()),
                None => println!("# defaults"),
            }
            print!("{}", settings.to_yaml()?);
            Ok(ExitCode::SUCCESS)
        }
        Command::Inspect { video } => {
            inspect(&video)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn render(
    settings: &Settings,
    clips_path: &Path,
    overrides: RenderOverrides,
    cancel: CancelFlag,
) -> Result<ExitCode> {
    let clips = ClipSet::load(clips_path)?;
    if let Err(e) = clips.validate() {
        tracing::warn!(error = %e, "Clip file contains invalid clips");
    }

    let renderer = BatchRenderer::new(settings.render_config(&overrides)?)?.with_cancel(cancel);
    let config = renderer.config();
    eprintln!(
        "Rendering {} clip(s) at {}x{}, {} fps into {}",
        clips.len(),
        config.width,
        config.height,
        config.fps,
        config.output_dir.display()
    );
    let report = renderer.render_all(clips.clips())?;
    print_report(&report);

    Ok(if report.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn print_report(report: &BatchReport) {
    for clip in &report.rendered {
        eprintln!(
            "  ✓ {} ({} frames + {} padding, ends at {})",
            clip.path.display(),
            clip.real_frames,
            clip.padding_frames,
            clip.final_label
        );
    }
    for index in &report.skipped {
        eprintln!("  - clip {} has no keyframes, skipped", index);
    }
    for (index, error) in &report.failed {
        eprintln!("  ✗ clip {}: {}", index, error);
    }
}

fn inspect(path: &Path) -> Result<()> {
    let info = AviInfo::read(path)
        .with_context(|| format!("Failed to read video: {}", path.display()))?;
    println!("File:    {}", path.display());
    println!("Codec:   {}", String::from_utf8_lossy(&info.fourcc));
    println!("Size:    {}x{}", info.width, info.height);
    println!("Rate:    {} fps", info.fps);
    println!(
        "Frames:  {} ({} in index, {} in header)",
        info.frames.len(),
        info.indexed_frames,
        info.total_frames
    );
    if info.fps > 0 {
        println!("Length:  {:.2}s", info.frames.len() as f64 / info.fps as f64);
    }
    Ok(())
}
